// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The material each party commits to in round one and reveals in round three.

use crate::{
    curve::CurvePoint,
    errors::{InternalError, Result},
    hash::{Commitment, Decommitment, Hash},
    paillier::PublicKey,
    parameters::{PAILLIER_BITS, SEC_BYTES},
    party::PartyId,
    pedersen::Parameters,
    polynomial::Exponent,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

/// Public half of a party's contribution to key generation or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PublicBody {
    /// Share of the joint randomness.
    pub(crate) rho: Vec<u8>,
    /// `F_i(X) = f_i(X)·G`.
    pub(crate) exponent: Exponent,
    /// Schnorr commitments, one per coefficient of `F_i`.
    pub(crate) schnorr: Vec<CurvePoint>,
    pub(crate) paillier: PublicKey,
    pub(crate) pedersen: Parameters,
}

impl PublicBody {
    pub(crate) fn commit<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        hash: &Hash,
        id: &PartyId,
    ) -> Result<(Commitment, Decommitment)> {
        Ok(hash.commit(rng, id, &serialize!(self)?))
    }

    /// Check a revealed body from `sender`. The cheap structural checks come
    /// first so that the reported reason is the most specific one.
    #[instrument(skip_all, err(Debug))]
    pub(crate) fn verify(
        &self,
        hash: &Hash,
        sender: &PartyId,
        threshold: usize,
        refresh: bool,
        commitment: &Commitment,
        decommitment: &Decommitment,
    ) -> Result<()> {
        if self.rho.len() != SEC_BYTES {
            error!("{sender} sent rho of {} bytes", self.rho.len());
            return Err(InternalError::blame(sender, "rho has the wrong length"));
        }
        if self.exponent.degree() != threshold {
            error!(
                "{sender} committed to a polynomial of degree {}",
                self.exponent.degree()
            );
            return Err(InternalError::blame(
                sender,
                format!(
                    "polynomial has degree {}, expected {threshold}",
                    self.exponent.degree()
                ),
            ));
        }
        if refresh && !self.exponent.constant().is_identity() {
            error!("{sender} sent a refresh polynomial with a non-zero constant");
            return Err(InternalError::blame(
                sender,
                "refresh polynomial has a non-zero constant",
            ));
        }
        if self.schnorr.len() != self.exponent.len() {
            error!(
                "{sender} sent {} Schnorr commitments for {} coefficients",
                self.schnorr.len(),
                self.exponent.len()
            );
            return Err(InternalError::blame(
                sender,
                "wrong number of Schnorr commitments",
            ));
        }
        if self.paillier.bit_length() != PAILLIER_BITS {
            error!(
                "{sender} sent a Paillier modulus of {} bits",
                self.paillier.bit_length()
            );
            return Err(InternalError::blame(
                sender,
                format!("Paillier modulus is not {PAILLIER_BITS} bits"),
            ));
        }
        if self.pedersen.n() != self.paillier.modulus() {
            error!("{sender} sent Pedersen parameters over a different modulus");
            return Err(InternalError::blame(
                sender,
                "Pedersen modulus differs from the Paillier modulus",
            ));
        }
        if let Err(e) = self.pedersen.validate() {
            error!("{sender} sent invalid Pedersen parameters: {e}");
            return Err(InternalError::blame(
                sender,
                format!("invalid Pedersen parameters: {e}"),
            ));
        }
        if !hash.decommit(sender, commitment, decommitment, &serialize!(self)?) {
            error!("Decommitment from {sender} does not match its commitment");
            return Err(InternalError::blame(
                sender,
                "decommitment does not match commitment",
            ));
        }
        Ok(())
    }
}
