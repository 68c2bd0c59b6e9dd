// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Group descriptor shared by every round of a run, and each party's long-term
//! secret.

use crate::{
    curve::CurvePoint,
    errors::{CallerError, InternalError, Result},
    hash::Hash,
    message::ProtocolId,
    paillier::{PublicKey, SecretKey},
    parameters::SEC_BYTES,
    party::PartyId,
    pedersen::Parameters,
};
use k256::Scalar;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::error;
use zeroize::ZeroizeOnDrop;

/// Checked party set and threshold for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    self_id: PartyId,
    party_ids: Vec<PartyId>,
    threshold: usize,
}

impl SessionConfig {
    /// `threshold` is the degree of the sharing polynomial: any `threshold + 1`
    /// parties can sign.
    pub fn new(self_id: PartyId, party_ids: Vec<PartyId>, threshold: usize) -> Result<Self> {
        let mut sorted = party_ids.clone();
        sorted.sort();
        sorted.dedup();
        if sorted.len() != party_ids.len() {
            error!("Party set contains duplicate identifiers");
            Err(CallerError::BadPartySet("duplicate party id".into()))?
        }
        if party_ids.len() < 2 {
            error!("A run needs at least two parties");
            Err(CallerError::BadPartySet("fewer than two parties".into()))?
        }
        if !party_ids.contains(&self_id) {
            error!("Party set does not contain {self_id}");
            Err(CallerError::BadPartySet(format!("{self_id} is not a party")))?
        }
        if threshold < 1 || threshold >= party_ids.len() {
            error!("Threshold {threshold} is invalid for {} parties", party_ids.len());
            Err(CallerError::BadThreshold {
                threshold,
                parties: party_ids.len(),
            })?
        }
        Ok(Self {
            self_id,
            party_ids,
            threshold,
        })
    }

    pub fn self_id(&self) -> &PartyId {
        &self.self_id
    }

    pub fn party_ids(&self) -> &[PartyId] {
        &self.party_ids
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Transcript bound to the protocol and the party set.
    pub(crate) fn transcript(&self, protocol: ProtocolId) -> Hash {
        let mut h = Hash::new();
        h.write_bytes(b"protocol", &[protocol as u8]);
        for id in &self.party_ids {
            h.write_id(b"party", id);
        }
        h.write_bytes(b"threshold", &(self.threshold as u64).to_be_bytes());
        h
    }
}

/// Public material of one party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicShare {
    /// `x_i·G` for the party's Shamir share `x_i`.
    pub ecdsa: CurvePoint,
    pub paillier: PublicKey,
    pub pedersen: Parameters,
}

/// Immutable group descriptor produced by key generation or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    party_ids: Vec<PartyId>,
    threshold: usize,
    public_key: CurvePoint,
    rid: [u8; SEC_BYTES],
    public: BTreeMap<PartyId, PublicShare>,
}

impl Session {
    pub(crate) fn new(
        party_ids: Vec<PartyId>,
        threshold: usize,
        public_key: CurvePoint,
        rid: [u8; SEC_BYTES],
        public: BTreeMap<PartyId, PublicShare>,
    ) -> Self {
        Self {
            party_ids,
            threshold,
            public_key,
            rid,
            public,
        }
    }

    pub fn party_ids(&self) -> &[PartyId] {
        &self.party_ids
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn public_key(&self) -> &CurvePoint {
        &self.public_key
    }

    /// Joint randomness fixed during key generation.
    pub fn rid(&self) -> &[u8; SEC_BYTES] {
        &self.rid
    }

    pub fn public_share(&self, id: &PartyId) -> Result<&PublicShare> {
        self.public.get(id).ok_or_else(|| {
            error!("Session has no public share for {id}");
            InternalError::CallingApplicationMistake(CallerError::BadPartySet(format!(
                "{id} is not a party"
            )))
        })
    }

    /// Transcript bound to the protocol, the party set and the key.
    pub(crate) fn transcript(&self, protocol: ProtocolId) -> Hash {
        let mut h = Hash::new();
        h.write_bytes(b"protocol", &[protocol as u8]);
        for id in &self.party_ids {
            h.write_id(b"party", id);
        }
        h.write_bytes(b"threshold", &(self.threshold as u64).to_be_bytes());
        h.write_point(b"public key", &self.public_key);
        h.write_bytes(b"rid", &self.rid);
        h
    }
}

/// A party's long-term secret material.
#[derive(Clone, ZeroizeOnDrop)]
pub struct Secret {
    #[zeroize(skip)]
    id: PartyId,
    ecdsa: Scalar,
    #[zeroize(skip)]
    paillier: SecretKey,
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("id", &self.id)
            .field("ecdsa", &"[redacted]")
            .field("paillier", &self.paillier)
            .finish()
    }
}

impl Secret {
    pub(crate) fn new(id: PartyId, ecdsa: Scalar, paillier: SecretKey) -> Self {
        Self {
            id,
            ecdsa,
            paillier,
        }
    }

    pub fn id(&self) -> &PartyId {
        &self.id
    }

    pub(crate) fn ecdsa(&self) -> &Scalar {
        &self.ecdsa
    }

    pub(crate) fn paillier(&self) -> &SecretKey {
        &self.paillier
    }
}
