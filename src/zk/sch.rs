// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Schnorr proof of knowledge of `x` with `X = x·G`.
//!
//! The commitment `A = a·G` is published ahead of time (inside a
//! commit-then-reveal round), so a proof only carries the response.

use crate::{
    curve::{random_scalar, CurvePoint},
    hash::Hash,
};
use k256::Scalar;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

/// Secret nonce `a` of a Schnorr proof.
#[derive(Clone, ZeroizeOnDrop)]
pub struct Randomness {
    a: Scalar,
    #[zeroize(skip)]
    commitment: CurvePoint,
}

impl std::fmt::Debug for Randomness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Randomness")
            .field("commitment", &self.commitment)
            .finish_non_exhaustive()
    }
}

impl Randomness {
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let a = random_scalar(rng);
        Self {
            a,
            commitment: CurvePoint::base_mul(&a),
        }
    }

    /// `A = a·G`
    pub fn commitment(&self) -> CurvePoint {
        self.commitment
    }

    /// Respond to the challenge derived from `(X, A)`.
    pub fn prove(&self, hash: &Hash, public: &CurvePoint, secret: &Scalar) -> Response {
        let e = challenge(hash, public, &self.commitment);
        Response(self.a + e * secret)
    }
}

/// Response `z = a + e·x`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response(Scalar);

impl Response {
    /// A placeholder response for a coefficient that carries no secret.
    pub fn empty() -> Self {
        Self(Scalar::ZERO)
    }

    /// Check `z·G = A + e·X`.
    pub fn verify(&self, hash: &Hash, public: &CurvePoint, commitment: &CurvePoint) -> bool {
        if commitment.is_identity() {
            return false;
        }
        let e = challenge(hash, public, commitment);
        CurvePoint::base_mul(&self.0) == *commitment + public.mul(&e)
    }
}

fn challenge(hash: &Hash, public: &CurvePoint, commitment: &CurvePoint) -> Scalar {
    let mut h = hash.clone();
    h.write_point(b"X", public);
    h.write_point(b"A", commitment);
    h.challenge_scalar(b"sch challenge")
}
