// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Fiat-Shamir transcript and the hash-based commitment scheme.
//!
//! [`Hash`] wraps a [`merlin::Transcript`]. Every write is a labelled merlin
//! message, so values are length-framed and order sensitive. Encodings:
//! big integers as minimal big-endian magnitude bytes, curve points in SEC1
//! compressed form, scalars as 32 big-endian bytes, party ids as their raw
//! bytes.

use crate::{
    curve::CurvePoint,
    errors::{CallerError, Result},
    parameters::{CRYPTOGRAPHIC_RETRY_MAX, SEC_BYTES},
    party::PartyId,
    utils::bit_length,
};
use k256::{elliptic_curve::ops::Reduce, FieldBytes, Scalar, U256};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// An append-only Fiat-Shamir transcript.
#[derive(Clone)]
pub struct Hash {
    transcript: Transcript,
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Hash(..)")
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::new()
    }
}

impl Hash {
    pub fn new() -> Self {
        Self {
            transcript: Transcript::new(b"tss-cmp"),
        }
    }

    pub fn write_bytes(&mut self, label: &'static [u8], bytes: &[u8]) {
        self.transcript.append_message(label, bytes);
    }

    pub fn write_bn(&mut self, label: &'static [u8], value: &BigNumber) {
        self.transcript.append_message(label, &value.to_bytes());
    }

    pub fn write_point(&mut self, label: &'static [u8], point: &CurvePoint) {
        self.transcript.append_message(label, &point.to_bytes());
    }

    pub fn write_scalar(&mut self, label: &'static [u8], scalar: &Scalar) {
        self.transcript.append_message(label, &scalar.to_bytes());
    }

    pub fn write_id(&mut self, label: &'static [u8], id: &PartyId) {
        self.transcript.append_message(label, id.as_bytes());
    }

    /// An independent copy of this transcript that has absorbed `id`.
    pub fn clone_with_id(&self, id: &PartyId) -> Self {
        let mut cloned = self.clone();
        cloned.write_id(b"party id", id);
        cloned
    }

    pub fn challenge_bytes(&mut self, label: &'static [u8], n: usize) -> Vec<u8> {
        let mut out = vec![0u8; n];
        self.transcript.challenge_bytes(label, &mut out);
        out
    }

    /// Derive a deterministic pseudorandom value in `[0, n)`.
    pub fn challenge_bn(&mut self, n: &BigNumber) -> Result<BigNumber> {
        // Rejection sampling over the bit length of `n`.
        let bits = bit_length(n);
        let len = bits.div_ceil(8);
        let mask = 0xffu8 >> (len * 8 - bits);
        let mut t = vec![0u8; len];
        for _ in 0..CRYPTOGRAPHIC_RETRY_MAX {
            self.transcript
                .challenge_bytes(b"sampling randomness", t.as_mut_slice());
            if let Some(top) = t.first_mut() {
                *top &= mask;
            }
            let b = BigNumber::from_slice(t.as_slice());
            if &b < n {
                return Ok(b);
            }
        }
        Err(CallerError::RetryFailed)?
    }

    pub fn challenge_scalar(&mut self, label: &'static [u8]) -> Scalar {
        let mut bytes = FieldBytes::default();
        self.transcript.challenge_bytes(label, &mut bytes);
        <Scalar as Reduce<U256>>::reduce_bytes(&bytes)
    }

    /// A SEC_BYTES digest of everything written so far.
    pub fn digest(mut self) -> [u8; SEC_BYTES] {
        let mut out = [0u8; SEC_BYTES];
        self.transcript.challenge_bytes(b"digest", &mut out);
        out
    }

    /// Commit to `payload` on behalf of `id`.
    pub fn commit<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        id: &PartyId,
        payload: &[u8],
    ) -> (Commitment, Decommitment) {
        let mut nonce = [0u8; SEC_BYTES];
        rng.fill_bytes(&mut nonce);
        let decommitment = Decommitment(nonce);
        (self.commitment_for(id, payload, &decommitment), decommitment)
    }

    /// Check `commitment` against a revealed `payload`.
    pub fn decommit(
        &self,
        id: &PartyId,
        commitment: &Commitment,
        decommitment: &Decommitment,
        payload: &[u8],
    ) -> bool {
        let rebuilt = self.commitment_for(id, payload, decommitment);
        rebuilt.0.ct_eq(&commitment.0).into()
    }

    fn commitment_for(
        &self,
        id: &PartyId,
        payload: &[u8],
        decommitment: &Decommitment,
    ) -> Commitment {
        let mut h = self.clone();
        h.write_bytes(b"commitment", b"");
        h.write_id(b"committer", id);
        h.write_bytes(b"payload", payload);
        h.write_bytes(b"nonce", &decommitment.0);
        Commitment(h.digest())
    }
}

/// Binding commitment to a payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment(pub(crate) [u8; SEC_BYTES]);

/// Opening information for a [`Commitment`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decommitment(pub(crate) [u8; SEC_BYTES]);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    fn id(s: &str) -> PartyId {
        PartyId::new(s).unwrap()
    }

    #[test]
    fn commitment_opens_only_with_matching_inputs() {
        let mut rng = init_testing();
        let h = Hash::new();
        let (c, d) = h.commit(&mut rng, &id("a"), b"payload");
        assert!(h.decommit(&id("a"), &c, &d, b"payload"));

        assert!(!h.decommit(&id("b"), &c, &d, b"payload"));
        assert!(!h.decommit(&id("a"), &c, &d, b"payloaD"));
        let mut other_nonce = d;
        other_nonce.0[0] ^= 1;
        assert!(!h.decommit(&id("a"), &c, &other_nonce, b"payload"));

        let mut other_state = h.clone();
        other_state.write_bytes(b"extra", b"x");
        assert!(!other_state.decommit(&id("a"), &c, &d, b"payload"));
    }

    #[test]
    fn clone_with_id_forks_deterministically() {
        let mut h = Hash::new();
        h.write_bn(b"n", &BigNumber::from(77u64));
        let a1 = h.clone_with_id(&id("a")).challenge_bytes(b"c", 32);
        let a2 = h.clone_with_id(&id("a")).challenge_bytes(b"c", 32);
        let b = h.clone_with_id(&id("b")).challenge_bytes(b"c", 32);
        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        // The original is unaffected by the forks.
        assert_eq!(h.clone().digest(), h.digest());
    }

    #[test]
    fn challenge_bn_is_in_range() {
        let mut h = Hash::new();
        let n = BigNumber::from(1000u64);
        for _ in 0..50 {
            let c = h.challenge_bn(&n).unwrap();
            assert!(c < n);
        }
    }

    #[test]
    fn write_order_matters() {
        let mut h1 = Hash::new();
        h1.write_bytes(b"x", b"1");
        h1.write_bytes(b"x", b"2");
        let mut h2 = Hash::new();
        h2.write_bytes(b"x", b"2");
        h2.write_bytes(b"x", b"1");
        assert_ne!(h1.digest(), h2.digest());
    }
}
