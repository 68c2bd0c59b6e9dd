// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Proof that ring-Pedersen parameters satisfy `s = t^λ mod N`.

use crate::{
    errors::Result,
    hash::Hash,
    parameters::STAT_PARAM,
    pedersen::Parameters,
    utils::random_positive_bn,
    zk::ProofError,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// The secret exponent and the order of the group it lives in.
pub struct Private<'a> {
    pub lambda: &'a BigNumber,
    pub phi: &'a BigNumber,
}

/// A ring-Pedersen parameter proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    commitments: Vec<BigNumber>,
    responses: Vec<BigNumber>,
}

impl Proof {
    #[instrument(skip_all, err(Debug))]
    pub fn prove<R: RngCore + CryptoRng>(
        rng: &mut R,
        hash: &Hash,
        public: &Parameters,
        private: &Private,
    ) -> Result<Self> {
        let nonces: Vec<BigNumber> = (0..STAT_PARAM)
            .map(|_| random_positive_bn(rng, private.phi))
            .collect();
        let commitments: Vec<BigNumber> = nonces
            .iter()
            .map(|a| public.t().modpow(a, public.n()))
            .collect();

        let bits = challenge_bits(hash, public, &commitments);
        let responses = nonces
            .iter()
            .zip(bits)
            .map(|(a, e)| {
                if e {
                    (a + private.lambda).nmod(private.phi)
                } else {
                    a.clone()
                }
            })
            .collect();
        Ok(Self {
            commitments,
            responses,
        })
    }

    pub fn verify(&self, hash: &Hash, public: &Parameters) -> std::result::Result<(), ProofError> {
        if self.commitments.len() != STAT_PARAM || self.responses.len() != STAT_PARAM {
            return Err(ProofError::ResponseCount {
                expected: STAT_PARAM,
                actual: self.commitments.len().min(self.responses.len()),
            });
        }
        let n = public.n();
        let bits = challenge_bits(hash, public, &self.commitments);
        for (i, ((a, z), e)) in self
            .commitments
            .iter()
            .zip(&self.responses)
            .zip(bits)
            .enumerate()
        {
            if a <= &BigNumber::zero() || a >= n || a.gcd(n) != BigNumber::one() {
                return Err(ProofError::ResponseRange(i));
            }
            if z < &BigNumber::zero() || z >= n {
                return Err(ProofError::ResponseRange(i));
            }
            let lhs = public.t().modpow(z, n);
            let rhs = if e { a.modmul(public.s(), n) } else { a.clone() };
            if lhs != rhs {
                return Err(ProofError::ResponseEquation(i));
            }
        }
        Ok(())
    }
}

fn challenge_bits(hash: &Hash, public: &Parameters, commitments: &[BigNumber]) -> Vec<bool> {
    let mut h = hash.clone();
    h.write_bn(b"N", public.n());
    h.write_bn(b"s", public.s());
    h.write_bn(b"t", public.t());
    for a in commitments {
        h.write_bn(b"A", a);
    }
    let bytes = h.challenge_bytes(b"prm challenge", STAT_PARAM.div_ceil(8));
    (0..STAT_PARAM)
        .map(|i| (bytes[i / 8] >> (i % 8)) & 1 == 1)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{paillier::SecretKey, utils::testing::init_testing};

    #[test]
    fn honest_proof_verifies_and_forgery_fails() {
        let mut rng = init_testing();
        let sk = SecretKey::generate(&mut rng).unwrap();
        let (params, lambda) = Parameters::generate(&mut rng, &sk).unwrap();
        let private = Private {
            lambda: lambda.value(),
            phi: sk.phi(),
        };
        let proof = Proof::prove(&mut rng, &Hash::new(), &params, &private).unwrap();
        assert_eq!(proof.verify(&Hash::new(), &params), Ok(()));

        // Proving with the wrong exponent fails (except with negligible probability).
        let wrong = BigNumber::from(12345u64);
        let bad_private = Private {
            lambda: &wrong,
            phi: sk.phi(),
        };
        let bad = Proof::prove(&mut rng, &Hash::new(), &params, &bad_private).unwrap();
        assert!(bad.verify(&Hash::new(), &params).is_err());

        // Bound to the transcript.
        let mut other = Hash::new();
        other.write_bytes(b"context", b"other");
        assert!(proof.verify(&other, &params).is_err());
    }
}
