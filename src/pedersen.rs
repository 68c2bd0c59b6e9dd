// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Ring-Pedersen parameters `(N, s, t)` with `s = t^λ mod N`.

use crate::{
    errors::Result,
    paillier::SecretKey,
    parameters::PAILLIER_BITS,
    utils::{bit_length, is_even, random_bn_in_z_star, random_positive_bn},
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::ZeroizeOnDrop;

/// Reasons a set of ring-Pedersen parameters is rejected.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PedersenError {
    #[error("modulus has {0} bits")]
    ModulusSize(usize),
    #[error("modulus is even")]
    EvenModulus,
    #[error("s is not a unit modulo N")]
    BadS,
    #[error("t is not a unit modulo N")]
    BadT,
    #[error("s and t are equal")]
    EqualGenerators,
}

/// Public ring-Pedersen parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    n: BigNumber,
    s: BigNumber,
    t: BigNumber,
}

/// Secret exponent relating the two generators.
#[derive(Clone, ZeroizeOnDrop)]
pub(crate) struct Lambda(BigNumber);

impl std::fmt::Debug for Lambda {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Lambda([redacted])")
    }
}

impl Lambda {
    pub(crate) fn value(&self) -> &BigNumber {
        &self.0
    }
}

impl Parameters {
    /// Derive fresh parameters over the modulus of `sk`.
    pub(crate) fn generate<R: RngCore + CryptoRng>(
        rng: &mut R,
        sk: &SecretKey,
    ) -> Result<(Self, Lambda)> {
        let n = sk.public_key().modulus().clone();
        let r = random_bn_in_z_star(rng, &n)?;
        let t = r.modmul(&r, &n);
        let lambda = random_positive_bn(rng, sk.phi());
        let s = t.modpow(&lambda, &n);
        Ok((Self { n, s, t }, Lambda(lambda)))
    }

    pub fn n(&self) -> &BigNumber {
        &self.n
    }

    pub fn s(&self) -> &BigNumber {
        &self.s
    }

    pub fn t(&self) -> &BigNumber {
        &self.t
    }

    /// Structural checks on parameters received from a peer.
    pub fn validate(&self) -> std::result::Result<(), PedersenError> {
        let bits = bit_length(&self.n);
        if bits != PAILLIER_BITS {
            return Err(PedersenError::ModulusSize(bits));
        }
        if is_even(&self.n) {
            return Err(PedersenError::EvenModulus);
        }
        if !is_unit(&self.s, &self.n) {
            return Err(PedersenError::BadS);
        }
        if !is_unit(&self.t, &self.n) {
            return Err(PedersenError::BadT);
        }
        if self.s == self.t {
            return Err(PedersenError::EqualGenerators);
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn with_s(mut self, s: BigNumber) -> Self {
        self.s = s;
        self
    }
}

fn is_unit(x: &BigNumber, n: &BigNumber) -> bool {
    x > &BigNumber::zero() && x < n && x.gcd(n) == BigNumber::one()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    #[test]
    fn generated_parameters_validate() {
        let mut rng = init_testing();
        let sk = SecretKey::generate(&mut rng).unwrap();
        let (params, lambda) = Parameters::generate(&mut rng, &sk).unwrap();
        assert_eq!(params.validate(), Ok(()));
        assert_eq!(params.t().modpow(lambda.value(), params.n()), *params.s());
    }

    #[test]
    fn malformed_parameters_are_rejected() {
        let mut rng = init_testing();
        let sk = SecretKey::generate(&mut rng).unwrap();
        let (params, _) = Parameters::generate(&mut rng, &sk).unwrap();

        let zero_s = params.clone().with_s(BigNumber::zero());
        assert_eq!(zero_s.validate(), Err(PedersenError::BadS));

        let s_equals_t = params.clone().with_s(params.t().clone());
        assert_eq!(s_equals_t.validate(), Err(PedersenError::EqualGenerators));

        let big_s = params.clone().with_s(params.n().clone());
        assert_eq!(big_s.validate(), Err(PedersenError::BadS));

        let small = Parameters {
            n: BigNumber::from(311u64 * 331),
            s: BigNumber::from(2u64),
            t: BigNumber::from(3u64),
        };
        assert_eq!(small.validate(), Err(PedersenError::ModulusSize(17)));
    }
}
