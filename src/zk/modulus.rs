// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Proof that `N = p·q` is a Paillier-Blum modulus.
//!
//! The prover derives a `w` with Jacobi symbol `-1` and [`STAT_PARAM`]
//! challenges `y_i` from the transcript. For each challenge it picks the
//! unique `(a_i, b_i)` such that `y_i' = (-1)^a_i · w^b_i · y_i` is a square
//! modulo both primes and sends a fourth root `x_i` of `y_i'`. The flags are
//! not sent: the verifier accepts when `x_i^4` equals exactly one of `y_i`,
//! `-y_i`, `w·y_i` and `-w·y_i`.

use crate::{
    errors::{InternalError, Result},
    hash::Hash,
    parameters::{CRYPTOGRAPHIC_RETRY_MAX, STAT_PARAM},
    utils::{is_even, jacobi},
    zk::ProofError,
};
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

/// Common input of prover and verifier.
#[derive(Debug, Clone)]
pub struct Public<'a> {
    pub n: &'a BigNumber,
}

/// The factorisation of `N`.
pub struct Private<'a> {
    pub p: &'a BigNumber,
    pub q: &'a BigNumber,
    pub phi: &'a BigNumber,
}

/// A modulus proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    w: BigNumber,
    x: Vec<BigNumber>,
}

impl Proof {
    #[instrument(skip_all, err(Debug))]
    pub fn prove(hash: &Hash, public: &Public, private: &Private) -> Result<Self> {
        let n = public.n;
        let mut h = hash.clone();
        h.write_bn(b"N", n);

        let w = sample_w(&h, n).ok_or_else(|| {
            error!("Could not derive w with Jacobi symbol -1");
            InternalError::InternalInvariantFailed
        })?;
        h.write_bn(b"w", &w);

        let ys = challenges(&mut h, n).ok_or_else(|| {
            error!("Could not derive modulus proof challenges");
            InternalError::InternalInvariantFailed
        })?;

        let x = ys
            .iter()
            .map(|y| {
                let (_, _, y_prime) = make_quadratic_residue(y, &w, n, private.p, private.q);
                fourth_root_crt(&y_prime, private.p, private.q, n)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { w, x })
    }

    pub fn verify(&self, hash: &Hash, public: &Public) -> std::result::Result<(), ProofError> {
        let n = public.n;
        if is_even(n) {
            return Err(ProofError::EvenModulus);
        }
        if n.is_prime() {
            return Err(ProofError::PrimeModulus);
        }
        if self.w <= BigNumber::one() || &self.w >= n || jacobi(&self.w, n) != -1 {
            return Err(ProofError::BadW);
        }
        if self.x.len() != STAT_PARAM {
            return Err(ProofError::ResponseCount {
                expected: STAT_PARAM,
                actual: self.x.len(),
            });
        }

        let mut h = hash.clone();
        h.write_bn(b"N", n);
        h.write_bn(b"w", &self.w);
        let ys = challenges(&mut h, n).ok_or(ProofError::Challenge)?;

        let four = BigNumber::from(4u64);
        for (i, (x, y)) in self.x.iter().zip(ys.iter()).enumerate() {
            if x <= &BigNumber::one() || x >= n || x.gcd(n) != BigNumber::one() {
                return Err(ProofError::ResponseRange(i));
            }
            let x4 = x.modpow(&four, n);
            let minus_y = n - y;
            let wy = self.w.modmul(y, n);
            let minus_wy = n - &wy;
            let matches = [y, &minus_y, &wy, &minus_wy]
                .iter()
                .filter(|candidate| **candidate == &x4)
                .count();
            if matches != 1 {
                return Err(ProofError::ResponseEquation(i));
            }
        }
        Ok(())
    }

    pub fn marshal(&self) -> Result<Vec<u8>> {
        serialize!(self)
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self> {
        deserialize!(bytes)
    }

    #[cfg(test)]
    pub(crate) fn tamper(&mut self, w: BigNumber, x: BigNumber) {
        self.w = w;
        self.x.iter_mut().for_each(|x_i| *x_i = x.clone());
    }
}

/// Derive `w ∈ Z_N^*` with Jacobi symbol `-1` from a fork of the transcript.
fn sample_w(h: &Hash, n: &BigNumber) -> Option<BigNumber> {
    let mut fork = h.clone();
    fork.write_bytes(b"sampling w", b"");
    (0..CRYPTOGRAPHIC_RETRY_MAX)
        .filter_map(|_| fork.challenge_bn(n).ok())
        .find(|w| jacobi(w, n) == -1)
}

/// Derive the [`STAT_PARAM`] challenges, each a unit modulo `N`.
fn challenges(h: &mut Hash, n: &BigNumber) -> Option<Vec<BigNumber>> {
    let mut ys = Vec::with_capacity(STAT_PARAM);
    for _ in 0..STAT_PARAM {
        let y = (0..CRYPTOGRAPHIC_RETRY_MAX)
            .filter_map(|_| h.challenge_bn(n).ok())
            .find(|y| y != &BigNumber::zero() && y.gcd(n) == BigNumber::one())?;
        ys.push(y);
    }
    Some(ys)
}

fn is_square_mod_prime(x: &BigNumber, p: &BigNumber) -> bool {
    let exp = (p - BigNumber::one()) >> 1;
    x.modpow(&exp, p) == BigNumber::one()
}

/// Find the flags `(a, b)` such that `(-1)^a · w^b · y` is a square modulo
/// both `p` and `q`, and return that value.
pub(crate) fn make_quadratic_residue(
    y: &BigNumber,
    w: &BigNumber,
    n: &BigNumber,
    p: &BigNumber,
    q: &BigNumber,
) -> (bool, bool, BigNumber) {
    let y = y.nmod(n);
    for (a, b) in [(false, false), (true, false), (false, true), (true, true)] {
        let mut candidate = y.clone();
        if b {
            candidate = candidate.modmul(w, n);
        }
        if a {
            candidate = (n - &candidate).nmod(n);
        }
        if is_square_mod_prime(&candidate, p) && is_square_mod_prime(&candidate, q) {
            return (a, b, candidate);
        }
    }
    // Unreachable when w is a non-residue modulo exactly one of p and q.
    (false, false, y)
}

/// Fourth root of a square `x` modulo the Blum prime product `p·q`,
/// computed per prime and recombined.
fn fourth_root_crt(
    x: &BigNumber,
    p: &BigNumber,
    q: &BigNumber,
    n: &BigNumber,
) -> Result<BigNumber> {
    let root_mod = |prime: &BigNumber| {
        let e = (prime + BigNumber::one()) >> 2;
        let e = &e * &e;
        x.nmod(prime).modpow(&e, prime)
    };
    let r_p = root_mod(p);
    let r_q = root_mod(q);
    let q_inv = q.invert(p).ok_or(InternalError::InternalInvariantFailed)?;
    let p_inv = p.invert(q).ok_or(InternalError::InternalInvariantFailed)?;
    let combined = r_p.modmul(&q.modmul(&q_inv, n), n) + r_q.modmul(&p.modmul(&p_inv, n), n);
    Ok(combined.nmod(n))
}

/// Fourth root of a square `x` modulo a Blum modulus `n`, as
/// `x^(((φ+4)/8)^2) mod n`.
#[cfg(test)]
pub(crate) fn fourth_root(x: &BigNumber, phi: &BigNumber, n: &BigNumber) -> BigNumber {
    let e: BigNumber = (phi + BigNumber::from(4u64)) >> 3;
    let e = e.modmul(&e, phi);
    x.modpow(&e, n)
}
