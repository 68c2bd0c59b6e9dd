// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    errors::{CallerError, InternalError, Result},
    parameters::CRYPTOGRAPHIC_RETRY_MAX,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};

/// Sample a number uniformly at random from the range [0, n).
pub(crate) fn random_positive_bn<R: RngCore + CryptoRng>(rng: &mut R, n: &BigNumber) -> BigNumber {
    BigNumber::from_rng(n, rng)
}

/// Generate a random `BigNumber` that is in the multiplicative group of
/// integers modulo `n`.
pub(crate) fn random_bn_in_z_star<R: RngCore + CryptoRng>(
    rng: &mut R,
    n: &BigNumber,
) -> Result<BigNumber> {
    std::iter::repeat_with(|| BigNumber::from_rng(n, rng))
        .take(CRYPTOGRAPHIC_RETRY_MAX)
        .find(|result| result != &BigNumber::zero() && result.gcd(n) == BigNumber::one())
        .ok_or(InternalError::CallingApplicationMistake(
            CallerError::RetryFailed,
        ))
}

/// Number of significant bits of `|x|`.
pub(crate) fn bit_length(x: &BigNumber) -> usize {
    let bytes = x.to_bytes();
    match bytes.iter().position(|b| *b != 0) {
        Some(first) => (bytes.len() - first - 1) * 8 + (8 - bytes[first].leading_zeros() as usize),
        None => 0,
    }
}

/// The lowest byte of `|x|`.
fn low_byte(x: &BigNumber) -> u8 {
    x.to_bytes().last().copied().unwrap_or(0)
}

pub(crate) fn is_even(x: &BigNumber) -> bool {
    low_byte(x) & 1 == 0
}

/// Jacobi symbol `(a / n)` for odd positive `n`. Returns `0` when
/// `gcd(a, n) != 1`.
pub(crate) fn jacobi(a: &BigNumber, n: &BigNumber) -> i8 {
    let mut a = a.nmod(n);
    let mut n = n.clone();
    let mut t = 1i8;
    while a != BigNumber::zero() {
        while is_even(&a) {
            a = a >> 1;
            let r = low_byte(&n) & 7;
            if r == 3 || r == 5 {
                t = -t;
            }
        }
        std::mem::swap(&mut a, &mut n);
        if low_byte(&a) & 3 == 3 && low_byte(&n) & 3 == 3 {
            t = -t;
        }
        a = a.nmod(&n);
    }
    if n == BigNumber::one() {
        t
    } else {
        0
    }
}

/// XOR `src` into `dst`.
pub(crate) fn xor_in_place(dst: &mut [u8], src: &[u8]) {
    dst.iter_mut().zip(src).for_each(|(d, s)| *d ^= s);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    #[test]
    fn bit_length_matches_shifts() {
        assert_eq!(bit_length(&BigNumber::zero()), 0);
        assert_eq!(bit_length(&BigNumber::one()), 1);
        assert_eq!(bit_length(&BigNumber::from(255u64)), 8);
        assert_eq!(bit_length(&BigNumber::from(256u64)), 9);
        assert_eq!(bit_length(&(BigNumber::one() << 2047)), 2048);
    }

    #[test]
    fn jacobi_matches_small_table() {
        // (a / 15) for a = 0..15
        let expected = [0, 1, 1, 0, 1, 0, 0, -1, 1, 0, 0, -1, 0, -1, -1];
        let n = BigNumber::from(15u64);
        for (a, want) in expected.iter().enumerate() {
            assert_eq!(jacobi(&BigNumber::from(a as u64), &n), *want, "a = {a}");
        }
    }

    #[test]
    fn jacobi_is_legendre_for_primes() {
        let mut rng = init_testing();
        let p = BigNumber::from(311u64);
        let exp = (&p - BigNumber::one()) >> 1;
        for _ in 0..50 {
            let a = random_bn_in_z_star(&mut rng, &p).unwrap();
            let euler = a.modpow(&exp, &p);
            let expected = if euler == BigNumber::one() { 1 } else { -1 };
            assert_eq!(jacobi(&a, &p), expected);
        }
    }

    #[test]
    fn random_z_star_elements_are_units() {
        let mut rng = init_testing();
        let n = BigNumber::from(311u64 * 331);
        for _ in 0..100 {
            let x = random_bn_in_z_star(&mut rng, &n).unwrap();
            assert_eq!(x.gcd(&n), BigNumber::one());
        }
    }
}

////////////////////////////
// Test Utility Functions //
////////////////////////////

/// Returns an rng to be used for testing. This will print the rng seed
/// to stderr so that if a test fails, the failing seed can be recovered
/// and used for debugging.
#[cfg(test)]
pub(crate) mod testing {
    use rand::{
        rngs::{OsRng, StdRng},
        Rng, SeedableRng,
    };
    use tracing_subscriber::{
        filter::Targets, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    };

    /// Initialize any fields necessary for our tests. This should be called at
    /// the top of all our tests.
    pub(crate) fn init_testing() -> StdRng {
        let mut seeder = OsRng;
        let seed = seeder.gen();
        eprintln!(
            "To re-run test with the same randomness, use init_testing_with_seed() \
             with the following seed:"
        );
        eprintln!("\t{seed:?}");
        StdRng::from_seed(seed)
    }

    /// A seeded version of [`init_testing`] that also turns on logging.
    ///
    /// Only call this while debugging: some tests feed bad input on purpose
    /// and the resulting `error!` events look like failures.
    #[allow(unused)]
    pub(crate) fn init_testing_with_seed(seed: [u8; 32]) -> StdRng {
        let logging_level = EnvFilter::from_default_env()
            .max_level_hint()
            .and_then(|hint| hint.into_level())
            .unwrap_or(tracing::Level::INFO);

        let targets = Targets::new().with_target("tss_cmp", logging_level);
        let stdout_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_filter(targets);

        // Fails if logging was already set up for this thread, which is fine.
        let _ = tracing_subscriber::registry().with(stdout_layer).try_init();

        StdRng::from_seed(seed)
    }
}
