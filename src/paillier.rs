// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Paillier encryption over a Blum modulus `N = p·q` with `p ≡ q ≡ 3 mod 4`.
//!
//! The keys wrap [`libpaillier`]; plaintexts are signed integers, reduced
//! modulo `N` on the way in and centered on the way out.

use crate::{
    errors::{CallerError, InternalError, Result},
    parameters::{BLUM_PRIME_BITS, CRYPTOGRAPHIC_RETRY_MAX, PAILLIER_BITS},
    utils::{bit_length, random_bn_in_z_star},
};
use libpaillier::{unknown_order::BigNumber, DecryptionKey, EncryptionKey};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};
use zeroize::ZeroizeOnDrop;

/// Paillier public key.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "BigNumber", into = "BigNumber")]
pub struct PublicKey(EncryptionKey);

impl TryFrom<BigNumber> for PublicKey {
    type Error = String;

    fn try_from(n: BigNumber) -> std::result::Result<Self, Self::Error> {
        EncryptionKey::from_bytes(n.to_bytes()).map(Self)
    }
}

impl From<PublicKey> for BigNumber {
    fn from(pk: PublicKey) -> Self {
        pk.0.n().clone()
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.n() == other.0.n()
    }
}

impl Eq for PublicKey {}

impl PublicKey {
    pub fn modulus(&self) -> &BigNumber {
        self.0.n()
    }

    pub(crate) fn bit_length(&self) -> usize {
        bit_length(self.0.n())
    }

    /// Encrypt `m` (interpreted modulo `N`), returning the ciphertext and the
    /// nonce used.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        m: &BigNumber,
    ) -> Result<(Ciphertext, BigNumber)> {
        let nonce = random_bn_in_z_star(rng, self.modulus())?;
        let c = self.encrypt_with_nonce(m, &nonce)?;
        Ok((c, nonce))
    }

    /// Encrypt `m` (interpreted modulo `N`) with a caller-chosen nonce.
    pub fn encrypt_with_nonce(&self, m: &BigNumber, nonce: &BigNumber) -> Result<Ciphertext> {
        let (c, _) = self
            .0
            .encrypt(m.nmod(self.modulus()).to_bytes(), Some(nonce.clone()))
            .ok_or_else(|| {
                error!("Paillier encryption rejected its plaintext or nonce");
                InternalError::InternalInvariantFailed
            })?;
        Ok(Ciphertext(c))
    }

    /// Homomorphic sum of two ciphertexts.
    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.0.add(&a.0, &b.0).map(Ciphertext).ok_or_else(|| {
            error!("Paillier addition received a ciphertext outside Z_N^2");
            InternalError::InternalInvariantFailed
        })
    }

    /// Homomorphic multiplication of the plaintext of `c` by `k`.
    pub fn mul(&self, c: &Ciphertext, k: &BigNumber) -> Result<Ciphertext> {
        self.0
            .mul(&c.0, &k.nmod(self.modulus()))
            .map(Ciphertext)
            .ok_or_else(|| {
                error!("Paillier multiplication received a ciphertext outside Z_N^2");
                InternalError::InternalInvariantFailed
            })
    }

    /// A ciphertext is valid when it is a unit modulo `N²`.
    pub fn validate_ciphertext(&self, c: &Ciphertext) -> bool {
        c.0 > BigNumber::zero() && &c.0 < self.0.nn() && c.0.gcd(self.0.n()) == BigNumber::one()
    }
}

/// Paillier secret key.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SecretKey {
    #[zeroize(skip)]
    key: DecryptionKey,
    #[zeroize(skip)]
    public: PublicKey,
    p: BigNumber,
    q: BigNumber,
    phi: BigNumber,
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("public", &self.public)
            .field("factors", &"[redacted]")
            .finish()
    }
}

impl SecretKey {
    /// Sample two distinct Blum primes and build the key.
    #[instrument(skip_all, err(Debug))]
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self> {
        for _ in 0..CRYPTOGRAPHIC_RETRY_MAX {
            let p = blum_prime(rng, BLUM_PRIME_BITS)?;
            let q = blum_prime(rng, BLUM_PRIME_BITS)?;
            if p == q {
                continue;
            }
            let key = Self::from_primes(p, q)?;
            if key.public.bit_length() == PAILLIER_BITS {
                return Ok(key);
            }
        }
        error!("Failed to sample a Paillier modulus of the requested size");
        Err(CallerError::RetryFailed)?
    }

    pub(crate) fn from_primes(p: BigNumber, q: BigNumber) -> Result<Self> {
        let key = DecryptionKey::with_primes_unchecked(&p, &q).ok_or_else(|| {
            error!("Primes do not form a Paillier key");
            InternalError::InternalInvariantFailed
        })?;
        let public = PublicKey(EncryptionKey::from(&key));
        let phi = (&p - BigNumber::one()) * (&q - BigNumber::one());
        Ok(Self {
            key,
            public,
            p,
            q,
            phi,
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub(crate) fn p(&self) -> &BigNumber {
        &self.p
    }

    pub(crate) fn q(&self) -> &BigNumber {
        &self.q
    }

    pub(crate) fn phi(&self) -> &BigNumber {
        &self.phi
    }

    /// Decrypt `c` to the representative of its plaintext in `(-N/2, N/2]`.
    pub fn decrypt(&self, c: &Ciphertext) -> Result<BigNumber> {
        if !self.public.validate_ciphertext(c) {
            error!("Ciphertext is not a unit modulo N^2");
            return Err(InternalError::InternalInvariantFailed);
        }
        let bytes = self.key.decrypt(&c.0).ok_or_else(|| {
            error!("Paillier decryption failed");
            InternalError::InternalInvariantFailed
        })?;
        let m = BigNumber::from_slice(bytes);
        let n = self.public.modulus();
        if m > (n.clone() >> 1) {
            Ok(m - n)
        } else {
            Ok(m)
        }
    }
}

/// A Paillier ciphertext.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext(BigNumber);

impl Ciphertext {
    #[cfg(test)]
    pub(crate) fn from_raw(c: BigNumber) -> Self {
        Self(c)
    }
}

/// Sample a prime `p ≡ 3 mod 4` of exactly `bits` bits whose two top bits are
/// set, so that the product of two such primes has exactly `2·bits` bits.
pub(crate) fn blum_prime<R: RngCore + CryptoRng>(rng: &mut R, bits: usize) -> Result<BigNumber> {
    let len = bits.div_ceil(8);
    let excess = len * 8 - bits;
    let four = BigNumber::from(4u64);
    for _ in 0..CRYPTOGRAPHIC_RETRY_MAX {
        let mut bytes = vec![0u8; len];
        rng.fill_bytes(&mut bytes);
        bytes[0] &= 0xff >> excess;
        bytes[0] |= 0xc0 >> excess;
        bytes[len - 1] |= 0x03;
        let mut candidate = BigNumber::from_slice(&bytes);
        // Walk forward through the residue class 3 mod 4.
        for _ in 0..bits * 4 {
            if candidate.is_prime() {
                break;
            }
            candidate = candidate + &four;
        }
        if candidate.is_prime() && bit_length(&candidate) == bits {
            return Ok(candidate);
        }
    }
    error!("Failed to sample a Blum prime");
    Err(CallerError::RetryFailed)?
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    #[test]
    fn blum_prime_has_requested_shape() {
        let mut rng = init_testing();
        let p = blum_prime(&mut rng, 256).unwrap();
        assert!(p.is_prime());
        assert_eq!(bit_length(&p), 256);
        assert_eq!(p.nmod(&BigNumber::from(4u64)), BigNumber::from(3u64));
    }

    #[test]
    fn encryption_round_trips_with_signs() {
        let mut rng = init_testing();
        let sk = SecretKey::generate(&mut rng).unwrap();
        let pk = sk.public_key();
        assert_eq!(pk.bit_length(), PAILLIER_BITS);

        for m in [
            BigNumber::one(),
            BigNumber::from(42u64),
            BigNumber::zero() - BigNumber::from(42u64),
            BigNumber::one() << 1000,
        ] {
            let (c, _) = pk.encrypt(&mut rng, &m).unwrap();
            assert_eq!(sk.decrypt(&c).unwrap(), m);
        }
    }

    #[test]
    fn homomorphic_operations() {
        let mut rng = init_testing();
        let sk = SecretKey::generate(&mut rng).unwrap();
        let pk = sk.public_key();

        let a = BigNumber::from(1234u64);
        let b = BigNumber::zero() - BigNumber::from(99u64);
        let k = BigNumber::from(7u64);
        let (ca, _) = pk.encrypt(&mut rng, &a).unwrap();
        let (cb, _) = pk.encrypt(&mut rng, &b).unwrap();

        let sum = pk.add(&ca, &cb).unwrap();
        assert_eq!(sk.decrypt(&sum).unwrap(), &a + &b);

        let prod = pk.mul(&ca, &k).unwrap();
        assert_eq!(sk.decrypt(&prod).unwrap(), &a * &k);

        let neg = pk
            .mul(&ca, &(BigNumber::zero() - BigNumber::one()))
            .unwrap();
        assert_eq!(sk.decrypt(&neg).unwrap(), BigNumber::zero() - &a);
    }

    #[test]
    fn wrapped_key_matches_the_textbook_scheme() {
        let mut rng = init_testing();
        let sk = SecretKey::generate(&mut rng).unwrap();
        let pk = sk.public_key();
        let n = pk.modulus();
        assert_eq!(&(sk.p() * sk.q()), n);

        let m = BigNumber::from(271828u64);
        let nonce = random_bn_in_z_star(&mut rng, n).unwrap();
        let c = pk.encrypt_with_nonce(&m, &nonce).unwrap();
        let nn = n * n;
        let expected = (BigNumber::one() + &m * n)
            .nmod(&nn)
            .modmul(&nonce.modpow(n, &nn), &nn);
        assert_eq!(c, Ciphertext::from_raw(expected));
        assert_eq!(sk.decrypt(&c).unwrap(), m);

        let rebuilt = PublicKey::try_from(n.clone()).unwrap();
        assert_eq!(&rebuilt, pk);
        assert_eq!(rebuilt.encrypt_with_nonce(&m, &nonce).unwrap(), c);
    }

    #[test]
    fn invalid_ciphertexts_are_rejected() {
        let mut rng = init_testing();
        let sk = SecretKey::generate(&mut rng).unwrap();
        assert!(sk.decrypt(&Ciphertext::from_raw(BigNumber::zero())).is_err());
        assert!(sk
            .decrypt(&Ciphertext::from_raw(sk.public_key().modulus().clone()))
            .is_err());
    }

    #[test]
    fn public_key_serde_recomputes_square() {
        let mut rng = init_testing();
        let sk = SecretKey::generate(&mut rng).unwrap();
        let bytes = bincode::serialize(sk.public_key()).unwrap();
        let pk: PublicKey = bincode::deserialize(&bytes).unwrap();
        assert_eq!(&pk, sk.public_key());
    }
}
