// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    curve::{bn_to_scalar, order, scalar_to_bn},
    errors::{InternalError, Result},
    paillier::{Ciphertext, PublicKey, SecretKey},
    party::PartyId,
};
use k256::Scalar;
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

/// A polynomial evaluation `f_i(j)` encrypted under party `j`'s Paillier key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct EncryptedShare {
    ciphertext: Ciphertext,
}

impl EncryptedShare {
    pub(crate) fn encrypt<R: RngCore + CryptoRng>(
        rng: &mut R,
        share: &Scalar,
        pk: &PublicKey,
    ) -> Result<Self> {
        if &(order() * 2) >= pk.modulus() {
            error!("Paillier modulus is too small to carry a share");
            return Err(InternalError::InternalInvariantFailed);
        }
        let (ciphertext, _nonce) = pk.encrypt(rng, &scalar_to_bn(share))?;
        Ok(Self { ciphertext })
    }

    /// Decrypt a share sent by `sender`. The plaintext must lie in `[0, q)`.
    pub(crate) fn decrypt(&self, sk: &SecretKey, sender: &PartyId) -> Result<Scalar> {
        let x = sk.decrypt(&self.ciphertext).map_err(|_| {
            error!("Share from {sender} is not a valid ciphertext");
            InternalError::blame(sender, "share is not a valid ciphertext")
        })?;
        if x < BigNumber::zero() || x >= order() {
            error!("Share from {sender} decrypts out of range");
            return Err(InternalError::blame(sender, "share is out of range"));
        }
        bn_to_scalar(&x)
    }

    #[cfg(test)]
    pub(crate) fn ciphertext_mut(&mut self) -> &mut Ciphertext {
        &mut self.ciphertext
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{curve::random_scalar, utils::testing::init_testing};

    #[test]
    fn share_decrypts_to_itself_and_rejects_large_plaintexts() {
        let mut rng = init_testing();
        let sk = SecretKey::generate(&mut rng).unwrap();
        let sender = PartyId::new("a").unwrap();
        let x = random_scalar(&mut rng);

        let share = EncryptedShare::encrypt(&mut rng, &x, sk.public_key()).unwrap();
        assert_eq!(share.decrypt(&sk, &sender).unwrap(), x);

        let (c, _) = sk.public_key().encrypt(&mut rng, &(order() + BigNumber::one())).unwrap();
        let bad = EncryptedShare { ciphertext: c };
        match bad.decrypt(&sk, &sender).unwrap_err() {
            InternalError::Protocol(e) => assert_eq!(e.culprit, Some(sender)),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
