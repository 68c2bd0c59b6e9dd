//! Interactive threshold signing.
//!
//! Any `t + 1` parties of a [`Session`] can jointly sign a message. Each signer
//! turns its Shamir share into an additive share `w_i = λ_i·x_i` of the secret
//! key, then the signers run four rounds:
//! - each signer samples nonce shares `k_i`, `γ_i` and broadcasts `K_i =
//!   Enc_i(k_i)` under its own Paillier key;
//! - each signer sends every peer `j` the point `Γ_i = γ_i·G` and two
//!   multiplicative-to-additive (MtA) ciphertexts, `γ_i ⊙ K_j ⊕ Enc_j(-β)` and
//!   `w_i ⊙ K_j ⊕ Enc_j(-β̂)`;
//! - each signer decrypts its MtA shares and broadcasts its share `δ_i` of
//!   `δ = kγ` together with `Δ_i = k_i·Γ`;
//! - each signer checks `δ·G = ΣΔ_j`, derives `R = δ⁻¹·Γ` and broadcasts its
//!   signature share `σ_i = k_i·m + r·χ_i`.
//!
//! The signature `(r, Σσ_j)` is normalized to low-S and checked against the
//! session public key before it is returned.
//!
//! The MtA ciphertexts carry no range proofs, so a malicious signer can bias
//! the result or leak information about its peers' nonces; only honest
//! execution is checked, through the final signature verification.
// Copyright (c) 2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

mod rounds;

pub(crate) use rounds::{Output, Round1, Round2, Round3, Round4};

use crate::{
    curve::CurvePoint,
    errors::{CallerError, InternalError, Result},
    message::ProtocolId,
    paillier::Ciphertext,
    party::PartyId,
    polynomial::lagrange_coefficient,
    round::{Round, StartRound},
    session::{Secret, Session},
};
use k256::Scalar;
use rounds::Base;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EncryptedNonceMessage {
    pub(crate) k: Ciphertext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct MtaMessage {
    pub(crate) big_gamma: CurvePoint,
    pub(crate) d: Ciphertext,
    pub(crate) d_hat: Ciphertext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DeltaMessage {
    pub(crate) delta: Scalar,
    pub(crate) big_delta: CurvePoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SignatureShareMessage {
    pub(crate) sigma: Scalar,
}

/// Start signing `message` with the key of `session`, together with
/// `signers`.
///
/// `signers` must be distinct parties of the session, include the holder of
/// `secret`, and number more than the session threshold.
pub fn start_sign(
    session: &Session,
    secret: &Secret,
    signers: &[PartyId],
    message: &[u8],
) -> Result<StartRound> {
    let mut sorted = signers.to_vec();
    sorted.sort();
    sorted.dedup();
    if sorted.len() != signers.len() {
        error!("Signer set contains duplicate identifiers");
        Err(CallerError::BadPartySet("duplicate signer".into()))?
    }
    if let Some(outsider) = signers
        .iter()
        .find(|id| !session.party_ids().contains(*id))
    {
        error!("Signer {outsider} is not a party of the session");
        Err(CallerError::BadPartySet(format!(
            "{outsider} is not a party of the session"
        )))?
    }
    if !signers.contains(secret.id()) {
        error!("Signer set does not contain {}", secret.id());
        Err(CallerError::BadPartySet(format!(
            "{} is not a signer",
            secret.id()
        )))?
    }
    if signers.len() <= session.threshold() {
        error!(
            "{} signers cannot sign with threshold {}",
            signers.len(),
            session.threshold()
        );
        Err(CallerError::BadThreshold {
            threshold: session.threshold(),
            parties: signers.len(),
        })?
    }
    let own_public = session.public_share(secret.id())?;
    if own_public.ecdsa != CurvePoint::base_mul(secret.ecdsa()) {
        error!("Secret share of {} does not match the session", secret.id());
        return Err(InternalError::CallingApplicationMistake(
            CallerError::BadPartySet("secret does not belong to this session".into()),
        ));
    }

    info!("{} signing with {} signers", secret.id(), signers.len());
    let w = lagrange_coefficient(secret.id(), signers)? * secret.ecdsa();
    Ok(StartRound {
        protocol: ProtocolId::Sign,
        self_id: secret.id().clone(),
        parties: signers.to_vec(),
        round: Round::Sign1(Round1 {
            base: Base {
                session: session.clone(),
                secret: secret.clone(),
                signers: signers.to_vec(),
                message: message.to_vec(),
            },
            w,
            nonces: None,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        curve::verify_signature,
        keygen::start_keygen,
        message::Payload,
        party::party_ids,
        round::{KeyOutput, ProtocolOutput},
        testing::Network,
        utils::testing::init_testing,
    };
    use rand::rngs::StdRng;

    fn generate(rng: &mut StdRng, ids: &[PartyId], threshold: usize) -> Vec<KeyOutput> {
        let mut network = Network::start(rng, ids, |id| {
            start_keygen(id.clone(), ids.to_vec(), threshold)
        })
        .unwrap();
        network.run(rng).unwrap();
        network
            .results()
            .into_iter()
            .map(|r| match r.unwrap() {
                ProtocolOutput::Key(key) => *key,
                other => panic!("unexpected output {other:?}"),
            })
            .collect()
    }

    fn key_of<'a>(keys: &'a [KeyOutput], id: &PartyId) -> &'a KeyOutput {
        keys.iter().find(|k| k.secret.id() == id).unwrap()
    }

    fn sign_network(
        rng: &mut StdRng,
        keys: &[KeyOutput],
        signers: &[PartyId],
        message: &[u8],
    ) -> Network {
        Network::start(rng, signers, |id| {
            let key = key_of(keys, id);
            start_sign(&key.session, &key.secret, signers, message)
        })
        .unwrap()
    }

    #[test]
    fn any_threshold_subset_signs() {
        let mut rng = init_testing();
        let ids = party_ids(["a", "b", "c"]).unwrap();
        let keys = generate(&mut rng, &ids, 1);
        let public_key = *keys[0].session.public_key();

        for signers in [vec![ids[0].clone(), ids[2].clone()], ids.clone()] {
            let mut network = sign_network(&mut rng, &keys, &signers, b"hello");
            network.run(&mut rng).unwrap();
            for result in network.results() {
                match result.unwrap() {
                    ProtocolOutput::Signature(sig) => {
                        assert!(verify_signature(&public_key, b"hello", &sig));
                        assert!(!verify_signature(&public_key, b"goodbye", &sig));
                    }
                    other => panic!("unexpected output {other:?}"),
                }
            }
        }
    }

    #[test]
    fn corrupted_delta_aborts_the_run() {
        let mut rng = init_testing();
        let ids = party_ids(["a", "b"]).unwrap();
        let keys = generate(&mut rng, &ids, 1);
        let mut network = sign_network(&mut rng, &keys, &ids, b"hello");
        network.tamper(|message| {
            if message.from().as_str() == "b" {
                if let Payload::SignDelta(d) = &mut message.payload {
                    d.delta += Scalar::ONE;
                }
            }
        });
        match network.run(&mut rng).unwrap_err() {
            InternalError::Protocol(e) => assert!(e.reason.contains("delta")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn start_checks_the_signer_set() {
        let mut rng = init_testing();
        let ids = party_ids(["a", "b", "c"]).unwrap();
        let keys = generate(&mut rng, &ids, 1);
        let a = key_of(&keys, &ids[0]);
        let outsider = PartyId::new("z").unwrap();

        let cases = [
            vec![ids[0].clone()],
            vec![ids[0].clone(), ids[0].clone()],
            vec![ids[0].clone(), outsider],
            vec![ids[1].clone(), ids[2].clone()],
        ];
        for signers in cases {
            assert!(matches!(
                start_sign(&a.session, &a.secret, &signers, b"m"),
                Err(InternalError::CallingApplicationMistake(_))
            ));
        }
        let started = start_sign(&a.session, &a.secret, &ids[..2], b"m").unwrap();
        assert_eq!(started.protocol(), ProtocolId::Sign);
        assert_eq!(started.parties(), &ids[..2]);
    }
}
