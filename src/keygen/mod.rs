//! Key generation and key refresh.[^cite]
//!
//! Both protocols deal a degree-`t` Shamir sharing of an ECDSA secret key,
//! where `t` is the session threshold. Key generation samples a fresh key;
//! refresh re-randomizes the shares of an existing key without changing it.
//! Each party also generates a fresh Paillier key and ring-Pedersen parameters.
//!
//! # High-level protocol description
//! The protocol runs in four rounds:
//! - In the first round, each party samples a polynomial `f_i` (with zero
//!   constant term in refresh mode), a Paillier key, ring-Pedersen parameters
//!   and a share `ρ_i` of the joint randomness, and broadcasts a commitment to
//!   the public half of this material.
//! - In the second round, each party broadcasts a digest of every commitment
//!   it received, so that all parties can confirm they saw the same set.
//! - In the third round, each party opens its commitment.
//! - In the fourth round, each party checks every opening, derives the joint
//!   `ρ`, proves that its Paillier modulus is a Paillier-Blum modulus, that its
//!   Pedersen parameters are well formed and that it knows every coefficient
//!   of `f_i`, and sends `f_i(j)` encrypted to every other party `j`.
//!
//! Finally each party checks every proof and share and outputs the new
//! [`Session`] and [`Secret`].
//!
//! [^cite]: Ran Canetti, Rosario Gennaro, Steven Goldfeder, Nikolaos
//! Makriyannis, and Udi Peled. UC Non-Interactive, Proactive, Threshold ECDSA
//! with Identifiable Aborts. [EPrint archive,
//! 2021](https://eprint.iacr.org/archive/2021/060/1634824619.pdf). Figures 5 and 6.
// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

mod commit;
mod rounds;
mod share;

pub(crate) use rounds::{Output, Round1, Round2, Round3, Round4};

use crate::{
    errors::Result,
    hash::{Commitment, Decommitment, Hash},
    message::ProtocolId,
    parameters::SEC_BYTES,
    party::PartyId,
    round::{Round, StartRound},
    session::{Secret, Session, SessionConfig},
    zk::{modulus, prm, sch},
};
use commit::PublicBody;
use rounds::{Base, Previous};
use serde::{Deserialize, Serialize};
use share::EncryptedShare;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CommitMessage {
    pub(crate) commitment: Commitment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EchoMessage {
    pub(crate) echo: [u8; SEC_BYTES],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DecommitMessage {
    pub(crate) body: PublicBody,
    pub(crate) decommitment: Decommitment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ProofsAndShareMessage {
    pub(crate) modulus: modulus::Proof,
    pub(crate) prm: prm::Proof,
    pub(crate) schnorr: Vec<sch::Response>,
    pub(crate) share: EncryptedShare,
}

/// Start generating a fresh key shared among `party_ids` with the given
/// threshold.
pub fn start_keygen(
    self_id: PartyId,
    party_ids: Vec<PartyId>,
    threshold: usize,
) -> Result<StartRound> {
    let config = SessionConfig::new(self_id, party_ids, threshold)?;
    info!(
        "Keygen for {} parties with threshold {threshold}",
        config.party_ids().len()
    );
    let hash = config.transcript(ProtocolId::Keygen);
    Ok(start(ProtocolId::Keygen, config, hash, None))
}

/// Start refreshing the shares of the key described by `session`. The public
/// key and the joint randomness stay the same.
pub fn start_refresh(session: &Session, secret: &Secret) -> Result<StartRound> {
    let config = SessionConfig::new(
        secret.id().clone(),
        session.party_ids().to_vec(),
        session.threshold(),
    )?;
    session.public_share(secret.id())?;
    let hash = session.transcript(ProtocolId::Refresh);
    let previous = Previous {
        session: session.clone(),
        secret: secret.clone(),
    };
    Ok(start(
        ProtocolId::Refresh,
        config,
        hash,
        Some(Box::new(previous)),
    ))
}

fn start(
    protocol: ProtocolId,
    config: SessionConfig,
    hash: Hash,
    previous: Option<Box<Previous>>,
) -> StartRound {
    StartRound {
        protocol,
        self_id: config.self_id().clone(),
        parties: config.party_ids().to_vec(),
        round: Round::Keygen1(Round1 {
            base: Base {
                config,
                hash,
                previous,
            },
            contribution: None,
            commitment: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        curve::CurvePoint,
        errors::{InternalError, ProtocolError},
        message::{Message, Payload},
        paillier::{Ciphertext, PublicKey},
        party::party_ids,
        polynomial::lagrange_coefficient,
        round::{KeyOutput, ProtocolOutput},
        testing::Network,
        utils::testing::init_testing,
    };
    use k256::Scalar;
    use libpaillier::unknown_order::BigNumber;
    use rand::rngs::StdRng;

    fn keys(outputs: Vec<Result<ProtocolOutput>>) -> Vec<KeyOutput> {
        outputs
            .into_iter()
            .map(|r| match r.unwrap() {
                ProtocolOutput::Key(key) => *key,
                other => panic!("unexpected output {other:?}"),
            })
            .collect()
    }

    fn run_keygen(rng: &mut StdRng, ids: &[PartyId], threshold: usize) -> Vec<KeyOutput> {
        let mut network = Network::start(rng, ids, |id| {
            start_keygen(id.clone(), ids.to_vec(), threshold)
        })
        .unwrap();
        network.run(rng).unwrap();
        keys(network.results())
    }

    /// Run keygen with `tamper` applied to messages in flight and return the
    /// error that aborted the run.
    fn tampered_keygen(tamper: impl FnMut(&mut Message) + 'static) -> ProtocolError {
        let mut rng = init_testing();
        let ids = party_ids(["a", "b"]).unwrap();
        let mut network =
            Network::start(&mut rng, &ids, |id| start_keygen(id.clone(), ids.clone(), 1)).unwrap();
        network.tamper(tamper);
        match network.run(&mut rng).unwrap_err() {
            InternalError::Protocol(e) => e,
            other => panic!("unexpected error {other:?}"),
        }
    }

    fn tamper_decommit_from_b(mut f: impl FnMut(&mut PublicBody) + 'static) -> ProtocolError {
        tampered_keygen(move |message| {
            if message.from().as_str() == "b" {
                if let Payload::KeygenDecommit(d) = &mut message.payload {
                    f(&mut d.body);
                }
            }
        })
    }

    fn assert_blames_b(e: &ProtocolError, reason: &str) {
        assert_eq!(e.culprit, Some(PartyId::new("b").unwrap()));
        assert!(e.reason.contains(reason), "reason was {:?}", e.reason);
    }

    /// Interpolate the secret from `t + 1` shares.
    fn reconstruct(keys: &[KeyOutput]) -> Scalar {
        let ids: Vec<PartyId> = keys.iter().map(|k| k.secret.id().clone()).collect();
        keys.iter()
            .map(|k| lagrange_coefficient(k.secret.id(), &ids).unwrap() * k.secret.ecdsa())
            .fold(Scalar::ZERO, |acc, s| acc + s)
    }

    #[test]
    fn keygen_then_refresh_keeps_the_key() {
        let mut rng = init_testing();
        let ids = party_ids(["a", "b", "c"]).unwrap();
        let generated = run_keygen(&mut rng, &ids, 1);

        let session = &generated[0].session;
        assert!(generated.iter().all(|k| &k.session == session));
        for key in &generated {
            let public = session.public_share(key.secret.id()).unwrap();
            assert_eq!(CurvePoint::base_mul(key.secret.ecdsa()), public.ecdsa);
            assert_eq!(&public.paillier, key.secret.paillier().public_key());
        }
        let x = reconstruct(&generated[..2]);
        assert_eq!(CurvePoint::base_mul(&x), *session.public_key());
        assert_eq!(reconstruct(&generated[1..]), x);

        let mut network = Network::start(&mut rng, &ids, |id| {
            let key = generated.iter().find(|k| k.secret.id() == id).unwrap();
            start_refresh(&key.session, &key.secret)
        })
        .unwrap();
        network.run(&mut rng).unwrap();
        let refreshed = keys(network.results());

        let new_session = &refreshed[0].session;
        assert_eq!(new_session.public_key(), session.public_key());
        assert_eq!(new_session.rid(), session.rid());
        for (old, new) in generated.iter().zip(&refreshed) {
            assert_ne!(old.secret.ecdsa(), new.secret.ecdsa());
            assert_ne!(
                old.secret.paillier().public_key(),
                new.secret.paillier().public_key()
            );
        }
        assert_eq!(reconstruct(&refreshed[..2]), x);
    }

    #[test]
    fn short_rho_names_the_sender() {
        let e = tamper_decommit_from_b(|body| {
            body.rho.pop();
        });
        assert_blames_b(&e, "rho");
    }

    #[test]
    fn wrong_degree_names_the_sender() {
        let e = tamper_decommit_from_b(|body| {
            body.exponent.coefficients_mut().push(CurvePoint::GENERATOR);
        });
        assert_blames_b(&e, "degree");
    }

    #[test]
    fn small_paillier_modulus_names_the_sender() {
        let e = tamper_decommit_from_b(|body| {
            body.paillier = PublicKey::try_from(BigNumber::from(311u64 * 331)).unwrap();
        });
        assert_blames_b(&e, "Paillier");
    }

    #[test]
    fn bad_pedersen_parameters_name_the_sender() {
        let e = tamper_decommit_from_b(|body| {
            let t = body.pedersen.t().clone();
            body.pedersen = body.pedersen.clone().with_s(t);
        });
        assert_blames_b(&e, "Pedersen");
    }

    #[test]
    fn altered_opening_names_the_sender() {
        let e = tamper_decommit_from_b(|body| {
            body.rho[0] ^= 1;
        });
        assert_blames_b(&e, "decommitment");
    }

    #[test]
    fn bad_schnorr_response_names_the_sender() {
        let e = tampered_keygen(|message| {
            if message.from().as_str() == "b" {
                if let Payload::KeygenProofsAndShare(p) = &mut message.payload {
                    p.schnorr.swap(0, 1);
                }
            }
        });
        assert_blames_b(&e, "Schnorr");
    }

    #[test]
    fn inconsistent_share_names_the_sender() {
        let e = tampered_keygen(|message| {
            if message.from().as_str() == "b" {
                if let Payload::KeygenProofsAndShare(p) = &mut message.payload {
                    *p.share.ciphertext_mut() = Ciphertext::from_raw(BigNumber::one());
                }
            }
        });
        assert_blames_b(&e, "inconsistent");
    }

    #[test]
    fn refresh_rejects_a_nonzero_constant() {
        let mut rng = init_testing();
        let ids = party_ids(["a", "b"]).unwrap();
        let generated = run_keygen(&mut rng, &ids, 1);

        let mut network = Network::start(&mut rng, &ids, |id| {
            let key = generated.iter().find(|k| k.secret.id() == id).unwrap();
            start_refresh(&key.session, &key.secret)
        })
        .unwrap();
        network.tamper(|message| {
            if message.from().as_str() == "b" {
                if let Payload::KeygenDecommit(d) = &mut message.payload {
                    d.body.exponent.coefficients_mut()[0] = CurvePoint::GENERATOR;
                }
            }
        });
        match network.run(&mut rng).unwrap_err() {
            InternalError::Protocol(e) => assert_blames_b(&e, "constant"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn start_checks_the_party_set() {
        let ids = party_ids(["a", "b", "c"]).unwrap();
        let outsider = PartyId::new("z").unwrap();
        assert!(start_keygen(outsider, ids.clone(), 1).is_err());
        assert!(start_keygen(ids[0].clone(), ids.clone(), 3).is_err());
        let started = start_keygen(ids[0].clone(), ids.clone(), 2).unwrap();
        assert_eq!(started.protocol(), ProtocolId::Keygen);
        assert_eq!(started.parties(), ids.as_slice());
    }
}
