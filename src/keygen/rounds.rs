// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use super::{
    commit::PublicBody, share::EncryptedShare, CommitMessage, DecommitMessage, EchoMessage,
    ProofsAndShareMessage,
};
use crate::{
    curve::{random_scalar, CurvePoint},
    errors::{InternalError, Result},
    hash::{Commitment, Decommitment, Hash},
    message::{unexpected_payload, KeygenMessageType, Message, MessageType, Payload, ProtocolId},
    paillier::SecretKey,
    parameters::SEC_BYTES,
    party::PartyId,
    pedersen::{Lambda, Parameters},
    polynomial::Polynomial,
    round::{KeyOutput, ProtocolOutput, ProtocolRound, Round, Transition},
    session::{PublicShare, Secret, Session, SessionConfig},
    utils::xor_in_place,
    zk::{modulus, prm, sch},
};
use k256::Scalar;
use rand::{CryptoRng, RngCore};
use std::collections::BTreeMap;
use tracing::{error, info, instrument};

/// Key material being replaced by a refresh.
#[derive(Debug)]
pub(crate) struct Previous {
    pub(crate) session: Session,
    pub(crate) secret: Secret,
}

/// State every round carries forward.
#[derive(Debug)]
pub(crate) struct Base {
    pub(crate) config: SessionConfig,
    pub(crate) hash: Hash,
    /// Present when refreshing an existing key.
    pub(crate) previous: Option<Box<Previous>>,
}

impl Base {
    fn protocol(&self) -> ProtocolId {
        if self.previous.is_some() {
            ProtocolId::Refresh
        } else {
            ProtocolId::Keygen
        }
    }

    fn self_id(&self) -> &PartyId {
        self.config.self_id()
    }

    fn threshold(&self) -> usize {
        self.config.threshold()
    }

    fn broadcast(&self, payload: Payload) -> Message {
        Message::broadcast(self.protocol(), self.self_id(), payload)
    }
}

/// This party's secret contribution, sampled in round one.
#[derive(Debug)]
pub(crate) struct Contribution {
    paillier: SecretKey,
    lambda: Lambda,
    polynomial: Polynomial,
    schnorr: Vec<sch::Randomness>,
    body: PublicBody,
    decommitment: Decommitment,
}

/// Samples the contribution and broadcasts a commitment to it.
#[derive(Debug)]
pub(crate) struct Round1 {
    pub(crate) base: Base,
    pub(crate) contribution: Option<Box<Contribution>>,
    pub(crate) commitment: Option<Commitment>,
}

impl ProtocolRound for Round1 {
    fn message_type(&self) -> Option<MessageType> {
        None
    }

    fn process_message(&mut self, message: &Message) -> Result<()> {
        Err(unexpected_payload(message))
    }

    #[instrument(skip_all, err(Debug))]
    fn generate_messages<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        info!("Sampling the {:?} contribution", self.base.protocol());
        let paillier = SecretKey::generate(rng)?;
        let (pedersen, lambda) = Parameters::generate(rng, &paillier)?;

        let constant = match self.base.previous {
            Some(_) => Scalar::ZERO,
            None => random_scalar(rng),
        };
        let polynomial = Polynomial::sample(rng, self.base.threshold(), constant);
        let schnorr: Vec<sch::Randomness> = (0..=self.base.threshold())
            .map(|_| sch::Randomness::new(rng))
            .collect();

        let mut rho = vec![0u8; SEC_BYTES];
        rng.fill_bytes(&mut rho);

        let body = PublicBody {
            rho,
            exponent: polynomial.exponent(),
            schnorr: schnorr.iter().map(sch::Randomness::commitment).collect(),
            paillier: paillier.public_key().clone(),
            pedersen,
        };
        let (commitment, decommitment) = body.commit(rng, &self.base.hash, self.base.self_id())?;

        self.commitment = Some(commitment);
        self.contribution = Some(Box::new(Contribution {
            paillier,
            lambda,
            polynomial,
            schnorr,
            body,
            decommitment,
        }));
        Ok(vec![self
            .base
            .broadcast(Payload::KeygenCommit(CommitMessage { commitment }))])
    }

    fn finalize(self) -> Result<Transition> {
        let (Some(contribution), Some(commitment)) = (self.contribution, self.commitment) else {
            error!("Round one finalized before generating its messages");
            return Err(InternalError::InternalInvariantFailed);
        };
        let commitments = BTreeMap::from([(self.base.self_id().clone(), commitment)]);
        Ok(Transition::Next(Round::Keygen2(Round2 {
            base: self.base,
            contribution,
            commitments,
            echo: None,
        })))
    }
}

/// Collects commitments and broadcasts a digest of all of them.
#[derive(Debug)]
pub(crate) struct Round2 {
    base: Base,
    contribution: Box<Contribution>,
    commitments: BTreeMap<PartyId, Commitment>,
    echo: Option<[u8; SEC_BYTES]>,
}

impl Round2 {
    /// Digest over every party's commitment in party order.
    fn echo(&self) -> Result<[u8; SEC_BYTES]> {
        let mut h = self.base.hash.clone();
        for id in self.base.config.party_ids() {
            let commitment = self.commitments.get(id).ok_or_else(|| {
                error!("No commitment recorded for {id}");
                InternalError::InternalInvariantFailed
            })?;
            h.write_id(b"committer", id);
            h.write_bytes(b"commitment", &commitment.0);
        }
        Ok(h.digest())
    }
}

impl ProtocolRound for Round2 {
    fn message_type(&self) -> Option<MessageType> {
        Some(MessageType::Keygen(KeygenMessageType::R1Commit))
    }

    fn process_message(&mut self, message: &Message) -> Result<()> {
        let Payload::KeygenCommit(commit) = &message.payload else {
            return Err(unexpected_payload(message));
        };
        self.commitments
            .insert(message.from().clone(), commit.commitment);
        Ok(())
    }

    fn generate_messages<R: RngCore + CryptoRng>(&mut self, _rng: &mut R) -> Result<Vec<Message>> {
        let echo = self.echo()?;
        self.echo = Some(echo);
        Ok(vec![self
            .base
            .broadcast(Payload::KeygenEcho(EchoMessage { echo }))])
    }

    fn finalize(self) -> Result<Transition> {
        let echo = self.echo.ok_or(InternalError::InternalInvariantFailed)?;
        Ok(Transition::Next(Round::Keygen3(Round3 {
            base: self.base,
            contribution: self.contribution,
            commitments: self.commitments,
            echo,
        })))
    }
}

/// Confirms everyone saw the same commitments, then opens its own.
#[derive(Debug)]
pub(crate) struct Round3 {
    base: Base,
    contribution: Box<Contribution>,
    commitments: BTreeMap<PartyId, Commitment>,
    echo: [u8; SEC_BYTES],
}

impl ProtocolRound for Round3 {
    fn message_type(&self) -> Option<MessageType> {
        Some(MessageType::Keygen(KeygenMessageType::R2Echo))
    }

    #[instrument(skip_all, err(Debug))]
    fn process_message(&mut self, message: &Message) -> Result<()> {
        let Payload::KeygenEcho(echo) = &message.payload else {
            return Err(unexpected_payload(message));
        };
        if echo.echo != self.echo {
            error!("{} saw a different set of commitments", message.from());
            return Err(InternalError::blame(
                message.from(),
                "echo of commitments does not match",
            ));
        }
        Ok(())
    }

    fn generate_messages<R: RngCore + CryptoRng>(&mut self, _rng: &mut R) -> Result<Vec<Message>> {
        let decommit = DecommitMessage {
            body: self.contribution.body.clone(),
            decommitment: self.contribution.decommitment,
        };
        Ok(vec![self
            .base
            .broadcast(Payload::KeygenDecommit(Box::new(decommit)))])
    }

    fn finalize(self) -> Result<Transition> {
        let bodies = BTreeMap::from([(
            self.base.self_id().clone(),
            self.contribution.body.clone(),
        )]);
        Ok(Transition::Next(Round::Keygen4(Round4 {
            base: self.base,
            contribution: self.contribution,
            commitments: self.commitments,
            bodies,
            rho: None,
            own_share: None,
        })))
    }
}

/// Checks every opening, then proves its keys and deals shares.
#[derive(Debug)]
pub(crate) struct Round4 {
    base: Base,
    contribution: Box<Contribution>,
    commitments: BTreeMap<PartyId, Commitment>,
    bodies: BTreeMap<PartyId, PublicBody>,
    rho: Option<[u8; SEC_BYTES]>,
    own_share: Option<Scalar>,
}

impl ProtocolRound for Round4 {
    fn message_type(&self) -> Option<MessageType> {
        Some(MessageType::Keygen(KeygenMessageType::R3Decommit))
    }

    #[instrument(skip_all, err(Debug))]
    fn process_message(&mut self, message: &Message) -> Result<()> {
        let Payload::KeygenDecommit(decommit) = &message.payload else {
            return Err(unexpected_payload(message));
        };
        let from = message.from();
        let commitment = self.commitments.get(from).ok_or_else(|| {
            error!("No commitment recorded for {from}");
            InternalError::InternalInvariantFailed
        })?;
        decommit.body.verify(
            &self.base.hash,
            from,
            self.base.threshold(),
            self.base.previous.is_some(),
            commitment,
            &decommit.decommitment,
        )?;
        self.bodies.insert(from.clone(), decommit.body.clone());
        Ok(())
    }

    #[instrument(skip_all, err(Debug))]
    fn generate_messages<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        let mut rho = [0u8; SEC_BYTES];
        for body in self.bodies.values() {
            xor_in_place(&mut rho, &body.rho);
        }
        self.base.hash.write_bytes(b"rho", &rho);
        self.rho = Some(rho);

        let self_id = self.base.self_id().clone();
        let h = self.base.hash.clone_with_id(&self_id);
        let contribution = &self.contribution;
        let paillier = &contribution.paillier;

        let modulus = modulus::Proof::prove(
            &h,
            &modulus::Public {
                n: paillier.public_key().modulus(),
            },
            &modulus::Private {
                p: paillier.p(),
                q: paillier.q(),
                phi: paillier.phi(),
            },
        )?;
        let prm = prm::Proof::prove(
            rng,
            &h,
            &contribution.body.pedersen,
            &prm::Private {
                lambda: contribution.lambda.value(),
                phi: paillier.phi(),
            },
        )?;

        // The constant of a refresh polynomial is zero and carries no proof.
        let first = usize::from(self.base.previous.is_some());
        let mut schnorr = vec![sch::Response::empty(); first];
        for ((randomness, secret), public) in contribution
            .schnorr
            .iter()
            .zip(contribution.polynomial.coefficients())
            .zip(contribution.body.exponent.coefficients())
            .skip(first)
        {
            schnorr.push(randomness.prove(&h, public, secret));
        }

        let mut messages = Vec::with_capacity(self.base.config.party_ids().len() - 1);
        for id in self.base.config.party_ids() {
            let value = contribution.polynomial.evaluate(&id.scalar());
            if id == &self_id {
                self.own_share = Some(value);
                continue;
            }
            let body = self.bodies.get(id).ok_or_else(|| {
                error!("No decommitted body recorded for {id}");
                InternalError::InternalInvariantFailed
            })?;
            let share = EncryptedShare::encrypt(rng, &value, &body.paillier)?;
            let payload = ProofsAndShareMessage {
                modulus: modulus.clone(),
                prm: prm.clone(),
                schnorr: schnorr.clone(),
                share,
            };
            messages.push(Message::direct(
                self.base.protocol(),
                &self_id,
                id,
                Payload::KeygenProofsAndShare(Box::new(payload)),
            ));
        }
        Ok(messages)
    }

    fn finalize(self) -> Result<Transition> {
        let (Some(rho), Some(own_share)) = (self.rho, self.own_share) else {
            error!("Round four finalized before generating its messages");
            return Err(InternalError::InternalInvariantFailed);
        };
        let shares = BTreeMap::from([(self.base.self_id().clone(), own_share)]);
        Ok(Transition::Next(Round::KeygenOutput(Output {
            base: self.base,
            contribution: self.contribution,
            bodies: self.bodies,
            rho,
            shares,
        })))
    }
}

/// Verifies proofs and shares, then assembles the new key material.
#[derive(Debug)]
pub(crate) struct Output {
    base: Base,
    contribution: Box<Contribution>,
    bodies: BTreeMap<PartyId, PublicBody>,
    rho: [u8; SEC_BYTES],
    /// `f_j(self)` for every dealer `j`.
    shares: BTreeMap<PartyId, Scalar>,
}

impl ProtocolRound for Output {
    fn message_type(&self) -> Option<MessageType> {
        Some(MessageType::Keygen(KeygenMessageType::R4ProofsAndShare))
    }

    #[instrument(skip_all, err(Debug))]
    fn process_message(&mut self, message: &Message) -> Result<()> {
        let Payload::KeygenProofsAndShare(payload) = &message.payload else {
            return Err(unexpected_payload(message));
        };
        let from = message.from();
        let body = self.bodies.get(from).ok_or_else(|| {
            error!("No decommitted body recorded for {from}");
            InternalError::InternalInvariantFailed
        })?;
        let h = self.base.hash.clone_with_id(from);

        payload
            .modulus
            .verify(
                &h,
                &modulus::Public {
                    n: body.paillier.modulus(),
                },
            )
            .map_err(|e| {
                error!("Modulus proof from {from} failed: {e}");
                InternalError::blame(from, format!("modulus proof failed: {e}"))
            })?;
        payload.prm.verify(&h, &body.pedersen).map_err(|e| {
            error!("Pedersen parameter proof from {from} failed: {e}");
            InternalError::blame(from, format!("Pedersen parameter proof failed: {e}"))
        })?;

        if payload.schnorr.len() != body.exponent.len() {
            error!(
                "{from} sent {} Schnorr responses for {} coefficients",
                payload.schnorr.len(),
                body.exponent.len()
            );
            return Err(InternalError::blame(from, "wrong number of Schnorr responses"));
        }
        let first = usize::from(self.base.previous.is_some());
        for (j, ((response, public), commitment)) in payload
            .schnorr
            .iter()
            .zip(body.exponent.coefficients())
            .zip(&body.schnorr)
            .enumerate()
            .skip(first)
        {
            if !response.verify(&h, public, commitment) {
                error!("Schnorr proof for coefficient {j} from {from} failed");
                return Err(InternalError::blame(
                    from,
                    format!("Schnorr proof for coefficient {j} failed"),
                ));
            }
        }

        let share = payload
            .share
            .decrypt(&self.contribution.paillier, from)?;
        let self_id = self.base.self_id();
        if CurvePoint::base_mul(&share) != body.exponent.evaluate(&self_id.scalar()) {
            error!("Share from {from} is inconsistent with its polynomial");
            return Err(InternalError::blame(
                from,
                "share is inconsistent with the polynomial commitment",
            ));
        }
        self.shares.insert(from.clone(), share);
        Ok(())
    }

    fn generate_messages<R: RngCore + CryptoRng>(&mut self, _rng: &mut R) -> Result<Vec<Message>> {
        Ok(Vec::new())
    }

    #[instrument(skip_all, err(Debug))]
    fn finalize(self) -> Result<Transition> {
        let Output {
            base,
            contribution,
            bodies,
            rho,
            shares,
        } = self;
        let self_id = base.self_id().clone();

        let mut secret_share = shares.values().fold(Scalar::ZERO, |acc, s| acc + s);
        if let Some(previous) = &base.previous {
            secret_share += previous.secret.ecdsa();
        }

        let mut public = BTreeMap::new();
        for id in base.config.party_ids() {
            let x = id.scalar();
            let mut point: CurvePoint = bodies.values().map(|b| b.exponent.evaluate(&x)).sum();
            if let Some(previous) = &base.previous {
                point = point + previous.session.public_share(id)?.ecdsa;
            }
            let body = bodies.get(id).ok_or(InternalError::InternalInvariantFailed)?;
            public.insert(
                id.clone(),
                PublicShare {
                    ecdsa: point,
                    paillier: body.paillier.clone(),
                    pedersen: body.pedersen.clone(),
                },
            );
        }

        let own_public = public
            .get(&self_id)
            .ok_or(InternalError::InternalInvariantFailed)?;
        if CurvePoint::base_mul(&secret_share) != own_public.ecdsa {
            error!("New secret share does not match the new public share");
            return Err(InternalError::InternalInvariantFailed);
        }

        let (public_key, rid) = match &base.previous {
            Some(previous) => (*previous.session.public_key(), *previous.session.rid()),
            None => (
                bodies.values().map(|b| b.exponent.constant()).sum(),
                rho,
            ),
        };
        if public_key.is_identity() {
            error!("Joint public key is the identity");
            return Err(InternalError::InternalInvariantFailed);
        }

        info!("{self_id} finished {:?}", base.protocol());
        let session = Session::new(
            base.config.party_ids().to_vec(),
            base.threshold(),
            public_key,
            rid,
            public,
        );
        let secret = Secret::new(self_id, secret_share, contribution.paillier.clone());
        Ok(Transition::Done(ProtocolOutput::Key(Box::new(KeyOutput {
            session,
            secret,
        }))))
    }
}
