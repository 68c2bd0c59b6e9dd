// Copyright (c) 2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use super::{DeltaMessage, EncryptedNonceMessage, MtaMessage, SignatureShareMessage};
use crate::{
    curve::{
        bn_to_scalar, message_scalar, random_scalar, scalar_to_bn, signature_from_scalars,
        verify_signature, CurvePoint,
    },
    errors::{InternalError, ProtocolError, Result},
    message::{unexpected_payload, Message, MessageType, Payload, ProtocolId, SignMessageType},
    paillier::{Ciphertext, PublicKey},
    parameters::ELL_PRIME,
    party::PartyId,
    round::{ProtocolOutput, ProtocolRound, Round, Transition},
    session::{Secret, Session},
    utils::{bit_length, random_positive_bn},
};
use k256::Scalar;
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use std::collections::BTreeMap;
use tracing::{error, info, instrument};
use zeroize::ZeroizeOnDrop;

/// Inputs shared by every round of a signing run.
#[derive(Debug)]
pub(crate) struct Base {
    pub(crate) session: Session,
    pub(crate) secret: Secret,
    pub(crate) signers: Vec<PartyId>,
    pub(crate) message: Vec<u8>,
}

impl Base {
    fn self_id(&self) -> &PartyId {
        self.secret.id()
    }

    fn peers(&self) -> impl Iterator<Item = &PartyId> {
        self.signers.iter().filter(move |id| *id != self.secret.id())
    }

    fn paillier(&self, id: &PartyId) -> Result<&PublicKey> {
        Ok(&self.session.public_share(id)?.paillier)
    }

    fn broadcast(&self, payload: Payload) -> Message {
        Message::broadcast(ProtocolId::Sign, self.self_id(), payload)
    }
}

/// Per-run secrets: the nonce shares `k_i`, `γ_i` and the additive key share
/// `w_i = λ_i·x_i`.
#[derive(ZeroizeOnDrop)]
pub(crate) struct Nonces {
    k: Scalar,
    gamma: Scalar,
    w: Scalar,
}

impl std::fmt::Debug for Nonces {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Nonces([redacted])")
    }
}

fn missing(what: &str, id: &PartyId) -> InternalError {
    error!("No {what} recorded for {id}");
    InternalError::InternalInvariantFailed
}

/// Samples nonces and broadcasts `K_i = Enc_i(k_i)`.
#[derive(Debug)]
pub(crate) struct Round1 {
    pub(crate) base: Base,
    /// `w_i`, folded into [`Nonces`] once they are sampled.
    pub(crate) w: Scalar,
    pub(crate) nonces: Option<Nonces>,
}

impl ProtocolRound for Round1 {
    fn message_type(&self) -> Option<MessageType> {
        None
    }

    fn process_message(&mut self, message: &Message) -> Result<()> {
        Err(unexpected_payload(message))
    }

    fn generate_messages<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        let k = random_scalar(rng);
        let gamma = random_scalar(rng);
        let own_key = self.base.secret.paillier().public_key();
        let (big_k, _nonce) = own_key.encrypt(rng, &scalar_to_bn(&k))?;
        self.nonces = Some(Nonces {
            k,
            gamma,
            w: self.w,
        });
        Ok(vec![self
            .base
            .broadcast(Payload::SignEncryptedNonce(EncryptedNonceMessage { k: big_k }))])
    }

    fn finalize(self) -> Result<Transition> {
        let nonces = self.nonces.ok_or(InternalError::InternalInvariantFailed)?;
        Ok(Transition::Next(Round::Sign2(Round2 {
            base: self.base,
            nonces,
            encrypted_nonces: BTreeMap::new(),
            betas: BTreeMap::new(),
        })))
    }
}

/// Runs the sender side of the two MtA conversions with every peer.
#[derive(Debug)]
pub(crate) struct Round2 {
    base: Base,
    nonces: Nonces,
    encrypted_nonces: BTreeMap<PartyId, Ciphertext>,
    /// `(β_j, β̂_j)` for every peer `j`.
    betas: BTreeMap<PartyId, (Scalar, Scalar)>,
}

impl ProtocolRound for Round2 {
    fn message_type(&self) -> Option<MessageType> {
        Some(MessageType::Sign(SignMessageType::R1EncryptedNonce))
    }

    #[instrument(skip_all, err(Debug))]
    fn process_message(&mut self, message: &Message) -> Result<()> {
        let Payload::SignEncryptedNonce(nonce) = &message.payload else {
            return Err(unexpected_payload(message));
        };
        let from = message.from();
        if !self.base.paillier(from)?.validate_ciphertext(&nonce.k) {
            error!("{from} sent an invalid encrypted nonce");
            return Err(InternalError::blame(from, "K is not a valid ciphertext"));
        }
        self.encrypted_nonces.insert(from.clone(), nonce.k.clone());
        Ok(())
    }

    #[instrument(skip_all, err(Debug))]
    fn generate_messages<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        let big_gamma = CurvePoint::base_mul(&self.nonces.gamma);
        let gamma = scalar_to_bn(&self.nonces.gamma);
        let w = scalar_to_bn(&self.nonces.w);
        let beta_bound = BigNumber::one() << ELL_PRIME;

        let peers: Vec<PartyId> = self.base.peers().cloned().collect();
        let mut messages = Vec::with_capacity(peers.len());
        for id in &peers {
            let pk = self.base.paillier(id)?;
            let big_k = self
                .encrypted_nonces
                .get(id)
                .ok_or_else(|| missing("encrypted nonce", id))?;

            let beta = random_positive_bn(rng, &beta_bound);
            let beta_hat = random_positive_bn(rng, &beta_bound);
            let (neg_beta, _) = pk.encrypt(rng, &(BigNumber::zero() - &beta))?;
            let (neg_beta_hat, _) = pk.encrypt(rng, &(BigNumber::zero() - &beta_hat))?;
            let d = pk.add(&pk.mul(big_k, &gamma)?, &neg_beta)?;
            let d_hat = pk.add(&pk.mul(big_k, &w)?, &neg_beta_hat)?;

            self.betas
                .insert(id.clone(), (bn_to_scalar(&beta)?, bn_to_scalar(&beta_hat)?));
            messages.push(Message::direct(
                ProtocolId::Sign,
                self.base.self_id(),
                id,
                Payload::SignMta(Box::new(MtaMessage {
                    big_gamma,
                    d,
                    d_hat,
                })),
            ));
        }
        Ok(messages)
    }

    fn finalize(self) -> Result<Transition> {
        let big_gamma = CurvePoint::base_mul(&self.nonces.gamma);
        let gammas = BTreeMap::from([(self.base.self_id().clone(), big_gamma)]);
        Ok(Transition::Next(Round::Sign3(Round3 {
            base: self.base,
            nonces: self.nonces,
            betas: self.betas,
            gammas,
            alphas: BTreeMap::new(),
            delta: None,
        })))
    }
}

/// Receiver side of MtA: combines the shares of `δ = kγ` and `χ = kx`.
#[derive(Debug)]
pub(crate) struct Round3 {
    base: Base,
    nonces: Nonces,
    betas: BTreeMap<PartyId, (Scalar, Scalar)>,
    gammas: BTreeMap<PartyId, CurvePoint>,
    /// `(α_j, α̂_j)` for every peer `j`.
    alphas: BTreeMap<PartyId, (Scalar, Scalar)>,
    delta: Option<(Scalar, Scalar, CurvePoint)>,
}

impl Round3 {
    fn decrypt_mta(&self, from: &PartyId, c: &Ciphertext) -> Result<Scalar> {
        let x = self.base.secret.paillier().decrypt(c).map_err(|_| {
            error!("{from} sent an invalid MtA ciphertext");
            InternalError::blame(from, "MtA ciphertext is invalid")
        })?;
        if bit_length(&x) > ELL_PRIME + 1 {
            error!("MtA plaintext from {from} is out of range");
            return Err(InternalError::blame(from, "MtA plaintext is out of range"));
        }
        bn_to_scalar(&x)
    }
}

impl ProtocolRound for Round3 {
    fn message_type(&self) -> Option<MessageType> {
        Some(MessageType::Sign(SignMessageType::R2Mta))
    }

    #[instrument(skip_all, err(Debug))]
    fn process_message(&mut self, message: &Message) -> Result<()> {
        let Payload::SignMta(mta) = &message.payload else {
            return Err(unexpected_payload(message));
        };
        let from = message.from();
        if mta.big_gamma.is_identity() {
            error!("{from} sent an identity Γ");
            return Err(InternalError::blame(from, "Γ is the identity"));
        }
        let alpha = self.decrypt_mta(from, &mta.d)?;
        let alpha_hat = self.decrypt_mta(from, &mta.d_hat)?;
        self.gammas.insert(from.clone(), mta.big_gamma);
        self.alphas.insert(from.clone(), (alpha, alpha_hat));
        Ok(())
    }

    fn generate_messages<R: RngCore + CryptoRng>(&mut self, _rng: &mut R) -> Result<Vec<Message>> {
        let big_gamma: CurvePoint = self.gammas.values().copied().sum();
        let big_delta = big_gamma.mul(&self.nonces.k);

        let mut delta = self.nonces.gamma * self.nonces.k;
        let mut chi = self.nonces.w * self.nonces.k;
        for id in self.base.peers() {
            let (alpha, alpha_hat) = self.alphas.get(id).ok_or_else(|| missing("α", id))?;
            let (beta, beta_hat) = self.betas.get(id).ok_or_else(|| missing("β", id))?;
            delta += alpha + beta;
            chi += alpha_hat + beta_hat;
        }
        self.delta = Some((delta, chi, big_gamma));
        Ok(vec![self
            .base
            .broadcast(Payload::SignDelta(DeltaMessage { delta, big_delta }))])
    }

    fn finalize(self) -> Result<Transition> {
        let (delta, chi, big_gamma) = self.delta.ok_or(InternalError::InternalInvariantFailed)?;
        let big_delta = big_gamma.mul(&self.nonces.k);
        let deltas = BTreeMap::from([(self.base.self_id().clone(), (delta, big_delta))]);
        Ok(Transition::Next(Round::Sign4(Round4 {
            base: self.base,
            nonces: self.nonces,
            chi,
            big_gamma,
            deltas,
            signature_share: None,
        })))
    }
}

/// Checks `δ` against the `Δ_j`, derives `R` and broadcasts `σ_i`.
#[derive(Debug)]
pub(crate) struct Round4 {
    base: Base,
    nonces: Nonces,
    chi: Scalar,
    big_gamma: CurvePoint,
    deltas: BTreeMap<PartyId, (Scalar, CurvePoint)>,
    signature_share: Option<(Scalar, Scalar)>,
}

impl ProtocolRound for Round4 {
    fn message_type(&self) -> Option<MessageType> {
        Some(MessageType::Sign(SignMessageType::R3Delta))
    }

    fn process_message(&mut self, message: &Message) -> Result<()> {
        let Payload::SignDelta(delta) = &message.payload else {
            return Err(unexpected_payload(message));
        };
        self.deltas
            .insert(message.from().clone(), (delta.delta, delta.big_delta));
        Ok(())
    }

    #[instrument(skip_all, err(Debug))]
    fn generate_messages<R: RngCore + CryptoRng>(&mut self, _rng: &mut R) -> Result<Vec<Message>> {
        let delta = self
            .deltas
            .values()
            .fold(Scalar::ZERO, |acc, (d, _)| acc + d);
        let big_delta: CurvePoint = self.deltas.values().map(|(_, p)| *p).sum();
        if CurvePoint::base_mul(&delta) != big_delta {
            error!("δ·G does not match the sum of the Δ_j");
            return Err(ProtocolError::new(None, "delta check failed").into());
        }
        let delta_inv: Option<Scalar> = delta.invert().into();
        let delta_inv = delta_inv.ok_or_else(|| {
            error!("δ is zero");
            InternalError::from(ProtocolError::new(None, "delta is zero"))
        })?;

        let r = self.big_gamma.mul(&delta_inv).x_projection();
        if bool::from(r.is_zero()) {
            error!("Nonce point has a zero x-coordinate");
            return Err(ProtocolError::new(None, "r is zero").into());
        }
        let m = message_scalar(&self.base.message);
        let sigma = self.nonces.k * m + r * self.chi;
        self.signature_share = Some((r, sigma));
        Ok(vec![self
            .base
            .broadcast(Payload::SignSignatureShare(SignatureShareMessage { sigma }))])
    }

    fn finalize(self) -> Result<Transition> {
        let (r, sigma) = self
            .signature_share
            .ok_or(InternalError::InternalInvariantFailed)?;
        let sigmas = BTreeMap::from([(self.base.self_id().clone(), sigma)]);
        Ok(Transition::Next(Round::SignOutput(Output {
            base: self.base,
            r,
            sigmas,
        })))
    }
}

/// Combines the signature shares.
#[derive(Debug)]
pub(crate) struct Output {
    base: Base,
    r: Scalar,
    sigmas: BTreeMap<PartyId, Scalar>,
}

impl ProtocolRound for Output {
    fn message_type(&self) -> Option<MessageType> {
        Some(MessageType::Sign(SignMessageType::R4SignatureShare))
    }

    fn process_message(&mut self, message: &Message) -> Result<()> {
        let Payload::SignSignatureShare(share) = &message.payload else {
            return Err(unexpected_payload(message));
        };
        self.sigmas.insert(message.from().clone(), share.sigma);
        Ok(())
    }

    fn generate_messages<R: RngCore + CryptoRng>(&mut self, _rng: &mut R) -> Result<Vec<Message>> {
        Ok(Vec::new())
    }

    #[instrument(skip_all, err(Debug))]
    fn finalize(self) -> Result<Transition> {
        let s = self.sigmas.values().fold(Scalar::ZERO, |acc, s| acc + s);
        let signature = signature_from_scalars(&self.r, &s)?;
        if !verify_signature(self.base.session.public_key(), &self.base.message, &signature) {
            error!("Combined signature does not verify");
            return Err(ProtocolError::new(None, "signature does not verify").into());
        }
        info!("{} produced a signature", self.base.self_id());
        Ok(Transition::Done(ProtocolOutput::Signature(signature)))
    }
}
