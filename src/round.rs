// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The round contract and the closed set of rounds a [`Handler`] can drive.
//!
//! [`Handler`]: crate::handler::Handler

use crate::{
    errors::Result,
    keygen,
    message::{Message, MessageType, ProtocolId},
    party::PartyId,
    session::{Secret, Session},
    sign,
    xor,
};
use k256::ecdsa::Signature;
use rand::{CryptoRng, RngCore};

/// Capabilities of a single protocol round.
///
/// A round absorbs the messages produced by its predecessor, then produces its
/// own outbound messages and hands its state to the next round.
pub(crate) trait ProtocolRound: Sized {
    /// Type of the messages this round consumes, `None` for a start round.
    fn message_type(&self) -> Option<MessageType>;

    /// Validate a peer message and absorb it into that peer's record.
    fn process_message(&mut self, message: &Message) -> Result<()>;

    /// Compute this party's contribution for the round.
    fn generate_messages<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>>;

    /// Move the accumulated state into the next round, or produce the output.
    fn finalize(self) -> Result<Transition>;
}

/// What a round turns into once it is complete.
#[derive(Debug)]
pub(crate) enum Transition {
    Next(Round),
    Done(ProtocolOutput),
}

/// Result of a finished protocol run.
#[derive(Debug)]
pub enum ProtocolOutput {
    /// XOR of every party's random contribution.
    Xor([u8; crate::parameters::SEC_BYTES]),
    /// A new key (keygen) or fresh shares of the same key (refresh).
    Key(Box<KeyOutput>),
    /// An ECDSA signature valid under the session public key.
    Signature(Signature),
}

/// Key material produced by key generation and refresh.
#[derive(Debug)]
pub struct KeyOutput {
    pub session: Session,
    pub secret: Secret,
}

/// A round of one of the supported protocols.
#[derive(Debug)]
pub(crate) enum Round {
    Xor1(xor::Round1),
    XorOutput(xor::Output),
    Keygen1(keygen::Round1),
    Keygen2(keygen::Round2),
    Keygen3(keygen::Round3),
    Keygen4(keygen::Round4),
    KeygenOutput(keygen::Output),
    Sign1(sign::Round1),
    Sign2(sign::Round2),
    Sign3(sign::Round3),
    Sign4(sign::Round4),
    SignOutput(sign::Output),
}

macro_rules! dispatch {
    ($round:expr, $r:ident => $body:expr) => {
        match $round {
            Round::Xor1($r) => $body,
            Round::XorOutput($r) => $body,
            Round::Keygen1($r) => $body,
            Round::Keygen2($r) => $body,
            Round::Keygen3($r) => $body,
            Round::Keygen4($r) => $body,
            Round::KeygenOutput($r) => $body,
            Round::Sign1($r) => $body,
            Round::Sign2($r) => $body,
            Round::Sign3($r) => $body,
            Round::Sign4($r) => $body,
            Round::SignOutput($r) => $body,
        }
    };
}

impl Round {
    pub(crate) fn message_type(&self) -> Option<MessageType> {
        dispatch!(self, r => r.message_type())
    }

    pub(crate) fn process_message(&mut self, message: &Message) -> Result<()> {
        dispatch!(self, r => r.process_message(message))
    }

    pub(crate) fn generate_messages<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<Vec<Message>> {
        dispatch!(self, r => r.generate_messages(rng))
    }

    pub(crate) fn finalize(self) -> Result<Transition> {
        dispatch!(self, r => r.finalize())
    }
}

/// The first round of a protocol run together with the run descriptor.
///
/// Created by one of the protocol start functions and handed to
/// [`Handler::new`](crate::handler::Handler::new).
#[derive(Debug)]
pub struct StartRound {
    pub(crate) protocol: ProtocolId,
    pub(crate) self_id: PartyId,
    pub(crate) parties: Vec<PartyId>,
    pub(crate) round: Round,
}

impl StartRound {
    pub fn protocol(&self) -> ProtocolId {
        self.protocol
    }

    pub fn self_id(&self) -> &PartyId {
        &self.self_id
    }

    /// Every party of the run, including this one.
    pub fn parties(&self) -> &[PartyId] {
        &self.parties
    }
}
