// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Protocol messages.
//!
//! A [`Message`] carries a sender, an optional recipient (absent for a
//! broadcast) and a round-specific [`Payload`]. Its [`MessageType`] is derived
//! from the payload, so the two can never disagree.

use crate::{
    errors::{InternalError, Result},
    keygen,
    party::PartyId,
    sign,
    xor,
};
use serde::{Deserialize, Serialize};
use tracing::error;

/// The protocol a message or a run belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolId {
    Xor,
    Keygen,
    Refresh,
    Sign,
}

/// Message types of the XOR test protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XorMessageType {
    R1Contribution,
}

/// Message types shared by key generation and key refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeygenMessageType {
    R1Commit,
    R2Echo,
    R3Decommit,
    R4ProofsAndShare,
}

/// Message types of signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignMessageType {
    R1EncryptedNonce,
    R2Mta,
    R3Delta,
    R4SignatureShare,
}

/// Tag of a message: which round produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Xor(XorMessageType),
    Keygen(KeygenMessageType),
    Sign(SignMessageType),
}

impl MessageType {
    /// 1-based index of the round that produces this message.
    pub fn round_number(&self) -> u8 {
        match self {
            MessageType::Xor(XorMessageType::R1Contribution) => 1,
            MessageType::Keygen(t) => match t {
                KeygenMessageType::R1Commit => 1,
                KeygenMessageType::R2Echo => 2,
                KeygenMessageType::R3Decommit => 3,
                KeygenMessageType::R4ProofsAndShare => 4,
            },
            MessageType::Sign(t) => match t {
                SignMessageType::R1EncryptedNonce => 1,
                SignMessageType::R2Mta => 2,
                SignMessageType::R3Delta => 3,
                SignMessageType::R4SignatureShare => 4,
            },
        }
    }

    /// Whether this type can occur in a run of `protocol`.
    pub fn belongs_to(&self, protocol: ProtocolId) -> bool {
        matches!(
            (self, protocol),
            (MessageType::Xor(_), ProtocolId::Xor)
                | (MessageType::Keygen(_), ProtocolId::Keygen | ProtocolId::Refresh)
                | (MessageType::Sign(_), ProtocolId::Sign)
        )
    }

    /// Whether messages of this type go to every party at once.
    pub fn is_broadcast(&self) -> bool {
        !matches!(
            self,
            MessageType::Keygen(KeygenMessageType::R4ProofsAndShare)
                | MessageType::Sign(SignMessageType::R2Mta)
        )
    }
}

/// Round-specific message contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum Payload {
    Xor(xor::Contribution),
    KeygenCommit(keygen::CommitMessage),
    KeygenEcho(keygen::EchoMessage),
    KeygenDecommit(Box<keygen::DecommitMessage>),
    KeygenProofsAndShare(Box<keygen::ProofsAndShareMessage>),
    SignEncryptedNonce(sign::EncryptedNonceMessage),
    SignMta(Box<sign::MtaMessage>),
    SignDelta(sign::DeltaMessage),
    SignSignatureShare(sign::SignatureShareMessage),
}

impl Payload {
    fn message_type(&self) -> MessageType {
        match self {
            Payload::Xor(_) => MessageType::Xor(XorMessageType::R1Contribution),
            Payload::KeygenCommit(_) => MessageType::Keygen(KeygenMessageType::R1Commit),
            Payload::KeygenEcho(_) => MessageType::Keygen(KeygenMessageType::R2Echo),
            Payload::KeygenDecommit(_) => MessageType::Keygen(KeygenMessageType::R3Decommit),
            Payload::KeygenProofsAndShare(_) => {
                MessageType::Keygen(KeygenMessageType::R4ProofsAndShare)
            }
            Payload::SignEncryptedNonce(_) => MessageType::Sign(SignMessageType::R1EncryptedNonce),
            Payload::SignMta(_) => MessageType::Sign(SignMessageType::R2Mta),
            Payload::SignDelta(_) => MessageType::Sign(SignMessageType::R3Delta),
            Payload::SignSignatureShare(_) => {
                MessageType::Sign(SignMessageType::R4SignatureShare)
            }
        }
    }
}

/// A message exchanged between parties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    protocol: ProtocolId,
    from: PartyId,
    to: Option<PartyId>,
    pub(crate) payload: Payload,
}

impl Message {
    pub(crate) fn broadcast(protocol: ProtocolId, from: &PartyId, payload: Payload) -> Self {
        Self {
            protocol,
            from: from.clone(),
            to: None,
            payload,
        }
    }

    pub(crate) fn direct(
        protocol: ProtocolId,
        from: &PartyId,
        to: &PartyId,
        payload: Payload,
    ) -> Self {
        Self {
            protocol,
            from: from.clone(),
            to: Some(to.clone()),
            payload,
        }
    }

    pub fn protocol(&self) -> ProtocolId {
        self.protocol
    }

    pub fn from(&self) -> &PartyId {
        &self.from
    }

    /// The recipient, or `None` for a broadcast.
    pub fn to(&self) -> Option<&PartyId> {
        self.to.as_ref()
    }

    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }

    pub fn is_broadcast(&self) -> bool {
        self.to.is_none()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serialize!(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        deserialize!(bytes)
    }

    /// Rewrite the sender, for tests that impersonate a party.
    #[cfg(test)]
    pub(crate) fn with_from(mut self, from: &PartyId) -> Self {
        self.from = from.clone();
        self
    }
}

/// Error for a payload that does not match the type the round asked for.
pub(crate) fn unexpected_payload(message: &Message) -> InternalError {
    error!(
        "Round received a {:?} message it did not ask for",
        message.message_type()
    );
    InternalError::InternalInvariantFailed
}
