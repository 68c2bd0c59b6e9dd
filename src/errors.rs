// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Errors raised by this crate.
//!
//! There are three broad classes of failure:
//! - [`MessageError`]: a single incoming message could not be used. The caller
//!   may drop it and keep going.
//! - [`ProtocolError`]: a peer provably misbehaved (or a check failed for some
//!   other reason). The run must be aborted.
//! - [`CallerError`]: the calling application passed something invalid.

use crate::party::PartyId;
use std::fmt;
use thiserror::Error;

/// Default result type for this crate.
pub type Result<T> = std::result::Result<T, InternalError>;

/// Crate-wide error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InternalError {
    #[error("the calling application made a mistake: {0}")]
    CallingApplicationMistake(#[from] CallerError),
    #[error("message skipped: {0}")]
    Message(#[from] MessageError),
    #[error("protocol aborted: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("an internal invariant was violated")]
    InternalInvariantFailed,
    #[error("could not serialize or deserialize a value")]
    Serialization,
}

impl InternalError {
    /// Shorthand for a fatal error blaming `culprit`.
    pub(crate) fn blame(culprit: &PartyId, reason: impl Into<String>) -> Self {
        InternalError::Protocol(ProtocolError::new(Some(culprit.clone()), reason))
    }

    /// `true` if the error only concerns a single message and the run can go on.
    pub fn is_skippable(&self) -> bool {
        matches!(self, InternalError::Message(_))
    }
}

/// Errors caused by inputs supplied by the calling application.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallerError {
    #[error("invalid party identifier: {0}")]
    BadPartyId(String),
    #[error("invalid party set: {0}")]
    BadPartySet(String),
    #[error("invalid threshold {threshold} for {parties} parties")]
    BadThreshold { threshold: usize, parties: usize },
    #[error("protocol output requested before the protocol finished")]
    ProtocolNotFinished,
    #[error("a sampling routine exceeded its retry bound")]
    RetryFailed,
    #[error("failed to deserialize input")]
    DeserializationFailed,
}

/// A problem with a single message. These never abort a run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("message from unknown party {0}")]
    UnknownSender(PartyId),
    #[error("message claims to come from ourselves")]
    FromSelf,
    #[error("message addressed to another party ({0})")]
    WrongRecipient(PartyId),
    #[error("message belongs to another protocol")]
    WrongProtocol,
    #[error("message for a round that already finished")]
    StaleRound,
    #[error("duplicate message from {0}")]
    Duplicate(PartyId),
    #[error("the protocol is no longer running")]
    AlreadyFinished,
}

/// A fatal failure. `culprit` names the misbehaving party when one is known.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    pub culprit: Option<PartyId>,
    pub reason: String,
}

impl ProtocolError {
    pub fn new(culprit: Option<PartyId>, reason: impl Into<String>) -> Self {
        Self {
            culprit,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.culprit {
            Some(culprit) => write!(f, "party {culprit}: {}", self.reason),
            None => f.write_str(&self.reason),
        }
    }
}

macro_rules! serialize {
    ($x:expr) => {{
        bincode::serialize($x).or(Err(crate::errors::InternalError::Serialization))
    }};
}

macro_rules! deserialize {
    ($x:expr) => {{
        bincode::deserialize($x).or(Err(crate::errors::InternalError::Serialization))
    }};
}
