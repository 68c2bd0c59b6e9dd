// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Threshold ECDSA over secp256k1, driven one round at a time.
//!
//! The crate implements three protocols between a fixed set of parties, each
//! identified by a [`PartyId`]:
//! - [`keygen::start_keygen`] deals a fresh key with a degree-`t` Shamir
//!   sharing and gives every party a Paillier key and ring-Pedersen
//!   parameters;
//! - [`keygen::start_refresh`] re-randomizes the shares of an existing key;
//! - [`sign::start_sign`] lets any `t + 1` parties sign a message.
//!
//! [`xor::start`] is a one-round protocol that exercises the message plumbing.
//!
//! Every start function returns a [`StartRound`], which is handed to
//! [`Handler::new`]. The calling application is responsible for transport: it
//! forwards every [`Message`] read from [`Handler::listen`] to the recipient
//! (or to every other party, for a broadcast) and feeds inbound messages to
//! [`Handler::update`]. Once [`Handler::is_finished`] returns `true`,
//! [`Handler::result`] yields the [`ProtocolOutput`].
//!
//! Errors returned by [`Handler::update`] are either skippable
//! ([`InternalError::is_skippable`]), in which case the message was dropped
//! and the run continues, or a [`ProtocolError`] that aborts the run and,
//! where possible, names the party at fault.
//!
//! The protocols follow Canetti, Gennaro, Goldfeder, Makriyannis and Peled,
//! [UC Non-Interactive, Proactive, Threshold ECDSA with Identifiable
//! Aborts](https://eprint.iacr.org/archive/2021/060/1634824619.pdf).

#![warn(missing_debug_implementations)]

#[macro_use]
pub mod errors;

pub mod curve;
pub mod handler;
pub mod hash;
pub mod keygen;
pub mod message;
pub mod paillier;
pub mod parameters;
pub mod party;
pub mod pedersen;
pub(crate) mod polynomial;
pub mod round;
pub mod session;
pub mod sign;
pub(crate) mod utils;
pub mod xor;
pub mod zk;

#[cfg(test)]
mod testing;

pub use curve::{message_scalar, verify_signature, CurvePoint};
pub use errors::{CallerError, InternalError, MessageError, ProtocolError, Result};
pub use handler::Handler;
pub use message::{Message, MessageType, ProtocolId};
pub use party::PartyId;
pub use round::{KeyOutput, ProtocolOutput, StartRound};
pub use session::{PublicShare, Secret, Session, SessionConfig};
