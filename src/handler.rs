// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Drives one party's round sequence to completion.
//!
//! A [`Handler`] is created from a [`StartRound`] and then fed every inbound
//! message with [`Handler::update`]. Outbound messages are queued on the
//! channel returned by [`Handler::listen`], which closes once the run is over.
//! Messages that cannot be used right now produce a skippable
//! [`MessageError`]; any other failure aborts the run with a
//! [`ProtocolError`].

use crate::{
    errors::{CallerError, InternalError, MessageError, ProtocolError, Result},
    message::{Message, MessageType, ProtocolId},
    party::PartyId,
    round::{ProtocolOutput, Round, StartRound, Transition},
};
use rand::{CryptoRng, RngCore};
use std::{
    collections::HashSet,
    sync::mpsc::{channel, Receiver, Sender},
};
use tracing::{error, info, instrument, warn};

#[derive(Debug)]
enum State {
    Running(Box<Round>),
    Done(Box<ProtocolOutput>),
    Aborted(ProtocolError),
}

/// State machine for one party of one protocol run.
#[derive(Debug)]
pub struct Handler {
    protocol: ProtocolId,
    self_id: PartyId,
    parties: Vec<PartyId>,
    state: Option<State>,
    /// Senders already absorbed in the current round.
    received: HashSet<PartyId>,
    /// Messages for a later round, replayed once that round starts.
    stash: Vec<Message>,
    outbound: Option<Sender<Message>>,
    listener: Receiver<Message>,
}

impl Handler {
    /// Start a run. The first round expects no messages, so its output is
    /// queued immediately.
    #[instrument(skip_all, err(Debug))]
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R, start: StartRound) -> Result<Self> {
        let (tx, rx) = channel();
        let StartRound {
            protocol,
            self_id,
            parties,
            round,
        } = start;
        info!("Starting {protocol:?} as {self_id}");
        let mut handler = Self {
            protocol,
            self_id,
            parties,
            state: Some(State::Running(Box::new(round))),
            received: HashSet::new(),
            stash: Vec::new(),
            outbound: Some(tx),
            listener: rx,
        };
        handler.advance(rng)?;
        Ok(handler)
    }

    /// Outbound messages. The channel closes when the run terminates.
    pub fn listen(&self) -> &Receiver<Message> {
        &self.listener
    }

    pub fn protocol(&self) -> ProtocolId {
        self.protocol
    }

    pub fn self_id(&self) -> &PartyId {
        &self.self_id
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self.state, Some(State::Running(_)))
    }

    /// Feed one inbound message.
    ///
    /// Returns [`InternalError::Message`] for a message that was dropped, and
    /// [`InternalError::Protocol`] once the run has been aborted.
    pub fn update<R: RngCore + CryptoRng>(&mut self, rng: &mut R, message: Message) -> Result<()> {
        let expected = match &self.state {
            Some(State::Running(round)) => round.message_type(),
            Some(State::Aborted(e)) => return Err(e.clone().into()),
            _ => {
                warn!("Dropping message from {}: run is over", message.from());
                return Err(MessageError::AlreadyFinished.into());
            }
        };
        if let Err(e) = self.check_header(&message, expected) {
            warn!("Dropping message from {}: {e}", message.from());
            return Err(e.into());
        }

        let incoming = message.message_type();
        match expected {
            Some(current) if incoming == current => {
                self.absorb(&message)?;
                self.advance(rng)
            }
            _ => {
                // A later round of this protocol.
                if self
                    .stash
                    .iter()
                    .any(|m| m.from() == message.from() && m.message_type() == incoming)
                {
                    warn!("Dropping duplicate early message from {}", message.from());
                    return Err(MessageError::Duplicate(message.from().clone()).into());
                }
                self.stash.push(message);
                Ok(())
            }
        }
    }

    /// The output of the run.
    pub fn result(self) -> Result<ProtocolOutput> {
        match self.state {
            Some(State::Done(output)) => Ok(*output),
            Some(State::Aborted(e)) => Err(e.into()),
            _ => Err(CallerError::ProtocolNotFinished.into()),
        }
    }

    fn check_header(
        &self,
        message: &Message,
        expected: Option<MessageType>,
    ) -> std::result::Result<(), MessageError> {
        let from = message.from();
        if message.protocol() != self.protocol
            || !message.message_type().belongs_to(self.protocol)
        {
            return Err(MessageError::WrongProtocol);
        }
        if from == &self.self_id {
            return Err(MessageError::FromSelf);
        }
        if !self.parties.contains(from) {
            return Err(MessageError::UnknownSender(from.clone()));
        }
        if let Some(to) = message.to() {
            if to != &self.self_id {
                return Err(MessageError::WrongRecipient(to.clone()));
            }
        }
        let incoming = message.message_type();
        if incoming.is_broadcast() != message.is_broadcast() {
            return Err(MessageError::WrongRecipient(self.self_id.clone()));
        }
        let current_round = expected.map(|t| t.round_number()).unwrap_or(0);
        if incoming.round_number() < current_round {
            return Err(MessageError::StaleRound);
        }
        if Some(incoming) == expected && self.received.contains(from) {
            return Err(MessageError::Duplicate(from.clone()));
        }
        Ok(())
    }

    /// Hand a message to the current round; failures abort the run.
    fn absorb(&mut self, message: &Message) -> Result<()> {
        let result = match &mut self.state {
            Some(State::Running(round)) => round.process_message(message),
            _ => Err(InternalError::InternalInvariantFailed),
        };
        match result {
            Ok(()) => {
                self.received.insert(message.from().clone());
                Ok(())
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    /// Complete as many rounds as the absorbed messages allow.
    fn advance<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<()> {
        loop {
            let mut round = match self.state.take() {
                Some(State::Running(round)) => round,
                other => {
                    self.state = other;
                    return Ok(());
                }
            };
            let complete = match round.message_type() {
                None => true,
                Some(_) => self.received.len() + 1 == self.parties.len(),
            };
            if !complete {
                self.state = Some(State::Running(round));
                return Ok(());
            }

            let messages = match round.generate_messages(rng) {
                Ok(messages) => messages,
                Err(e) => return Err(self.abort(e)),
            };
            for message in messages {
                self.send(message)?;
            }

            match (*round).finalize() {
                Ok(Transition::Next(next)) => {
                    info!(
                        "{} moving to the round expecting {:?}",
                        self.self_id,
                        next.message_type()
                    );
                    self.state = Some(State::Running(Box::new(next)));
                    self.received.clear();
                    self.replay_stash()?;
                }
                Ok(Transition::Done(output)) => {
                    info!("{} finished {:?}", self.self_id, self.protocol);
                    self.state = Some(State::Done(Box::new(output)));
                    self.stash.clear();
                    self.outbound = None;
                    return Ok(());
                }
                Err(e) => return Err(self.abort(e)),
            }
        }
    }

    /// Absorb stashed messages that belong to the round just entered.
    fn replay_stash(&mut self) -> Result<()> {
        let expected = match &self.state {
            Some(State::Running(round)) => round.message_type(),
            _ => return Ok(()),
        };
        let (ready, later): (Vec<_>, Vec<_>) = std::mem::take(&mut self.stash)
            .into_iter()
            .partition(|m| Some(m.message_type()) == expected);
        self.stash = later;
        for message in ready {
            self.absorb(&message)?;
        }
        Ok(())
    }

    fn send(&mut self, message: Message) -> Result<()> {
        let sent = match &self.outbound {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        };
        if !sent {
            error!("Outbound channel is closed");
            return Err(self.abort(InternalError::InternalInvariantFailed));
        }
        Ok(())
    }

    /// Enter the aborted state and close the outbound channel.
    fn abort(&mut self, error: InternalError) -> InternalError {
        let protocol_error = match error {
            InternalError::Protocol(e) => e,
            other => ProtocolError::new(None, other.to_string()),
        };
        error!("{} aborting {:?}: {protocol_error}", self.self_id, self.protocol);
        self.state = Some(State::Aborted(protocol_error.clone()));
        self.stash.clear();
        self.outbound = None;
        protocol_error.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        keygen::start_keygen, message::KeygenMessageType, party::party_ids,
        utils::testing::init_testing,
    };
    use rand::rngs::StdRng;

    fn drain(handler: &Handler) -> Vec<Message> {
        handler.listen().try_iter().collect()
    }

    fn types(messages: &[Message]) -> Vec<MessageType> {
        messages.iter().map(Message::message_type).collect()
    }

    /// Deliver everything both handlers have queued until neither has
    /// anything left to say.
    fn exchange(rng: &mut StdRng, a: &mut Handler, b: &mut Handler) {
        loop {
            let from_a = drain(a);
            let from_b = drain(b);
            if from_a.is_empty() && from_b.is_empty() {
                return;
            }
            for message in from_a {
                b.update(rng, message).unwrap();
            }
            for message in from_b {
                a.update(rng, message).unwrap();
            }
        }
    }

    #[test]
    fn early_messages_are_held_and_replayed_once() {
        let mut rng = init_testing();
        let ids = party_ids(["a", "b"]).unwrap();
        let start = |i: usize| start_keygen(ids[i].clone(), ids.clone(), 1).unwrap();
        let mut a = Handler::new(&mut rng, start(0)).unwrap();
        let mut b = Handler::new(&mut rng, start(1)).unwrap();

        let commit_a = a.listen().try_recv().unwrap();
        let commit_b = b.listen().try_recv().unwrap();

        // b hears from a first and moves on to its echo round.
        b.update(&mut rng, commit_a).unwrap();
        let echo_b = b.listen().try_recv().unwrap();
        assert_eq!(echo_b.message_type(), MessageType::Keygen(KeygenMessageType::R2Echo));

        // a is still waiting for b's commitment: the echo is held.
        a.update(&mut rng, echo_b.clone()).unwrap();
        assert!(drain(&a).is_empty());
        let err = a.update(&mut rng, echo_b.clone()).unwrap_err();
        assert_eq!(err, MessageError::Duplicate(ids[1].clone()).into());

        // The commitment completes round one and the held echo completes
        // round two, so a emits its echo and its decommitment in one go.
        a.update(&mut rng, commit_b).unwrap();
        let sent = drain(&a);
        assert_eq!(
            types(&sent),
            vec![
                MessageType::Keygen(KeygenMessageType::R2Echo),
                MessageType::Keygen(KeygenMessageType::R3Decommit),
            ]
        );

        // The echo was consumed; a second copy is now stale.
        let err = a.update(&mut rng, echo_b).unwrap_err();
        assert_eq!(err, MessageError::StaleRound.into());
        assert!(err.is_skippable());

        for message in sent {
            b.update(&mut rng, message).unwrap();
        }
        exchange(&mut rng, &mut a, &mut b);
        assert!(a.is_finished() && b.is_finished());
        match (a.result().unwrap(), b.result().unwrap()) {
            (ProtocolOutput::Key(ka), ProtocolOutput::Key(kb)) => {
                assert_eq!(ka.session, kb.session)
            }
            other => panic!("unexpected outputs {other:?}"),
        }
    }
}
