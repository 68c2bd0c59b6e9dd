// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! A one-round test protocol: every party broadcasts [`SEC_BYTES`] random
//! bytes and the output is the XOR of all contributions.

use crate::{
    errors::{InternalError, Result},
    message::{unexpected_payload, Message, MessageType, Payload, ProtocolId, XorMessageType},
    parameters::SEC_BYTES,
    party::PartyId,
    round::{ProtocolOutput, ProtocolRound, Round, StartRound, Transition},
    session::SessionConfig,
    utils::xor_in_place,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, instrument};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Contribution {
    bytes: Vec<u8>,
}

/// Start the XOR test protocol.
pub fn start(self_id: PartyId, party_ids: Vec<PartyId>) -> Result<StartRound> {
    // Any valid threshold works: the protocol does not share a key.
    let config = SessionConfig::new(self_id, party_ids, 1)?;
    Ok(StartRound {
        protocol: ProtocolId::Xor,
        self_id: config.self_id().clone(),
        parties: config.party_ids().to_vec(),
        round: Round::Xor1(Round1 {
            self_id: config.self_id().clone(),
            contribution: None,
        }),
    })
}

#[derive(Debug)]
pub(crate) struct Round1 {
    self_id: PartyId,
    contribution: Option<[u8; SEC_BYTES]>,
}

impl ProtocolRound for Round1 {
    fn message_type(&self) -> Option<MessageType> {
        None
    }

    fn process_message(&mut self, message: &Message) -> Result<()> {
        Err(unexpected_payload(message))
    }

    fn generate_messages<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        let mut bytes = [0u8; SEC_BYTES];
        rng.fill_bytes(&mut bytes);
        self.contribution = Some(bytes);
        Ok(vec![Message::broadcast(
            ProtocolId::Xor,
            &self.self_id,
            Payload::Xor(Contribution {
                bytes: bytes.to_vec(),
            }),
        )])
    }

    fn finalize(self) -> Result<Transition> {
        let own = self
            .contribution
            .ok_or(InternalError::InternalInvariantFailed)?;
        Ok(Transition::Next(Round::XorOutput(Output {
            received: BTreeMap::from([(self.self_id, own)]),
        })))
    }
}

#[derive(Debug)]
pub(crate) struct Output {
    received: BTreeMap<PartyId, [u8; SEC_BYTES]>,
}

impl ProtocolRound for Output {
    fn message_type(&self) -> Option<MessageType> {
        Some(MessageType::Xor(XorMessageType::R1Contribution))
    }

    #[instrument(skip_all, err(Debug))]
    fn process_message(&mut self, message: &Message) -> Result<()> {
        let Payload::Xor(contribution) = &message.payload else {
            return Err(unexpected_payload(message));
        };
        let bytes: [u8; SEC_BYTES] = contribution.bytes.as_slice().try_into().map_err(|_| {
            error!(
                "Contribution from {} has {} bytes, expected {SEC_BYTES}",
                message.from(),
                contribution.bytes.len()
            );
            InternalError::blame(message.from(), "contribution has the wrong length")
        })?;
        self.received.insert(message.from().clone(), bytes);
        Ok(())
    }

    fn generate_messages<R: RngCore + CryptoRng>(&mut self, _rng: &mut R) -> Result<Vec<Message>> {
        Ok(Vec::new())
    }

    fn finalize(self) -> Result<Transition> {
        let mut result = [0u8; SEC_BYTES];
        for bytes in self.received.values() {
            xor_in_place(&mut result, bytes);
        }
        Ok(Transition::Done(ProtocolOutput::Xor(result)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::MessageError, handler::Handler, party::party_ids, testing::Network,
        utils::testing::init_testing,
    };
    use std::sync::mpsc::TryRecvError;

    fn xor_of(output: ProtocolOutput) -> [u8; SEC_BYTES] {
        match output {
            ProtocolOutput::Xor(bytes) => bytes,
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn every_party_computes_the_same_xor() {
        let mut rng = init_testing();
        let ids = party_ids(["a", "b", "c", "d", "e"]).unwrap();
        let mut network =
            Network::start(&mut rng, &ids, |id| start(id.clone(), ids.clone())).unwrap();
        network.run(&mut rng).unwrap();

        let outputs: Vec<_> = network
            .results()
            .into_iter()
            .map(|r| xor_of(r.unwrap()))
            .collect();
        assert!(outputs.windows(2).all(|w| w[0] == w[1]));
        assert_ne!(outputs[0], [0u8; SEC_BYTES]);
    }

    #[test]
    fn wrong_length_contribution_names_the_sender() {
        let mut rng = init_testing();
        let ids = party_ids(["a", "b", "c"]).unwrap();
        let mut network =
            Network::start(&mut rng, &ids, |id| start(id.clone(), ids.clone())).unwrap();
        network.tamper(|message| {
            if message.from().as_str() == "b" {
                if let Payload::Xor(c) = &mut message.payload {
                    c.bytes.pop();
                }
            }
        });
        let err = network.run(&mut rng).unwrap_err();
        match err {
            InternalError::Protocol(e) => assert_eq!(e.culprit, Some(ids[1].clone())),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn handler_skips_bad_headers_and_rejects_duplicates() {
        let mut rng = init_testing();
        let ids = party_ids(["a", "b", "c"]).unwrap();
        let mut a = Handler::new(&mut rng, start(ids[0].clone(), ids.clone()).unwrap()).unwrap();
        let b = Handler::new(&mut rng, start(ids[1].clone(), ids.clone()).unwrap()).unwrap();
        let c = Handler::new(&mut rng, start(ids[2].clone(), ids.clone()).unwrap()).unwrap();
        let from_b = b.listen().try_recv().unwrap();
        let from_c = c.listen().try_recv().unwrap();
        let own = a.listen().try_recv().unwrap();

        // Our own broadcast echoed back.
        let err = a.update(&mut rng, own).unwrap_err();
        assert_eq!(err, MessageError::FromSelf.into());
        assert!(err.is_skippable());

        // Unknown sender.
        let outsider = PartyId::new("z").unwrap();
        let err = a.update(&mut rng, from_b.clone().with_from(&outsider)).unwrap_err();
        assert_eq!(err, MessageError::UnknownSender(outsider).into());

        a.update(&mut rng, from_b.clone()).unwrap();
        let err = a.update(&mut rng, from_b).unwrap_err();
        assert_eq!(err, MessageError::Duplicate(ids[1].clone()).into());
        assert!(!a.is_finished());

        a.update(&mut rng, from_c.clone()).unwrap();
        assert!(a.is_finished());
        let err = a.update(&mut rng, from_c).unwrap_err();
        assert_eq!(err, MessageError::AlreadyFinished.into());

        // The outbound channel is closed once the run is over.
        assert!(a.listen().recv().is_err());
        assert!(matches!(a.result(), Ok(ProtocolOutput::Xor(_))));
    }

    #[test]
    fn handler_skips_foreign_and_misaddressed_messages() {
        let mut rng = init_testing();
        let ids = party_ids(["a", "b", "c"]).unwrap();
        let mut a = Handler::new(&mut rng, start(ids[0].clone(), ids.clone()).unwrap()).unwrap();
        let b = Handler::new(&mut rng, start(ids[1].clone(), ids.clone()).unwrap()).unwrap();
        let c = Handler::new(&mut rng, start(ids[2].clone(), ids.clone()).unwrap()).unwrap();
        let from_b = b.listen().try_recv().unwrap();
        let from_c = c.listen().try_recv().unwrap();
        let payload = from_b.payload.clone();

        let cases = [
            (
                Message::broadcast(ProtocolId::Keygen, &ids[1], payload.clone()),
                MessageError::WrongProtocol,
            ),
            (
                Message::direct(ProtocolId::Xor, &ids[1], &ids[2], payload.clone()),
                MessageError::WrongRecipient(ids[2].clone()),
            ),
            // A broadcast type sent point-to-point.
            (
                Message::direct(ProtocolId::Xor, &ids[1], &ids[0], payload),
                MessageError::WrongRecipient(ids[0].clone()),
            ),
        ];
        for (message, expected) in cases {
            let err = a.update(&mut rng, message).unwrap_err();
            assert!(err.is_skippable());
            assert_eq!(err, expected.into());
        }

        // None of the rejected messages counted towards the round.
        a.update(&mut rng, from_b).unwrap();
        assert!(!a.is_finished());
        a.update(&mut rng, from_c).unwrap();
        assert!(matches!(a.result(), Ok(ProtocolOutput::Xor(_))));
    }

    #[test]
    fn aborted_handler_repeats_its_error_and_closes_the_channel() {
        let mut rng = init_testing();
        let ids = party_ids(["a", "b", "c"]).unwrap();
        let mut a = Handler::new(&mut rng, start(ids[0].clone(), ids.clone()).unwrap()).unwrap();
        let b = Handler::new(&mut rng, start(ids[1].clone(), ids.clone()).unwrap()).unwrap();
        let c = Handler::new(&mut rng, start(ids[2].clone(), ids.clone()).unwrap()).unwrap();
        let mut from_b = b.listen().try_recv().unwrap();
        let from_c = c.listen().try_recv().unwrap();
        let _own = a.listen().try_recv().unwrap();
        if let Payload::Xor(contribution) = &mut from_b.payload {
            contribution.bytes.push(0);
        }

        let err = a.update(&mut rng, from_b).unwrap_err();
        assert!(!err.is_skippable());
        let InternalError::Protocol(first) = err.clone() else {
            panic!("unexpected error {err:?}");
        };
        assert_eq!(first.culprit, Some(ids[1].clone()));
        assert!(a.is_finished());
        assert!(matches!(a.listen().try_recv(), Err(TryRecvError::Disconnected)));

        // Later input gets the same verdict.
        assert_eq!(a.update(&mut rng, from_c).unwrap_err(), err);
        assert_eq!(a.result().unwrap_err(), InternalError::Protocol(first));
    }

    #[test]
    fn result_before_completion_is_a_caller_error() {
        let mut rng = init_testing();
        let ids = party_ids(["a", "b"]).unwrap();
        let a = Handler::new(&mut rng, start(ids[0].clone(), ids.clone()).unwrap()).unwrap();
        assert!(matches!(
            a.result(),
            Err(InternalError::CallingApplicationMistake(_))
        ));
    }
}
