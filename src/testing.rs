// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Synchronous in-process message router for unit tests.

use crate::{
    errors::Result,
    handler::Handler,
    message::Message,
    party::PartyId,
    round::{ProtocolOutput, StartRound},
};
use rand::{CryptoRng, RngCore};
use tracing::warn;

type Tamper = Box<dyn FnMut(&mut Message)>;

/// Every party's handler plus a hook that may rewrite messages in flight.
pub(crate) struct Network {
    handlers: Vec<Handler>,
    tamper: Option<Tamper>,
}

impl Network {
    pub(crate) fn start<R, F>(rng: &mut R, ids: &[PartyId], mut start: F) -> Result<Self>
    where
        R: RngCore + CryptoRng,
        F: FnMut(&PartyId) -> Result<StartRound>,
    {
        let handlers = ids
            .iter()
            .map(|id| Handler::new(rng, start(id)?))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            handlers,
            tamper: None,
        })
    }

    pub(crate) fn tamper(&mut self, f: impl FnMut(&mut Message) + 'static) {
        self.tamper = Some(Box::new(f));
    }

    /// Deliver messages until nobody has anything left to say. Returns the
    /// first fatal error any party reports.
    pub(crate) fn run<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<()> {
        loop {
            let pending: Vec<Message> = self
                .handlers
                .iter()
                .flat_map(|h| h.listen().try_iter().collect::<Vec<_>>())
                .collect();
            if pending.is_empty() {
                return Ok(());
            }
            for mut message in pending {
                if let Some(tamper) = self.tamper.as_mut() {
                    tamper(&mut message);
                }
                for handler in self.handlers.iter_mut() {
                    let id = handler.self_id();
                    if id == message.from() || message.to().is_some_and(|to| to != id) {
                        continue;
                    }
                    if let Err(e) = handler.update(rng, message.clone()) {
                        if !e.is_skippable() {
                            return Err(e);
                        }
                        warn!("Skipped message: {e}");
                    }
                }
            }
        }
    }

    pub(crate) fn results(self) -> Vec<Result<ProtocolOutput>> {
        self.handlers.into_iter().map(Handler::result).collect()
    }
}
