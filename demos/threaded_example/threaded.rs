//! ## Example usage of the [`tss_cmp`] crate.
//!
//! Each party is represented by a worker thread. A main coordinator is used to
//! start protocol runs and route messages between workers.
//!
//! **Note**: A trusted coordinator is not required to run the threshold ECDSA
//! protocols. Networking models with less trust include authenticated
//! point-to-point channels between the workers or an untrusted relay node that
//! routes authenticated messages between the workers.
//!
//! This example uses [`std::sync::mpsc`] channels to communicate [`Message`]s
//! amongst the workers and coordinator.
//!
//! # Warning: Trust Model
//! This example does not implement sender authentication, which is required for
//! a secure deployment. The coordinator is trusted to route messages correctly
//! and the workers are trusted not to forge messages from other parties.

use clap::Parser;
use rand::{rngs::StdRng, SeedableRng};
use std::{
    collections::HashMap,
    sync::mpsc::{channel, Receiver, Sender},
    thread,
};
use tracing::{debug, info, instrument, span, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use tss_cmp::{
    keygen, sign, verify_signature, xor, Handler, KeyOutput, Message, PartyId, ProtocolOutput,
    StartRound,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of party worker threads to use.
    #[arg(short, long, default_value_t = 3)]
    number_of_workers: usize,
    /// Degree of the sharing polynomial; any `threshold + 1` parties can sign.
    #[arg(short, long, default_value_t = 1)]
    threshold: usize,
    /// Message to sign.
    #[arg(short, long, default_value = "hello world")]
    message: String,
}

/// The protocols a worker can be asked to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubProtocol {
    Xor,
    Keygen,
    Refresh,
    Sign,
}

/// Message from the coordinator instructing the worker on the next action.
enum MessageFromCoordinator {
    /// Message from another worker delivering a protocol message.
    SubProtocolMessage(Message),
    /// Start a new run among the given parties.
    NewSubProtocol(SubProtocol, Vec<PartyId>),
}

/// Message from a worker to the coordinator.
enum MessageFromWorker {
    /// Messages to route to other workers.
    FinishedRound(Vec<Message>),
    /// The worker finished the current run.
    SubProtocolEnded,
}

type WorkerChannels = HashMap<PartyId, Sender<MessageFromCoordinator>>;

/// 1) Set up logging.
/// 2) Create channels between the workers and the main thread.
/// 3) Spawn one worker thread per party.
/// 4) Run XOR, key generation, refresh and signing in turn.
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let filter = EnvFilter::from_default_env();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .compact()
        .init();
    let span = span!(Level::INFO, "main");
    let _enter = span.entered();

    anyhow::ensure!(
        cli.threshold >= 1 && cli.threshold < cli.number_of_workers,
        "threshold must be between 1 and the number of workers minus one"
    );

    let (outgoing_tx, workers_rx) = channel::<MessageFromWorker>();
    let mut worker_messages: WorkerChannels = HashMap::new();
    let party_ids = (0..cli.number_of_workers)
        .map(|i| PartyId::new(format!("party-{i}")))
        .collect::<tss_cmp::Result<Vec<_>>>()?;
    info!("Spawning {} worker threads", party_ids.len());

    let mut workers = Vec::new();
    for id in &party_ids {
        let (from_coordinator_tx, from_coordinator_rx) = channel::<MessageFromCoordinator>();
        worker_messages.insert(id.clone(), from_coordinator_tx);
        let outgoing = outgoing_tx.clone();
        let worker = Worker::new(
            id.clone(),
            cli.threshold,
            cli.message.clone().into_bytes(),
            outgoing,
        );
        workers.push(thread::spawn(move || worker.run(from_coordinator_rx)));
    }

    let coordinator = Coordinator {
        send_to_workers: worker_messages,
        from_workers: workers_rx,
    };
    let mut signers = party_ids.clone();
    signers.truncate(cli.threshold + 1);
    for (sub_protocol, parties) in [
        (SubProtocol::Xor, &party_ids),
        (SubProtocol::Keygen, &party_ids),
        (SubProtocol::Refresh, &party_ids),
        (SubProtocol::Sign, &signers),
    ] {
        coordinator.run(sub_protocol, parties)?;
    }

    // Closing the worker channels ends the worker loops.
    drop(coordinator);
    for worker in workers {
        match worker.join() {
            Ok(result) => result?,
            Err(_) => anyhow::bail!("worker thread panicked"),
        }
    }
    Ok(())
}

/// Coordinator responsible for starting runs and routing messages.
struct Coordinator {
    send_to_workers: WorkerChannels,
    from_workers: Receiver<MessageFromWorker>,
}

impl Coordinator {
    /// Run `sub_protocol` among `parties` from start to finish.
    fn run(&self, sub_protocol: SubProtocol, parties: &[PartyId]) -> anyhow::Result<()> {
        info!("Starting {sub_protocol:?} with {} parties", parties.len());
        for id in parties {
            self.worker(id)?
                .send(MessageFromCoordinator::NewSubProtocol(
                    sub_protocol,
                    parties.to_vec(),
                ))?;
        }
        self.route_worker_messages(parties)?;
        info!("Finished {sub_protocol:?}");
        Ok(())
    }

    fn worker(&self, id: &PartyId) -> anyhow::Result<&Sender<MessageFromCoordinator>> {
        self.send_to_workers
            .get(id)
            .ok_or_else(|| anyhow::anyhow!("no worker for {id}"))
    }

    /// Route messages until every party of the run has finished.
    ///
    /// Warning: no sender authentication is done while routing messages.
    fn route_worker_messages(&self, parties: &[PartyId]) -> anyhow::Result<()> {
        let mut ended = 0;
        for message in &self.from_workers {
            match message {
                MessageFromWorker::FinishedRound(messages) => {
                    for m in messages {
                        trace!("Routing {:?} from {}", m.message_type(), m.from());
                        let recipients: Vec<&PartyId> = match m.to() {
                            Some(to) => vec![to],
                            None => parties.iter().filter(|id| *id != m.from()).collect(),
                        };
                        for to in recipients {
                            self.worker(to)?
                                .send(MessageFromCoordinator::SubProtocolMessage(m.clone()))?;
                        }
                    }
                }
                MessageFromWorker::SubProtocolEnded => {
                    ended += 1;
                    if ended == parties.len() {
                        debug!("All workers finished the run");
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

/// A party taking part in the runs.
struct Worker {
    id: PartyId,
    threshold: usize,
    message: Vec<u8>,
    rng: StdRng,
    handler: Option<Handler>,
    key: Option<KeyOutput>,
    outgoing: Sender<MessageFromWorker>,
}

impl Worker {
    fn new(
        id: PartyId,
        threshold: usize,
        message: Vec<u8>,
        outgoing: Sender<MessageFromWorker>,
    ) -> Self {
        Self {
            id,
            threshold,
            message,
            rng: StdRng::from_entropy(),
            handler: None,
            key: None,
            outgoing,
        }
    }

    #[instrument(skip_all, fields(id = %self.id))]
    fn run(mut self, from_coordinator: Receiver<MessageFromCoordinator>) -> anyhow::Result<()> {
        info!("Worker thread started");
        for incoming in from_coordinator {
            match incoming {
                MessageFromCoordinator::NewSubProtocol(sub_protocol, parties) => {
                    let start = self.start(sub_protocol, parties)?;
                    self.handler = Some(Handler::new(&mut self.rng, start)?);
                }
                MessageFromCoordinator::SubProtocolMessage(message) => {
                    let handler = self
                        .handler
                        .as_mut()
                        .ok_or_else(|| anyhow::anyhow!("no run in progress"))?;
                    if let Err(e) = handler.update(&mut self.rng, message) {
                        if !e.is_skippable() {
                            return Err(e.into());
                        }
                        warn!("Skipped a message: {e}");
                    }
                }
            }
            self.flush()?;
        }
        Ok(())
    }

    fn start(
        &self,
        sub_protocol: SubProtocol,
        parties: Vec<PartyId>,
    ) -> anyhow::Result<StartRound> {
        let start = match sub_protocol {
            SubProtocol::Xor => xor::start(self.id.clone(), parties)?,
            SubProtocol::Keygen => keygen::start_keygen(self.id.clone(), parties, self.threshold)?,
            SubProtocol::Refresh => {
                let key = self.key()?;
                keygen::start_refresh(&key.session, &key.secret)?
            }
            SubProtocol::Sign => {
                let key = self.key()?;
                sign::start_sign(&key.session, &key.secret, &parties, &self.message)?
            }
        };
        Ok(start)
    }

    fn key(&self) -> anyhow::Result<&KeyOutput> {
        self.key
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no key generated yet"))
    }

    /// Forward queued messages and store the output of a finished run.
    fn flush(&mut self) -> anyhow::Result<()> {
        let Some(handler) = self.handler.as_ref() else {
            return Ok(());
        };
        let messages: Vec<Message> = handler.listen().try_iter().collect();
        if !messages.is_empty() {
            self.outgoing.send(MessageFromWorker::FinishedRound(messages))?;
        }
        if !handler.is_finished() {
            return Ok(());
        }
        let Some(handler) = self.handler.take() else {
            return Ok(());
        };
        match handler.result()? {
            ProtocolOutput::Xor(bytes) => debug!("Joint randomness {bytes:02x?}"),
            ProtocolOutput::Key(key) => {
                info!("Public key {:?}", key.session.public_key());
                self.key = Some(*key);
            }
            ProtocolOutput::Signature(signature) => {
                let key = self.key()?;
                anyhow::ensure!(
                    verify_signature(key.session.public_key(), &self.message, &signature),
                    "signature does not verify"
                );
                info!("Produced a valid signature {signature:?}");
            }
        }
        self.outgoing.send(MessageFromWorker::SubProtocolEnded)?;
        Ok(())
    }
}
