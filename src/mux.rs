//! Routing decoded envelopes to the component that handles them.
//!
//! Each process wraps its consumer in a [`ChannelMultiplexer`]. The daemon
//! consumer matches correction results to the word requests its gateway is
//! waiting on and forwards control messages to the replayer. The client
//! consumer resolves incoming words against its dictionary and answers them.

use crate::channel::{ChannelEvent, ChannelSender, ControlState, Envelope};
use crate::correction::{CorrectionGateway, CorrectionResult, ResolveError, Resolver, WordBoundary};
use crate::replay::ReplayCommand;
use crate::shutdown::Shutdown;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};

/// Receiver of one kind of message per method.
pub trait EnvelopeConsumer {
    fn on_control(&mut self, state: ControlState);

    fn on_word(&mut self, boundary: WordBoundary);

    fn on_correction(&mut self, result: CorrectionResult);

    fn on_connected(&mut self) {}

    fn on_disconnected(&mut self) {}
}

pub struct ChannelMultiplexer<C> {
    consumer: C,
}

impl<C: EnvelopeConsumer> ChannelMultiplexer<C> {
    pub fn new(consumer: C) -> Self {
        Self { consumer }
    }

    /// Route `envelope` to exactly one consumer method.
    ///
    /// Returns the envelope kind, for logging.
    pub fn dispatch(&mut self, envelope: Envelope) -> &'static str {
        let kind = envelope.kind();
        match envelope {
            Envelope::Control(state) => self.consumer.on_control(state),
            Envelope::Word(boundary) => self.consumer.on_word(boundary),
            Envelope::Correction(result) => self.consumer.on_correction(result),
        }
        kind
    }

    pub fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => self.consumer.on_connected(),
            ChannelEvent::Message(envelope) => {
                let kind = self.dispatch(envelope);
                tracing::trace!(kind, "dispatched envelope");
            }
            ChannelEvent::Disconnected => self.consumer.on_disconnected(),
        }
    }

    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.consumer
    }

    pub fn into_consumer(self) -> C {
        self.consumer
    }
}

/// A word the daemon wants resolved by the client.
#[derive(Debug)]
pub struct ResolveRequest {
    pub boundary: WordBoundary,
    pub reply: oneshot::Sender<CorrectionResult>,
}

/// Outstanding word requests, answered first in, first out per word.
#[derive(Debug, Default)]
pub struct PendingWords {
    waiting: HashMap<WordBoundary, VecDeque<oneshot::Sender<CorrectionResult>>>,
}

impl PendingWords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, boundary: WordBoundary, reply: oneshot::Sender<CorrectionResult>) {
        let queue = self.waiting.entry(boundary).or_default();
        // Requesters that gave up will never be answered
        queue.retain(|tx| !tx.is_closed());
        queue.push_back(reply);
    }

    /// Hand `result` to the oldest request for the same word.
    ///
    /// Returns `false` if nobody was waiting for it.
    pub fn complete(&mut self, result: CorrectionResult) -> bool {
        let key = result.boundary();
        let Some(queue) = self.waiting.get_mut(&key) else {
            return false;
        };
        let reply = queue.pop_front();
        if queue.is_empty() {
            self.waiting.remove(&key);
        }
        match reply {
            // A requester that timed out still consumes its answer
            Some(reply) => {
                let _ = reply.send(result);
                true
            }
            None => false,
        }
    }

    /// Drop every outstanding request; their requesters see a disconnect.
    pub fn fail_all(&mut self) -> usize {
        let count = self.len();
        self.waiting.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.waiting.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

/// Resolves words by asking the client over the secure channel.
#[derive(Debug, Clone)]
pub struct RemoteResolver {
    requests: mpsc::Sender<ResolveRequest>,
    channel: ChannelSender,
    timeout: Duration,
}

impl RemoteResolver {
    pub fn new(
        requests: mpsc::Sender<ResolveRequest>,
        channel: ChannelSender,
        timeout: Duration,
    ) -> Self {
        Self {
            requests,
            channel,
            timeout,
        }
    }
}

impl Resolver for RemoteResolver {
    fn resolve(
        &self,
        candidate: WordBoundary,
    ) -> impl Future<Output = Result<CorrectionResult, ResolveError>> + Send {
        let ready = self.channel.is_ready();
        let requests = self.requests.clone();
        let timeout = self.timeout;

        async move {
            if !ready {
                return Err(ResolveError::Disconnected);
            }
            let (reply, answer) = oneshot::channel();
            requests
                .send(ResolveRequest {
                    boundary: candidate,
                    reply,
                })
                .await
                .map_err(|_| ResolveError::Disconnected)?;

            match tokio::time::timeout(timeout, answer).await {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(_)) => Err(ResolveError::Disconnected),
                Err(_) => Err(ResolveError::TimedOut),
            }
        }
    }
}

/// Daemon side: forwards words to the client and feeds the replayer.
pub struct DaemonConsumer {
    channel: ChannelSender,
    replay: crossbeam_channel::Sender<ReplayCommand>,
    pending: PendingWords,
}

impl DaemonConsumer {
    pub fn new(channel: ChannelSender, replay: crossbeam_channel::Sender<ReplayCommand>) -> Self {
        Self {
            channel,
            replay,
            pending: PendingWords::new(),
        }
    }

    /// Record a request and send its word to the client.
    ///
    /// If the word cannot be sent the request is dropped, which the requester
    /// sees as a disconnect.
    pub fn register(&mut self, request: ResolveRequest) {
        let ResolveRequest { boundary, reply } = request;
        match self.channel.send(Envelope::Word(boundary.clone())) {
            Ok(()) => self.pending.insert(boundary, reply),
            Err(e) => tracing::debug!("cannot forward word: {e}"),
        }
    }

    fn replay(&self, command: ReplayCommand) {
        if self.replay.send(command).is_err() {
            tracing::debug!("replayer has stopped");
        }
    }
}

impl EnvelopeConsumer for DaemonConsumer {
    fn on_control(&mut self, state: ControlState) {
        tracing::debug!(?state, "control from client");
        self.replay(ReplayCommand::SetState(state));
    }

    fn on_word(&mut self, boundary: WordBoundary) {
        tracing::debug!(word = %boundary.word, "ignoring word sent to the daemon");
    }

    fn on_correction(&mut self, result: CorrectionResult) {
        if !self.pending.complete(result) {
            tracing::debug!("discarding correction nobody asked for");
        }
    }

    fn on_connected(&mut self) {
        if let Err(e) = self.channel.send(Envelope::Control(ControlState::Start)) {
            tracing::debug!("cannot announce start: {e}");
        }
    }

    fn on_disconnected(&mut self) {
        let failed = self.pending.fail_all();
        if failed > 0 {
            tracing::debug!("{failed} word checks lost with the connection");
        }
        // Wait for the next client to say whether it wants corrections
        self.replay(ReplayCommand::SetState(ControlState::Pause));
    }
}

/// Run the daemon multiplexer until shutdown.
pub async fn run_daemon(
    mut mux: ChannelMultiplexer<DaemonConsumer>,
    mut events: mpsc::Receiver<ChannelEvent>,
    mut requests: mpsc::Receiver<ResolveRequest>,
    shutdown: Shutdown,
) -> ChannelMultiplexer<DaemonConsumer> {
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            event = events.recv() => match event {
                Some(event) => mux.handle_event(event),
                None => break,
            },
            Some(request) = requests.recv() => mux.consumer_mut().register(request),
        }
    }
    mux
}

/// Client side: answers words and reports the user's pause setting.
pub struct ClientConsumer<R> {
    channel: ChannelSender,
    gateway: CorrectionGateway<R>,
    runtime: Handle,
    paused: bool,
}

impl<R: Resolver> ClientConsumer<R> {
    pub fn new(channel: ChannelSender, gateway: CorrectionGateway<R>, runtime: Handle) -> Self {
        Self {
            channel,
            gateway,
            runtime,
            paused: false,
        }
    }

    pub fn with_paused(mut self, paused: bool) -> Self {
        self.paused = paused;
        self
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Change the user's pause setting and tell the daemon.
    pub fn set_paused(&mut self, paused: bool) {
        if paused != self.paused {
            tracing::info!("corrections {}", if paused { "paused" } else { "resumed" });
        }
        self.paused = paused;
        self.announce_state();
    }

    fn announce_state(&self) {
        let state = if self.paused {
            ControlState::Pause
        } else {
            ControlState::Resume
        };
        if let Err(e) = self.channel.send(Envelope::Control(state)) {
            tracing::debug!("cannot send {state:?}: {e}");
        }
    }
}

impl<R: Resolver> EnvelopeConsumer for ClientConsumer<R> {
    fn on_control(&mut self, state: ControlState) {
        match state {
            ControlState::Start => {
                tracing::info!("daemon started");
                self.announce_state();
            }
            ControlState::Stop => tracing::info!("daemon stopping"),
            ControlState::Pause | ControlState::Resume => {
                tracing::debug!(?state, "ignoring state sent to the client")
            }
        }
    }

    fn on_word(&mut self, boundary: WordBoundary) {
        let channel = self.channel.clone();
        self.gateway.spawn(&self.runtime, boundary, move |result| {
            if let Err(e) = channel.send(Envelope::Correction(result)) {
                tracing::debug!("cannot answer word: {e}");
            }
        });
    }

    fn on_correction(&mut self, result: CorrectionResult) {
        tracing::debug!(word = %result.word, "ignoring correction sent to the client");
    }

    fn on_connected(&mut self) {
        self.announce_state();
    }

    fn on_disconnected(&mut self) {
        tracing::debug!("daemon disconnected");
    }
}

/// Run the client multiplexer until shutdown, following `paused` changes.
pub async fn run_client<R: Resolver>(
    mut mux: ChannelMultiplexer<ClientConsumer<R>>,
    mut events: mpsc::Receiver<ChannelEvent>,
    mut paused: watch::Receiver<bool>,
    shutdown: Shutdown,
) -> ChannelMultiplexer<ClientConsumer<R>> {
    let mut paused_open = true;
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            event = events.recv() => match event {
                Some(event) => mux.handle_event(event),
                None => break,
            },
            changed = paused.changed(), if paused_open => match changed {
                Ok(()) => {
                    let value = *paused.borrow_and_update();
                    mux.consumer_mut().set_paused(value);
                }
                Err(_) => paused_open = false,
            },
        }
    }
    mux
}
