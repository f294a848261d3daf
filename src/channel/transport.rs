//! The secure channel supervisor.
//!
//! One task owns the socket, the connection key and the reconnect loop.
//! Everything else talks to it through a [`ChannelSender`] and a stream of
//! [`ChannelEvent`]s. States go `Disconnected -> Handshaking -> Ready` and
//! back to `Disconnected` when the connection ends. Delivery is at most once:
//! anything still queued when a connection ends is dropped.

use super::backoff::BackoffPolicy;
use super::crypto::{Packet, SharedKey};
use super::envelope::Envelope;
use super::error::{ChannelError, FrameError, HandshakeError};
use super::frame::{read_frame, write_frame, DEFAULT_MAX_FRAME_BYTES};
use super::handshake::handshake_with_timeout;
use crate::shutdown::Shutdown;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Per-user socket location.
pub fn socket_path(user: &str) -> PathBuf {
    std::env::temp_dir().join(format!("autocorrector-{user}.sock"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Handshaking,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A connection reached `Ready`
    Connected,
    Message(Envelope),
    /// The connection ended; queued messages were dropped
    Disconnected,
}

/// Account that should own a listening socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketOwner {
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub reconnect: BackoffPolicy,
    pub send_retry: BackoffPolicy,
    pub handshake_timeout: Duration,
    pub max_frame_bytes: usize,
    /// Capacity of the outbound and event queues
    pub queue_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reconnect: BackoffPolicy::reconnect(),
            send_retry: BackoffPolicy::send_retry(),
            handshake_timeout: Duration::from_secs(2),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            queue_capacity: 1024,
        }
    }
}

/// Cloneable, non-blocking send side of a channel.
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::Sender<Envelope>,
    state: watch::Receiver<ChannelState>,
}

impl ChannelSender {
    /// Queue `envelope` for the current connection.
    ///
    /// Fails immediately unless the channel is `Ready`.
    pub fn send(&self, envelope: Envelope) -> Result<(), ChannelError> {
        if !self.is_ready() {
            return Err(ChannelError::NotReady);
        }
        self.tx.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ChannelError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ChannelError::Closed,
        })
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ChannelState::Ready
    }
}

pub struct ChannelHandle {
    sender: ChannelSender,
    events: mpsc::Receiver<ChannelEvent>,
    task: JoinHandle<()>,
}

impl ChannelHandle {
    pub fn sender(&self) -> ChannelSender {
        self.sender.clone()
    }

    pub fn state(&self) -> ChannelState {
        self.sender.state()
    }

    /// Wait until the channel is in `state`.
    pub async fn wait_for(&self, state: ChannelState) {
        let mut rx = self.sender.state.clone();
        let _ = rx.wait_for(|s| *s == state).await;
    }

    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    pub fn into_parts(self) -> (ChannelSender, mpsc::Receiver<ChannelEvent>, JoinHandle<()>) {
        (self.sender, self.events, self.task)
    }
}

pub struct SecureChannel;

impl SecureChannel {
    /// Bind `path` and serve one peer at a time until shutdown.
    ///
    /// Any stale socket file is replaced. The socket is restricted to mode
    /// 0600 and, if `owner` is given, handed to that account. Must be called
    /// within a Tokio runtime.
    pub fn listen(
        path: impl Into<PathBuf>,
        owner: Option<SocketOwner>,
        config: ChannelConfig,
        shutdown: Shutdown,
    ) -> Result<ChannelHandle, ChannelError> {
        let path = path.into();
        let listener = bind_socket(&path, owner)?;
        tracing::info!(socket = ?path, "listening for client");

        let (supervisor, handle_parts) = Supervisor::new(config, shutdown);
        let task = tokio::spawn(supervisor.run_listener(listener, path));
        Ok(handle_parts.finish(task))
    }

    /// Dial `path`, reconnecting with backoff until shutdown.
    ///
    /// Must be called within a Tokio runtime.
    pub fn dial(path: impl Into<PathBuf>, config: ChannelConfig, shutdown: Shutdown) -> ChannelHandle {
        let path = path.into();
        let (supervisor, handle_parts) = Supervisor::new(config, shutdown);
        let task = tokio::spawn(supervisor.run_dialer(path));
        handle_parts.finish(task)
    }
}

fn bind_socket(path: &Path, owner: Option<SocketOwner>) -> Result<UnixListener, ChannelError> {
    use std::os::unix::fs::PermissionsExt;

    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(socket = ?path, "removed stale socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let listener = UnixListener::bind(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;

    if let Some(owner) = owner {
        nix::unistd::chown(
            path,
            Some(nix::unistd::Uid::from_raw(owner.uid)),
            Some(nix::unistd::Gid::from_raw(owner.gid)),
        )
        .map_err(std::io::Error::from)?;
    }
    Ok(listener)
}

struct HandleParts {
    sender: ChannelSender,
    events: mpsc::Receiver<ChannelEvent>,
}

impl HandleParts {
    fn finish(self, task: JoinHandle<()>) -> ChannelHandle {
        ChannelHandle {
            sender: self.sender,
            events: self.events,
            task,
        }
    }
}

/// How one connection ended.
#[derive(Debug)]
enum SessionEnd {
    PeerClosed,
    Failed(ChannelError),
    Shutdown,
}

struct Supervisor {
    config: ChannelConfig,
    shutdown: Shutdown,
    outbound: mpsc::Receiver<Envelope>,
    events: mpsc::Sender<ChannelEvent>,
    state: watch::Sender<ChannelState>,
}

impl Supervisor {
    fn new(config: ChannelConfig, shutdown: Shutdown) -> (Self, HandleParts) {
        let capacity = config.queue_capacity.max(1);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (ev_tx, ev_rx) = mpsc::channel(capacity);
        let (state_tx, state_rx) = watch::channel(ChannelState::Disconnected);

        let supervisor = Self {
            config,
            shutdown,
            outbound: out_rx,
            events: ev_tx,
            state: state_tx,
        };
        let parts = HandleParts {
            sender: ChannelSender {
                tx: out_tx,
                state: state_rx,
            },
            events: ev_rx,
        };
        (supervisor, parts)
    }

    fn should_stop(&self) -> bool {
        self.shutdown.is_triggered() || self.events.is_closed()
    }

    async fn run_dialer(mut self, path: PathBuf) {
        let mut backoff = self.config.reconnect.start();

        while !self.should_stop() {
            match UnixStream::connect(&path).await {
                Ok(stream) => match self.serve(stream).await {
                    Ok(SessionEnd::Shutdown) => break,
                    Ok(end) => {
                        backoff.reset();
                        log_session_end(&end);
                    }
                    Err(e) => tracing::warn!("handshake with daemon failed: {e}"),
                },
                Err(e) => {
                    tracing::debug!(socket = ?path, attempt = backoff.attempts(), "connect failed: {e}")
                }
            }

            let Some(delay) = backoff.next_delay() else {
                tracing::warn!("giving up on {path:?} after {} attempts", backoff.attempts());
                break;
            };
            tokio::select! {
                _ = self.shutdown.wait() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.state.send_replace(ChannelState::Disconnected);
        tracing::debug!("channel dialer stopped");
    }

    async fn run_listener(mut self, listener: UnixListener, path: PathBuf) {
        let mut backoff = self.config.reconnect.start();

        while !self.should_stop() {
            let accepted = tokio::select! {
                _ = self.shutdown.wait() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, _)) => {
                    backoff.reset();
                    match self.serve(stream).await {
                        Ok(SessionEnd::Shutdown) => break,
                        Ok(end) => log_session_end(&end),
                        Err(e) => tracing::warn!("handshake with client failed: {e}"),
                    }
                }
                Err(e) => {
                    tracing::warn!("accept failed: {e}");
                    let delay = backoff.next_delay().unwrap_or(self.config.reconnect.max);
                    tokio::select! {
                        _ = self.shutdown.wait() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.state.send_replace(ChannelState::Disconnected);
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::debug!(socket = ?path, "could not remove socket: {e}");
        }
        tracing::debug!("channel listener stopped");
    }

    /// Run one connection from handshake to disconnect.
    async fn serve(&mut self, mut stream: UnixStream) -> Result<SessionEnd, HandshakeError> {
        self.state.send_replace(ChannelState::Handshaking);
        let key = match handshake_with_timeout(&mut stream, self.config.handshake_timeout).await {
            Ok(key) => key,
            Err(e) => {
                self.state.send_replace(ChannelState::Disconnected);
                return Err(e);
            }
        };

        // Nothing queued before this connection belongs to it
        let stale = self.drain_outbound();
        if stale > 0 {
            tracing::debug!("dropped {stale} messages queued while disconnected");
        }
        let session = Uuid::new_v4();
        self.state.send_replace(ChannelState::Ready);
        tracing::info!(%session, "secure channel ready");
        let _ = self.events.send(ChannelEvent::Connected).await;

        let (read_half, write_half) = stream.into_split();
        let max_frame_bytes = self.config.max_frame_bytes;
        let end = tokio::select! {
            end = read_loop(read_half, &key, &self.events, max_frame_bytes) => end,
            end = write_loop(write_half, &key, &mut self.outbound, &self.config, &self.shutdown) => end,
        };
        drop(key);

        self.state.send_replace(ChannelState::Disconnected);
        let lost = self.drain_outbound();
        if lost > 0 {
            tracing::debug!(%session, "dropped {lost} undelivered messages");
        }
        let _ = self.events.send(ChannelEvent::Disconnected).await;
        Ok(end)
    }

    fn drain_outbound(&mut self) -> usize {
        let mut dropped = 0;
        while self.outbound.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}

fn log_session_end(end: &SessionEnd) {
    match end {
        SessionEnd::PeerClosed => tracing::info!("peer closed the secure channel"),
        SessionEnd::Failed(e) => tracing::warn!("secure channel failed: {e}"),
        SessionEnd::Shutdown => {}
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    key: &SharedKey,
    events: &mpsc::Sender<ChannelEvent>,
    max_frame_bytes: usize,
) -> SessionEnd {
    loop {
        let body = match read_frame(&mut reader, max_frame_bytes).await {
            Ok(Some(body)) => body,
            Ok(None) => return SessionEnd::PeerClosed,
            Err(FrameError::FrameTooLarge { got_bytes, .. }) => {
                tracing::warn!("skipping {got_bytes}-byte frame: too large");
                continue;
            }
            Err(e) => return SessionEnd::Failed(e.into()),
        };

        let plaintext = match Packet::from_bytes(&body).and_then(|packet| key.open(&packet)) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                tracing::warn!("dropping packet: {e}");
                continue;
            }
        };

        match Envelope::decode(&plaintext) {
            Ok(envelope) => {
                tracing::trace!(kind = envelope.kind(), "received envelope");
                if events.send(ChannelEvent::Message(envelope)).await.is_err() {
                    return SessionEnd::Shutdown;
                }
            }
            Err(e) => tracing::warn!("discarding undecodable message: {e}"),
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    key: &SharedKey,
    outbound: &mut mpsc::Receiver<Envelope>,
    config: &ChannelConfig,
    shutdown: &Shutdown,
) -> SessionEnd {
    loop {
        tokio::select! {
            biased;
            next = outbound.recv() => {
                let Some(envelope) = next else {
                    return SessionEnd::Shutdown;
                };
                if let Err(e) = send_with_retry(&mut writer, key, &envelope, config).await {
                    return SessionEnd::Failed(e);
                }
            }
            _ = shutdown.wait() => {
                // Best effort for anything queued before shutdown, e.g. `Stop`
                while let Ok(envelope) = outbound.try_recv() {
                    if send_once(&mut writer, key, &envelope, config.max_frame_bytes).await.is_err() {
                        break;
                    }
                }
                return SessionEnd::Shutdown;
            }
        }
    }
}

async fn send_once(
    writer: &mut OwnedWriteHalf,
    key: &SharedKey,
    envelope: &Envelope,
    max_frame_bytes: usize,
) -> Result<(), ChannelError> {
    let packet = key.seal(&envelope.encode())?;
    write_frame(writer, &packet.to_bytes(), max_frame_bytes).await?;
    Ok(())
}

/// Send one envelope, resealing on every attempt.
async fn send_with_retry(
    writer: &mut OwnedWriteHalf,
    key: &SharedKey,
    envelope: &Envelope,
    config: &ChannelConfig,
) -> Result<(), ChannelError> {
    let mut backoff = config.send_retry.start();
    loop {
        match send_once(writer, key, envelope, config.max_frame_bytes).await {
            Ok(()) => return Ok(()),
            Err(ChannelError::Frame(FrameError::FrameTooLarge { got_bytes, .. })) => {
                tracing::warn!(kind = envelope.kind(), "dropping {got_bytes}-byte message: too large");
                return Ok(());
            }
            Err(e) => match backoff.next_delay() {
                Some(delay) => {
                    tracing::debug!(attempt = backoff.attempts(), "send failed, retrying: {e}");
                    tokio::time::sleep(delay).await;
                }
                None => return Err(e),
            },
        }
    }
}
