//! Wiring the components together for each process role.
//!
//! ```text
//! standalone:  reader -> segmenter -> gateway(dictionary) -> replayer
//! daemon:      reader -> segmenter -> gateway(remote) ~~channel~~> client
//!              channel -> multiplexer -> replayer
//! client:      channel -> multiplexer -> gateway(dictionary) ~~channel~~> daemon
//! ```
//!
//! Every role runs until the shared [`Shutdown`] fires, then stops its
//! threads and tasks and releases the keyboard devices.

use crate::channel::{ChannelError, ControlState, Envelope, SecureChannel, SocketOwner};
use crate::config::{Config, ConfigError};
use crate::correction::{
    CorrectionGateway, DictionaryError, DictionaryHandle, DictionaryWatcher, LocalResolver,
    Resolver,
};
use crate::keyboard::collector::POLL_INTERVAL;
use crate::keyboard::{DeviceError, KeyEvent, KeyEventSource, KeyInjector, KeyboardCollector};
use crate::mux::{self, ChannelMultiplexer, ClientConsumer, DaemonConsumer, RemoteResolver};
use crate::replay::{EditClock, KeyReplayer, ReplayCommand};
use crate::segment::WordSegmenter;
use crate::shutdown::Shutdown;
use crate::stats::{SharedStats, StatsSink};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

/// Time allowed for the daemon's `Stop` to reach the client.
const STOP_GRACE: Duration = Duration::from_millis(100);

/// Word requests waiting to be forwarded by the daemon multiplexer.
const RESOLVE_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Dictionary(#[from] DictionaryError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The keyboard pair a privileged role works with.
pub struct Devices {
    pub source: Box<dyn KeyEventSource>,
    pub injector: Box<dyn KeyInjector>,
}

impl Devices {
    pub fn new(source: Box<dyn KeyEventSource>, injector: Box<dyn KeyInjector>) -> Self {
        Self { source, injector }
    }
}

/// Segment raw key events on a dedicated thread.
///
/// Each finished word is resolved on its own task and successful results are
/// queued for the replayer, so neither lookup nor replay holds up the reader.
/// Every text-editing event advances `clock`, and each correction carries the
/// count at which its word ended.
pub fn spawn_segmenter<R: Resolver>(
    events: Receiver<KeyEvent>,
    gateway: CorrectionGateway<R>,
    runtime: Handle,
    replay: Sender<ReplayCommand>,
    clock: EditClock,
    stats: Option<SharedStats>,
    shutdown: Shutdown,
) -> Result<JoinHandle<()>, std::io::Error> {
    thread::Builder::new()
        .name("segmenter".into())
        .spawn(move || {
            let mut segmenter = WordSegmenter::new();
            while !shutdown.is_triggered() {
                let event = match events.recv_timeout(POLL_INTERVAL) {
                    Ok(event) => event,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                };

                if let Some(stats) = &stats {
                    if event.is_release() {
                        if event.is_backspace() {
                            stats.record_backspace();
                        } else {
                            stats.record_key();
                        }
                    }
                }

                if event.edits_text() {
                    clock.tick();
                }

                if let Some(boundary) = segmenter.observe(&event) {
                    tracing::debug!(word = %boundary.word, delimiter = ?boundary.delimiter, "word finished");
                    let edits = clock.now();
                    let replay = replay.clone();
                    gateway.spawn(&runtime, boundary, move |result| {
                        if !result.is_correction() {
                            return;
                        }
                        if replay.send(ReplayCommand::Apply { result, edits }).is_err() {
                            tracing::debug!("replayer has stopped");
                        }
                    });
                }
            }
            tracing::debug!("segmenter stopped");
        })
}

/// Publish the `paused` setting from the config file as it changes.
///
/// Without a path the returned receiver never changes.
pub fn follow_pause_setting(
    config_path: Option<PathBuf>,
    initial: bool,
    interval: Duration,
    shutdown: Shutdown,
) -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(initial);
    let Some(path) = config_path else {
        return rx;
    };

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => match Config::load_from(&path) {
                    Ok(config) => {
                        tx.send_if_modified(|paused| {
                            let changed = *paused != config.paused;
                            *paused = config.paused;
                            changed
                        });
                    }
                    Err(e) => tracing::debug!("cannot re-read config: {e}"),
                },
            }
        }
    });
    rx
}

fn open_dictionary(
    path: &Path,
    config: &Config,
    shutdown: &Shutdown,
) -> Result<DictionaryHandle, DictionaryError> {
    let (watcher, handle) = DictionaryWatcher::open(path, config.dictionary_poll_interval)?;
    watcher.spawn(shutdown.clone());
    Ok(handle)
}

fn local_gateway(
    dictionary: DictionaryHandle,
    stats: Option<&SharedStats>,
) -> CorrectionGateway<LocalResolver> {
    let gateway = CorrectionGateway::new(LocalResolver::new(dictionary));
    match stats {
        Some(stats) => gateway.with_stats(Arc::clone(stats) as Arc<dyn StatsSink>),
        None => gateway,
    }
}

fn initial_state(paused: bool) -> ControlState {
    if paused {
        ControlState::Pause
    } else {
        ControlState::Resume
    }
}

/// Threads of a running reader/segmenter/replayer stack.
struct KeyboardStack {
    collector: KeyboardCollector,
    segmenter: JoinHandle<()>,
    replayer: JoinHandle<()>,
}

impl KeyboardStack {
    fn start<R: Resolver>(
        config: &Config,
        devices: Devices,
        initial: ControlState,
        gateway: CorrectionGateway<R>,
        stats: Option<SharedStats>,
        shutdown: &Shutdown,
    ) -> Result<(Self, Sender<ReplayCommand>), PipelineError> {
        let clock = EditClock::new();
        let replayer = KeyReplayer::new(devices.injector, initial)
            .with_notifications(config.show_corrections)
            .with_edit_clock(clock.clone());
        let (replay_tx, replay_thread) = replayer.spawn(shutdown.clone())?;

        let mut collector = KeyboardCollector::new(devices.source, config.event_queue_capacity);
        collector.start()?;

        let segmenter = spawn_segmenter(
            collector.receiver().clone(),
            gateway,
            Handle::current(),
            replay_tx.clone(),
            clock,
            stats,
            shutdown.clone(),
        )?;

        let stack = Self {
            collector,
            segmenter,
            replayer: replay_thread,
        };
        Ok((stack, replay_tx))
    }

    /// Stop the reader first, then wait for the other threads to notice shutdown.
    async fn join(self) {
        let Self {
            mut collector,
            segmenter,
            replayer,
        } = self;
        let joined = tokio::task::spawn_blocking(move || {
            collector.stop();
            for (name, handle) in [("segmenter", segmenter), ("replayer", replayer)] {
                if handle.join().is_err() {
                    tracing::error!("{name} thread panicked");
                }
            }
        })
        .await;
        if let Err(e) = joined {
            tracing::error!("joining keyboard threads failed: {e}");
        }
    }
}

fn save_stats(stats: Option<&SharedStats>) {
    if let Some(stats) = stats {
        if let Err(e) = stats.save() {
            tracing::warn!("could not save statistics: {e}");
        }
    }
}

/// Single-process pipeline resolving words against a local dictionary.
pub async fn run_standalone(
    config: Config,
    config_path: Option<PathBuf>,
    corrections: PathBuf,
    devices: Devices,
    stats: Option<SharedStats>,
    shutdown: Shutdown,
) -> Result<(), PipelineError> {
    let dictionary = open_dictionary(&corrections, &config, &shutdown)?;
    let gateway = local_gateway(dictionary, stats.as_ref());

    let (stack, replay_tx) = KeyboardStack::start(
        &config,
        devices,
        initial_state(config.paused),
        gateway,
        stats.clone(),
        &shutdown,
    )?;
    tracing::info!("autocorrector running");

    let mut paused = follow_pause_setting(
        config_path,
        config.paused,
        config.dictionary_poll_interval,
        shutdown.clone(),
    );
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            changed = paused.changed() => {
                if changed.is_err() {
                    shutdown.wait().await;
                    break;
                }
                let state = initial_state(*paused.borrow_and_update());
                let _ = replay_tx.send(ReplayCommand::SetState(state));
            }
        }
    }

    drop(replay_tx);
    stack.join().await;
    save_stats(stats.as_ref());
    tracing::info!("autocorrector stopped");
    Ok(())
}

/// Privileged side of the split pipeline.
///
/// Listens on `socket` for the user's client and asks it to check every
/// word. Corrections stay paused until the client says otherwise.
pub async fn run_daemon(
    config: Config,
    socket: PathBuf,
    owner: Option<SocketOwner>,
    devices: Devices,
    shutdown: Shutdown,
) -> Result<(), PipelineError> {
    // The channel outlives the pipeline briefly so `Stop` can be delivered
    let channel_shutdown = Shutdown::new();
    let channel = SecureChannel::listen(socket, owner, config.channel_config(), channel_shutdown.clone())?;
    let (sender, events, channel_task) = channel.into_parts();

    let (requests_tx, requests_rx) = mpsc::channel(RESOLVE_QUEUE_CAPACITY);
    let resolver = RemoteResolver::new(requests_tx, sender.clone(), config.resolve_timeout);
    let gateway = CorrectionGateway::new(resolver);

    let started = KeyboardStack::start(
        &config,
        devices,
        ControlState::Pause,
        gateway,
        None,
        &shutdown,
    );
    let (stack, replay_tx) = match started {
        Ok(started) => started,
        Err(e) => {
            channel_shutdown.trigger();
            return Err(e);
        }
    };

    let mux = ChannelMultiplexer::new(DaemonConsumer::new(sender.clone(), replay_tx));
    let mux_task = tokio::spawn(mux::run_daemon(
        mux,
        events,
        requests_rx,
        channel_shutdown.clone(),
    ));
    tracing::info!("daemon running");

    shutdown.wait().await;
    if sender.send(Envelope::Control(ControlState::Stop)).is_ok() {
        tokio::time::sleep(STOP_GRACE).await;
    }
    channel_shutdown.trigger();

    stack.join().await;
    for (name, result) in [("multiplexer", mux_task.await.map(drop)), ("channel", channel_task.await)] {
        if let Err(e) = result {
            tracing::error!("{name} task failed: {e}");
        }
    }
    tracing::info!("daemon stopped");
    Ok(())
}

/// Unprivileged side of the split pipeline.
///
/// Dials the daemon, answers its word checks from the local dictionary and
/// tells it whether the user wants corrections.
pub async fn run_client(
    config: Config,
    config_path: Option<PathBuf>,
    socket: PathBuf,
    corrections: PathBuf,
    stats: Option<SharedStats>,
    shutdown: Shutdown,
) -> Result<(), PipelineError> {
    let dictionary = open_dictionary(&corrections, &config, &shutdown)?;
    let gateway = local_gateway(dictionary, stats.as_ref());

    let channel = SecureChannel::dial(socket, config.channel_config(), shutdown.clone());
    let (sender, events, channel_task) = channel.into_parts();

    let paused = follow_pause_setting(
        config_path,
        config.paused,
        config.dictionary_poll_interval,
        shutdown.clone(),
    );
    let consumer =
        ClientConsumer::new(sender, gateway, Handle::current()).with_paused(config.paused);
    tracing::info!("client running");

    mux::run_client(ChannelMultiplexer::new(consumer), events, paused, shutdown).await;
    if let Err(e) = channel_task.await {
        tracing::error!("channel task failed: {e}");
    }

    save_stats(stats.as_ref());
    tracing::info!("client stopped");
    Ok(())
}
