//! Keyboard device traits and the reader thread that owns the input device.
//!
//! The reader is the only task on the critical path of the user's keystrokes,
//! so it never waits on anything but the device: events go into a bounded
//! queue with `try_send` and are dropped if the queue is full.

use crate::keyboard::types::KeyEvent;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// How long a source may block before the reader re-checks its stop flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors raised by keyboard backends.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("collector is already running")]
    AlreadyRunning,
    #[error("no keyboard backend is available on this platform")]
    NoBackend,
    #[error("cannot open keyboard device: {0}")]
    Open(String),
    #[error("cannot create virtual keyboard: {0}")]
    Virtual(String),
    #[error("keyboard device I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of polling a [`KeyEventSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePoll {
    Event(KeyEvent),
    /// Nothing arrived within the timeout.
    Idle,
    /// The device is gone; no further events will be produced.
    Closed,
}

/// OS keyboard abstraction producing key press/release events.
///
/// Implementations must not report events written by this process's own
/// virtual keyboard, otherwise replayed corrections would be segmented again.
pub trait KeyEventSource: Send + 'static {
    /// Wait up to `timeout` for the next event.
    fn poll_event(&mut self, timeout: Duration) -> Result<SourcePoll, DeviceError>;
}

/// Virtual keyboard used to replay corrections.
pub trait KeyInjector: Send + 'static {
    fn backspace(&mut self) -> Result<(), DeviceError>;

    fn type_text(&mut self, text: &str) -> Result<(), DeviceError>;
}

/// Runs a [`KeyEventSource`] on its own thread and queues its events.
pub struct KeyboardCollector {
    source: Option<Box<dyn KeyEventSource>>,
    sender: Sender<KeyEvent>,
    receiver: Receiver<KeyEvent>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl KeyboardCollector {
    /// Create a collector with a queue holding at most `capacity` events.
    pub fn new(source: Box<dyn KeyEventSource>, capacity: usize) -> Self {
        // Bounded so a stalled segmenter cannot grow memory without limit
        let (sender, receiver) = bounded(capacity.max(1));

        Self {
            source: Some(source),
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    /// Start reading events in a background thread.
    ///
    /// A collector owns its device exclusively, so it can only be started once.
    pub fn start(&mut self) -> Result<(), DeviceError> {
        let Some(mut source) = self.source.take() else {
            return Err(DeviceError::AlreadyRunning);
        };

        self.running.store(true, Ordering::SeqCst);

        let sender = self.sender.clone();
        let running = self.running.clone();

        let handle = thread::Builder::new()
            .name("key-reader".into())
            .spawn(move || {
                run_reader(source.as_mut(), &sender, &running);
                running.store(false, Ordering::SeqCst);
                tracing::debug!("key reader stopped");
            })?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop reading and release the device.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Receiver for captured key events.
    pub fn receiver(&self) -> &Receiver<KeyEvent> {
        &self.receiver
    }
}

impl Drop for KeyboardCollector {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_reader(source: &mut dyn KeyEventSource, sender: &Sender<KeyEvent>, running: &AtomicBool) {
    while running.load(Ordering::SeqCst) {
        match source.poll_event(POLL_INTERVAL) {
            Ok(SourcePoll::Event(event)) => {
                // Never block the device read on a slow consumer
                if sender.try_send(event).is_err() {
                    tracing::debug!("key event queue full, dropping event");
                }
            }
            Ok(SourcePoll::Idle) => {}
            Ok(SourcePoll::Closed) => break,
            Err(e) => {
                tracing::error!("keyboard read failed: {e}");
                break;
            }
        }
    }
}
