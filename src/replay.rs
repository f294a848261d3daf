//! Replaying corrections through the virtual keyboard.
//!
//! The replayer owns the injector and runs on its own thread, fed by a
//! queue. A correction erases the word plus the delimiter that ended it, then
//! types the replacement followed by the same delimiter.
//!
//! Erasing is only correct while the word and its delimiter are the last
//! thing typed. Every keystroke that edits text advances an [`EditClock`];
//! a correction is dropped if the clock moved after its word ended.

use crate::channel::ControlState;
use crate::correction::CorrectionResult;
use crate::keyboard::collector::POLL_INTERVAL;
use crate::keyboard::{DeviceError, KeyInjector};
use crate::shutdown::Shutdown;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Number of text-editing keystrokes seen so far, shared between the
/// segmenter and the replayer.
#[derive(Debug, Clone, Default)]
pub struct EditClock {
    edits: Arc<AtomicU64>,
}

impl EditClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one edit and return the new count.
    pub fn tick(&self) -> u64 {
        self.edits.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn now(&self) -> u64 {
        self.edits.load(Ordering::SeqCst)
    }
}

/// Work for the replay thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayCommand {
    /// Replay `result`, whose word ended at edit count `edits`
    Apply {
        result: CorrectionResult,
        edits: u64,
    },
    SetState(ControlState),
}

pub struct KeyReplayer {
    injector: Box<dyn KeyInjector>,
    paused: bool,
    show_corrections: bool,
    clock: Option<EditClock>,
}

impl KeyReplayer {
    pub fn new(injector: Box<dyn KeyInjector>, initial: ControlState) -> Self {
        let mut replayer = Self {
            injector,
            paused: false,
            show_corrections: false,
            clock: None,
        };
        replayer.set_state(initial);
        replayer
    }

    /// Log an info line for every applied correction.
    pub fn with_notifications(mut self, show_corrections: bool) -> Self {
        self.show_corrections = show_corrections;
        self
    }

    /// Drop corrections for words the user has typed past.
    pub fn with_edit_clock(mut self, clock: EditClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Whether text was edited after edit count `edits`.
    pub fn is_stale(&self, edits: u64) -> bool {
        self.clock.as_ref().is_some_and(|clock| clock.now() != edits)
    }

    /// `Pause` and `Stop` suppress replay; `Resume` re-enables it.
    pub fn set_state(&mut self, state: ControlState) {
        let paused = match state {
            ControlState::Pause | ControlState::Stop => true,
            ControlState::Resume => false,
            ControlState::Start => self.paused,
        };
        if paused != self.paused {
            tracing::info!("corrections {}", if paused { "paused" } else { "resumed" });
        }
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Replace the typed word with its correction.
    ///
    /// Returns whether anything was injected.
    pub fn apply(&mut self, result: &CorrectionResult) -> Result<bool, DeviceError> {
        if !result.is_correction() {
            return Ok(false);
        }
        if self.paused {
            tracing::debug!(word = %result.word, "paused, not replaying");
            return Ok(false);
        }

        // One extra for the delimiter the user already typed
        let erase = result.word.chars().count() + 1;
        for _ in 0..erase {
            self.injector.backspace()?;
        }

        let mut replacement = String::with_capacity(result.correction.len() + 4);
        replacement.push_str(&result.correction);
        replacement.push(result.delimiter);
        self.injector.type_text(&replacement)?;

        if self.show_corrections {
            tracing::info!("corrected {:?} to {:?}", result.word, result.correction);
        }
        Ok(true)
    }

    pub fn handle(&mut self, command: ReplayCommand) {
        match command {
            ReplayCommand::SetState(state) => self.set_state(state),
            ReplayCommand::Apply { result, edits } => {
                if self.is_stale(edits) {
                    tracing::debug!(word = %result.word, "typing continued, dropping correction");
                    return;
                }
                if let Err(e) = self.apply(&result) {
                    tracing::error!("replaying correction failed: {e}");
                }
            }
        }
    }

    /// Move the replayer onto its own thread.
    ///
    /// The thread exits on shutdown or once every sender is dropped, releasing
    /// the virtual keyboard.
    pub fn spawn(self, shutdown: Shutdown) -> Result<(Sender<ReplayCommand>, JoinHandle<()>), DeviceError> {
        let (tx, rx) = unbounded();
        let handle = thread::Builder::new()
            .name("key-replayer".into())
            .spawn(move || {
                self.run(&rx, &shutdown);
                tracing::debug!("key replayer stopped");
            })?;
        Ok((tx, handle))
    }

    fn run(mut self, rx: &Receiver<ReplayCommand>, shutdown: &Shutdown) {
        while !shutdown.is_triggered() {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}
