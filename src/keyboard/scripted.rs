//! In-memory keyboard backends driven by a script.
//!
//! Used by tests and demos in place of real input devices.

use crate::keyboard::collector::{DeviceError, KeyEventSource, KeyInjector, SourcePoll};
use crate::keyboard::types::{Injected, KeyEvent};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replays a fixed list of events, then reports the device as closed.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    events: VecDeque<KeyEvent>,
}

impl ScriptedSource {
    pub fn new(events: impl IntoIterator<Item = KeyEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }

    /// Press and release every character of `text`.
    pub fn typing(text: &str) -> Self {
        Self::new(typing_events(text))
    }
}

impl KeyEventSource for ScriptedSource {
    fn poll_event(&mut self, _timeout: Duration) -> Result<SourcePoll, DeviceError> {
        match self.events.pop_front() {
            Some(event) => Ok(SourcePoll::Event(event)),
            None => Ok(SourcePoll::Closed),
        }
    }
}

/// Press and release events for every character of `text`.
pub fn typing_events(text: &str) -> Vec<KeyEvent> {
    text.chars()
        .flat_map(|c| [KeyEvent::press_char(c), KeyEvent::release_char(c)])
        .collect()
}

/// Events pushed from another thread while the pipeline runs.
///
/// Reports the device as closed once every sender is dropped.
#[derive(Debug)]
pub struct FedSource {
    rx: Receiver<KeyEvent>,
}

impl FedSource {
    pub fn new() -> (Self, Sender<KeyEvent>) {
        let (tx, rx) = unbounded();
        (Self { rx }, tx)
    }
}

impl KeyEventSource for FedSource {
    fn poll_event(&mut self, timeout: Duration) -> Result<SourcePoll, DeviceError> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(SourcePoll::Event(event)),
            Err(RecvTimeoutError::Timeout) => Ok(SourcePoll::Idle),
            Err(RecvTimeoutError::Disconnected) => Ok(SourcePoll::Closed),
        }
    }
}

/// Shared view of what a [`RecordingInjector`] has typed.
#[derive(Debug, Clone, Default)]
pub struct InjectionLog {
    actions: Arc<Mutex<Vec<Injected>>>,
}

impl InjectionLog {
    pub fn snapshot(&self) -> Vec<Injected> {
        self.actions.lock().map(|a| a.clone()).unwrap_or_default()
    }

    /// Number of backspaces typed so far.
    pub fn backspaces(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|a| matches!(a, Injected::Backspace))
            .count()
    }

    /// All typed text concatenated in order.
    pub fn text(&self) -> String {
        self.snapshot()
            .into_iter()
            .filter_map(|a| match a {
                Injected::Text(t) => Some(t),
                Injected::Backspace => None,
            })
            .collect()
    }

    fn push(&self, action: Injected) {
        if let Ok(mut actions) = self.actions.lock() {
            actions.push(action);
        }
    }
}

/// Records injected actions instead of writing to a device.
#[derive(Debug, Default)]
pub struct RecordingInjector {
    log: InjectionLog,
}

impl RecordingInjector {
    pub fn new() -> (Self, InjectionLog) {
        let log = InjectionLog::default();
        (Self { log: log.clone() }, log)
    }
}

impl KeyInjector for RecordingInjector {
    fn backspace(&mut self) -> Result<(), DeviceError> {
        self.log.push(Injected::Backspace);
        Ok(())
    }

    fn type_text(&mut self, text: &str) -> Result<(), DeviceError> {
        self.log.push(Injected::Text(text.to_string()));
        Ok(())
    }
}
