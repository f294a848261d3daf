//! Keyboard device layer.
//!
//! Reading raw key events and writing synthetic ones are privileged,
//! OS-specific operations. This module defines the seams the rest of the
//! crate uses ([`KeyEventSource`], [`KeyInjector`]), the reader thread that
//! owns the input device, the evdev backend on Linux, and backends that need
//! no OS support.

pub mod collector;
pub mod layout;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod noop;
pub mod scripted;
pub mod types;

// Re-export commonly used types
pub use collector::{DeviceError, KeyEventSource, KeyInjector, KeyboardCollector, SourcePoll};
pub use noop::{open_system_devices, NoopInjector, NoopSource};
pub use scripted::{typing_events, FedSource, InjectionLog, RecordingInjector, ScriptedSource};
pub use types::{codes, Injected, KeyEvent, KeyState};
