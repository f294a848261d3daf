//! Autocorrector - real-time, system-wide typo correction.
//!
//! Keystrokes are read from the keyboard device, reassembled into words, and
//! when a finished word is a known misspelling it is erased and retyped in
//! place through a virtual keyboard.
//!
//! Reading and injecting keys needs root, while the dictionary and the user's
//! preferences belong to the user. The work is therefore split between a
//! privileged daemon and an unprivileged client talking over an encrypted,
//! reconnecting unix socket. Both halves can also run in one process.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────── daemon (root) ────────────────────────┐
//! │ ┌──────────┐   ┌───────────┐   ┌─────────┐   ┌─────────────┐  │
//! │ │ keyboard │──▶│  segment  │──▶│ gateway │   │   replay    │  │
//! │ │  reader  │   │ (words)   │   │(remote) │   │ (virtual kb)│  │
//! │ └──────────┘   └───────────┘   └────┬────┘   └──────▲──────┘  │
//! │                                     │   mux ────────┘         │
//! └─────────────────────────────────────┼───▲─────────────────────┘
//!                      secure channel   │   │
//! ┌─────────────────────────────────────▼───┴─────────────────────┐
//! │ client (user):  mux ──▶ gateway(dictionary) ──▶ stats          │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use autocorrector::keyboard::{open_system_devices, KeyboardCollector};
//! use autocorrector::segment::WordSegmenter;
//!
//! let (source, _injector) = open_system_devices(true).expect("devices");
//! let mut collector = KeyboardCollector::new(source, 10_000);
//! collector.start().expect("Failed to start collector");
//!
//! let mut segmenter = WordSegmenter::new();
//! while let Ok(event) = collector.receiver().recv() {
//!     if let Some(word) = segmenter.observe(&event) {
//!         println!("{} then {:?}", word.word, word.delimiter);
//!     }
//! }
//! ```

pub mod channel;
pub mod config;
pub mod correction;
pub mod keyboard;
pub mod logging;
pub mod mux;
pub mod pipeline;
pub mod replay;
pub mod segment;
pub mod shutdown;
pub mod stats;

// Re-export key types at crate root for convenience
pub use channel::{ChannelState, ControlState, Envelope, SecureChannel};
pub use config::{Config, ConfigError};
pub use correction::{CorrectionGateway, CorrectionResult, DictionarySnapshot, WordBoundary};
pub use keyboard::{KeyEvent, KeyboardCollector};
pub use mux::ChannelMultiplexer;
pub use replay::KeyReplayer;
pub use segment::WordSegmenter;
pub use shutdown::Shutdown;
pub use stats::{SharedStats, UsageStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
