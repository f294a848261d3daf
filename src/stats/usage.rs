//! Usage statistics.
//!
//! Counters are plain atomics so recording never blocks the pipeline. Totals
//! are persisted as JSON on clean shutdown and picked up on the next start.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const STATS_FILENAME: &str = "stats.json";

/// The statistics collaborator interface.
///
/// Calls are fire-and-forget and must return immediately.
pub trait StatsSink: Send + Sync + 'static {
    fn notify_checked(&self, word: &str);

    fn notify_corrected(&self, word: &str, correction: &str);
}

/// Running counters for the current process.
#[derive(Debug)]
pub struct UsageStats {
    /// Key releases seen by the segmenter
    keys_pressed: AtomicU64,
    backspaces: AtomicU64,
    words_checked: AtomicU64,
    words_corrected: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl UsageStats {
    pub fn new() -> Self {
        Self {
            keys_pressed: AtomicU64::new(0),
            backspaces: AtomicU64::new(0),
            words_checked: AtomicU64::new(0),
            words_corrected: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create stats that continue from (and save back to) `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!("could not load previous stats: {e}");
        }

        stats
    }

    pub fn record_key(&self) {
        self.keys_pressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backspace(&self) {
        self.backspaces.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            keys_pressed: self.keys_pressed.load(Ordering::Relaxed),
            backspaces: self.backspaces.load(Ordering::Relaxed),
            words_checked: self.words_checked.load(Ordering::Relaxed),
            words_corrected: self.words_corrected.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    pub fn summary(&self) -> String {
        self.stats().summary()
    }

    /// Save totals to disk, if persistence is enabled.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                keys_pressed: stats.keys_pressed,
                backspaces: stats.backspaces,
                words_checked: stats.words_checked,
                words_corrected: stats.words_corrected,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let persisted = read_persisted(path)?;
                self.keys_pressed
                    .store(persisted.keys_pressed, Ordering::Relaxed);
                self.backspaces.store(persisted.backspaces, Ordering::Relaxed);
                self.words_checked
                    .store(persisted.words_checked, Ordering::Relaxed);
                self.words_corrected
                    .store(persisted.words_corrected, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for UsageStats {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsSink for UsageStats {
    fn notify_checked(&self, _word: &str) {
        self.words_checked.fetch_add(1, Ordering::Relaxed);
    }

    fn notify_corrected(&self, word: &str, correction: &str) {
        tracing::debug!("corrected {word:?} -> {correction:?}");
        self.words_corrected.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub keys_pressed: u64,
    pub backspaces: u64,
    pub words_checked: u64,
    pub words_corrected: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

impl StatsSnapshot {
    /// Percentage of checked words that needed no correction.
    pub fn accuracy(&self) -> f64 {
        if self.words_checked == 0 {
            return 100.0;
        }
        (1.0 - self.words_corrected as f64 / self.words_checked as f64) * 100.0
    }

    /// Backspaces as a percentage of all keys.
    pub fn backspace_ratio(&self) -> f64 {
        if self.keys_pressed == 0 {
            return 0.0;
        }
        self.backspaces as f64 / self.keys_pressed as f64 * 100.0
    }

    pub fn summary(&self) -> String {
        format!(
            "Statistics:\n\
             - Keys pressed: {}\n\
             - Backspaces: {} ({:.1}% of keys)\n\
             - Words checked: {}\n\
             - Words corrected: {}\n\
             - Accuracy: {:.1}%",
            self.keys_pressed,
            self.backspaces,
            self.backspace_ratio(),
            self.words_checked,
            self.words_corrected,
            self.accuracy()
        )
    }
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedStats {
    pub keys_pressed: u64,
    pub backspaces: u64,
    pub words_checked: u64,
    pub words_corrected: u64,
    pub last_updated: DateTime<Utc>,
}

/// Read persisted totals without opening a live stats object.
pub fn read_persisted(path: &std::path::Path) -> Result<PersistedStats, std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(std::io::Error::other)
}

/// Thread-safe shared stats.
pub type SharedStats = Arc<UsageStats>;

pub fn create_shared_stats() -> SharedStats {
    Arc::new(UsageStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedStats {
    Arc::new(UsageStats::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_and_accuracy() {
        let stats = UsageStats::new();
        for _ in 0..4 {
            stats.notify_checked("word");
        }
        stats.notify_corrected("teh", "the");
        stats.record_key();
        stats.record_key();
        stats.record_backspace();

        let snap = stats.stats();
        assert_eq!(snap.words_checked, 4);
        assert_eq!(snap.words_corrected, 1);
        assert!((snap.accuracy() - 75.0).abs() < f64::EPSILON);
        assert!((snap.backspace_ratio() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_stats_are_well_defined() {
        let snap = UsageStats::new().stats();
        assert_eq!(snap.accuracy(), 100.0);
        assert_eq!(snap.backspace_ratio(), 0.0);
        assert!(snap.summary().contains("Words checked: 0"));
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STATS_FILENAME);

        let stats = UsageStats::with_persistence(path.clone());
        stats.notify_checked("teh");
        stats.notify_corrected("teh", "the");
        stats.save().unwrap();

        let reloaded = UsageStats::with_persistence(path.clone());
        let snap = reloaded.stats();
        assert_eq!(snap.words_checked, 1);
        assert_eq!(snap.words_corrected, 1);
        assert_eq!(read_persisted(&path).unwrap().words_corrected, 1);
    }
}
