//! Corrections dictionary.
//!
//! The dictionary is a flat TOML table of `typo = "correction"` pairs. Each
//! load produces an immutable [`DictionarySnapshot`]; the watcher publishes a
//! new snapshot when the file changes, and readers take whichever snapshot is
//! current with a single load. A reader never sees a half-applied reload.

use crate::shutdown::Shutdown;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const CORRECTIONS_FILENAME: &str = "corrections.toml";

/// System-wide fallback shipped with packages.
pub const SYSTEM_CORRECTIONS_PATH: &str = "/usr/share/autocorrector/corrections.toml";

#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("no corrections file found (tried {tried:?})")]
    NotFound { tried: Vec<PathBuf> },
    #[error("cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse corrections: {0}")]
    Parse(#[from] toml::de::Error),
}

/// The correction-dictionary collaborator interface.
///
/// Implementations must be safe to call from many tasks at once and should
/// reflect reloads without the caller doing anything.
pub trait CorrectionLookup: Send + Sync + 'static {
    fn check_word(&self, word: &str) -> Option<String>;
}

/// One immutable version of the corrections table.
#[derive(Debug, Clone, Default)]
pub struct DictionarySnapshot {
    entries: HashMap<String, String>,
    source: Option<PathBuf>,
}

impl DictionarySnapshot {
    /// Build a snapshot from pairs, dropping entries that would recurse.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: sanitize(entries),
            source: None,
        }
    }

    pub fn parse(text: &str) -> Result<Self, DictionaryError> {
        let entries: HashMap<String, String> = toml::from_str(text)?;
        Ok(Self::from_entries(entries))
    }

    pub fn load(path: &Path) -> Result<Self, DictionaryError> {
        let text = std::fs::read_to_string(path).map_err(|source| DictionaryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut snapshot = Self::parse(&text)?;
        snapshot.source = Some(path.to_path_buf());
        Ok(snapshot)
    }

    pub fn check_word(&self, word: &str) -> Option<&str> {
        self.entries.get(word).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// File this snapshot was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

/// Drop every entry whose correction is itself a typo.
///
/// Otherwise the retyped correction would be corrected again.
fn sanitize(mut entries: HashMap<String, String>) -> HashMap<String, String> {
    let recursive: Vec<String> = entries
        .iter()
        .filter(|(_, correction)| entries.contains_key(correction.as_str()))
        .map(|(typo, _)| typo.clone())
        .collect();

    for typo in recursive {
        if let Some(correction) = entries.remove(&typo) {
            tracing::warn!(
                "dropping correction {typo:?} -> {correction:?}: the replacement is also listed as a typo"
            );
        }
    }
    entries
}

/// Candidate corrections files, most specific first.
pub fn candidate_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(path) = explicit {
        paths.push(path.to_path_buf());
    }
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("autocorrector").join(CORRECTIONS_FILENAME));
    }
    paths.push(PathBuf::from(SYSTEM_CORRECTIONS_PATH));
    paths
}

/// Pick the corrections file to use.
///
/// An explicitly requested file must exist; otherwise the first existing
/// candidate wins.
pub fn locate(explicit: Option<&Path>) -> Result<PathBuf, DictionaryError> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(DictionaryError::NotFound {
            tried: vec![path.to_path_buf()],
        });
    }

    let tried = candidate_paths(None);
    tried
        .iter()
        .find(|p| p.exists())
        .cloned()
        .ok_or(DictionaryError::NotFound { tried })
}

/// Cheap, cloneable read access to the current snapshot.
#[derive(Debug, Clone)]
pub struct DictionaryHandle {
    rx: watch::Receiver<Arc<DictionarySnapshot>>,
}

impl DictionaryHandle {
    /// A handle over a fixed snapshot that never reloads.
    pub fn fixed(snapshot: DictionarySnapshot) -> Self {
        let (tx, rx) = watch::channel(Arc::new(snapshot));
        // Keep the value alive after the sender is gone
        drop(tx);
        Self { rx }
    }

    pub fn snapshot(&self) -> Arc<DictionarySnapshot> {
        self.rx.borrow().clone()
    }
}

impl CorrectionLookup for DictionaryHandle {
    fn check_word(&self, word: &str) -> Option<String> {
        self.snapshot().check_word(word).map(str::to_string)
    }
}

/// Polls the corrections file and publishes a new snapshot when it changes.
pub struct DictionaryWatcher {
    path: PathBuf,
    interval: Duration,
    tx: watch::Sender<Arc<DictionarySnapshot>>,
    last_seen: Option<(SystemTime, u64)>,
}

impl DictionaryWatcher {
    /// Load `path` and create a watcher for it.
    ///
    /// The initial load must succeed; later reload failures keep the
    /// previous snapshot.
    pub fn open(
        path: impl Into<PathBuf>,
        interval: Duration,
    ) -> Result<(Self, DictionaryHandle), DictionaryError> {
        let path = path.into();
        let last_seen = file_stamp(&path);
        let snapshot = DictionarySnapshot::load(&path)?;
        tracing::info!(file = ?path, entries = snapshot.len(), "loaded corrections");

        let (tx, rx) = watch::channel(Arc::new(snapshot));
        let watcher = Self {
            path,
            interval,
            tx,
            last_seen,
        };
        Ok((watcher, DictionaryHandle { rx }))
    }

    /// Reload the file if its modification time or size changed.
    ///
    /// Returns `true` if a new snapshot was published.
    pub fn reload_if_changed(&mut self) -> bool {
        let stamp = file_stamp(&self.path);
        if stamp.is_none() || stamp == self.last_seen {
            return false;
        }
        self.last_seen = stamp;

        match DictionarySnapshot::load(&self.path) {
            Ok(snapshot) => {
                tracing::info!(file = ?self.path, entries = snapshot.len(), "reloaded corrections");
                self.tx.send_replace(Arc::new(snapshot));
                true
            }
            Err(e) => {
                tracing::warn!("keeping previous corrections: {e}");
                false
            }
        }
    }

    pub async fn run(mut self, shutdown: Shutdown) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {
                    self.reload_if_changed();
                }
            }
        }
        tracing::debug!("dictionary watcher stopped");
    }

    pub fn spawn(self, shutdown: Shutdown) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

fn file_stamp(path: &Path) -> Option<(SystemTime, u64)> {
    let meta = std::fs::metadata(path).ok()?;
    Some((meta.modified().ok()?, meta.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_lookup() {
        let dict = DictionarySnapshot::parse("teh = \"the\"\nrecieve = \"receive\"\n").unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.check_word("teh"), Some("the"));
        assert_eq!(dict.check_word("the"), None);
    }

    #[test]
    fn test_parse_rejects_nested_tables() {
        assert!(matches!(
            DictionarySnapshot::parse("[section]\nteh = \"the\"\n"),
            Err(DictionaryError::Parse(_))
        ));
    }

    #[test]
    fn test_recursive_entries_are_dropped() {
        let dict = DictionarySnapshot::from_entries([("teh", "the"), ("hte", "teh"), ("same", "same")]);
        assert_eq!(dict.check_word("teh"), Some("the"));
        assert_eq!(dict.check_word("hte"), None);
        assert_eq!(dict.check_word("same"), None);
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn test_locate_explicit_missing_file() {
        let missing = Path::new("/definitely/not/here/corrections.toml");
        assert!(matches!(
            locate(Some(missing)),
            Err(DictionaryError::NotFound { .. })
        ));
        assert_eq!(candidate_paths(Some(missing))[0], missing);
    }

    #[test]
    fn test_watcher_publishes_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CORRECTIONS_FILENAME);
        std::fs::write(&path, "teh = \"the\"\n").unwrap();

        let (mut watcher, handle) = DictionaryWatcher::open(&path, Duration::from_secs(1)).unwrap();
        let before = handle.snapshot();
        assert_eq!(handle.check_word("teh").as_deref(), Some("the"));
        assert!(!watcher.reload_if_changed());

        std::fs::write(&path, "teh = \"the\"\nadn = \"and\"\n").unwrap();
        assert!(watcher.reload_if_changed());
        assert_eq!(handle.check_word("adn").as_deref(), Some("and"));

        // Old readers keep their own consistent snapshot
        assert_eq!(before.check_word("adn"), None);
        assert_eq!(before.source(), Some(path.as_path()));
    }

    #[test]
    fn test_watcher_keeps_snapshot_on_bad_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CORRECTIONS_FILENAME);
        std::fs::write(&path, "teh = \"the\"\n").unwrap();

        let (mut watcher, handle) = DictionaryWatcher::open(&path, Duration::from_secs(1)).unwrap();
        std::fs::write(&path, "this is not toml at all").unwrap();
        assert!(!watcher.reload_if_changed());
        assert_eq!(handle.check_word("teh").as_deref(), Some("the"));
    }

    #[test]
    fn test_fixed_handle() {
        let handle = DictionaryHandle::fixed(DictionarySnapshot::from_entries([("adn", "and")]));
        assert_eq!(handle.check_word("adn").as_deref(), Some("and"));
        assert_eq!(handle.snapshot().len(), 1);
    }
}
