//! Usage statistics for checked and corrected words.

pub mod usage;

// Re-export commonly used types
pub use usage::{
    create_shared_stats, create_shared_stats_with_persistence, read_persisted, PersistedStats,
    SharedStats, StatsSink, StatsSnapshot, UsageStats, STATS_FILENAME,
};
