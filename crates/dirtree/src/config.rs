//! Engine configuration.
//!
//! Every field has a default so a host can deserialize a partial settings
//! object (or none at all) and still get a working engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default trash-folder marker on Windows volumes.
pub const RECYCLE_BIN_MARKER: &str = "$RECYCLE.BIN";

/// Bounded-retry settings for drive metadata polling after media insert/eject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Delay between two metadata reads, in milliseconds.
    pub interval_ms: u64,
    /// Maximum number of metadata reads before giving up.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            max_attempts: 120,
        }
    }
}

impl PollConfig {
    /// Creates a poll config with the given interval and attempt budget.
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            max_attempts,
        }
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Worst-case time spent polling before the commit is issued.
    pub fn ceiling(&self) -> Duration {
        self.interval().saturating_mul(self.max_attempts)
    }
}

/// Configuration for the synchronization engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Substring identifying the platform trash folder inside a drive.
    pub recycle_bin_marker: String,
    /// Compare special-folder prefixes without regard to case.
    pub case_insensitive_paths: bool,
    /// Polling used for optical media arrival and departure.
    pub media_poll: PollConfig,
    /// Arm a non-recursive watcher on the selected directory.
    pub watch_current_directory: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            recycle_bin_marker: RECYCLE_BIN_MARKER.to_string(),
            case_insensitive_paths: cfg!(windows),
            media_poll: PollConfig::default(),
            watch_current_directory: true,
        }
    }
}

impl SyncConfig {
    pub fn with_recycle_bin_marker(mut self, marker: impl Into<String>) -> Self {
        self.recycle_bin_marker = marker.into();
        self
    }

    pub fn with_case_insensitive_paths(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive_paths = case_insensitive;
        self
    }

    pub fn with_media_poll(mut self, media_poll: PollConfig) -> Self {
        self.media_poll = media_poll;
        self
    }

    pub fn with_watch_current_directory(mut self, enabled: bool) -> Self {
        self.watch_current_directory = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_poll_ceiling_is_twelve_seconds() {
        let poll = PollConfig::default();
        assert_eq!(poll.interval(), Duration::from_millis(100));
        assert_eq!(poll.ceiling(), Duration::from_secs(12));
    }

    #[test]
    fn builder_overrides_fields() {
        let config = SyncConfig::default()
            .with_recycle_bin_marker(".Trash")
            .with_case_insensitive_paths(true)
            .with_media_poll(PollConfig::new(Duration::from_millis(5), 3));

        assert_eq!(config.recycle_bin_marker, ".Trash");
        assert!(config.case_insensitive_paths);
        assert_eq!(config.media_poll.interval_ms, 5);
        assert_eq!(config.media_poll.max_attempts, 3);
        assert!(config.watch_current_directory);
    }

    #[test]
    fn oversized_interval_saturates() {
        let poll = PollConfig::new(Duration::MAX, 120);
        assert_eq!(poll.interval_ms, u64::MAX);
        assert_eq!(poll.ceiling(), Duration::MAX);
    }
}
