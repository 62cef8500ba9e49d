use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Engine configuration.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on monitored regions. Can only lower the monitor's own capacity.
    pub region_capacity: Option<usize>,
    /// Same-kind crossings for a region closer together than this are dropped.
    pub dedup_window_ms: u64,
    /// Interval of the safety-net reconcile that repairs OS evictions.
    pub resync_interval_ms: u64,
    /// Max queued adapter callbacks before adapters block.
    pub callback_queue_capacity: usize,
    pub control_queue_capacity: usize,
    /// Per-subscription event buffer.
    pub subscriber_capacity: usize,
    /// How long `GeofenceEngine::sync` waits for the worker.
    pub sync_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            region_capacity: None,
            dedup_window_ms: 60_000,
            resync_interval_ms: 300_000,
            callback_queue_capacity: 4096,
            control_queue_capacity: 64,
            subscriber_capacity: 1024,
            sync_timeout_ms: 5_000,
        }
    }
}

impl EngineConfig {
    /// Rejects zero capacities and intervals.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let checks: [(&str, bool); 7] = [
            ("region_capacity", self.region_capacity == Some(0)),
            ("dedup_window_ms", self.dedup_window_ms == 0),
            ("resync_interval_ms", self.resync_interval_ms == 0),
            ("callback_queue_capacity", self.callback_queue_capacity == 0),
            ("control_queue_capacity", self.control_queue_capacity == 0),
            ("subscriber_capacity", self.subscriber_capacity == 0),
            ("sync_timeout_ms", self.sync_timeout_ms == 0),
        ];
        match checks.iter().find(|(_, zero)| *zero) {
            Some((field, _)) => Err(ValidationError::InvalidConfig {
                reason: format!("{field} must be greater than zero"),
            }),
            None => Ok(()),
        }
    }

    /// `dedup_window_ms` as a `Duration`.
    #[must_use]
    pub const fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    /// `resync_interval_ms` as a `Duration`.
    #[must_use]
    pub const fn resync_interval(&self) -> Duration {
        Duration::from_millis(self.resync_interval_ms)
    }

    /// `sync_timeout_ms` as a `Duration`.
    #[must_use]
    pub const fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.dedup_window(), Duration::from_secs(60));
        assert_eq!(config.resync_interval(), Duration::from_secs(300));
    }

    #[test]
    fn zero_values_are_rejected() {
        let config = EngineConfig {
            resync_interval_ms: 0,
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("resync_interval_ms"));

        let config = EngineConfig {
            region_capacity: Some(0),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"region_capacity": 5, "dedup_window_ms": 1000}"#).unwrap();
        assert_eq!(config.region_capacity, Some(5));
        assert_eq!(config.dedup_window_ms, 1000);
        assert_eq!(config.callback_queue_capacity, 4096);
    }
}
