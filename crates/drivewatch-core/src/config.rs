/// Monitor tuning knobs.
///
/// Hosts can build a [`MonitorConfig`] in code or deserialize it from their
/// own settings file; every field has a default so partial documents work.
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default upper bound on a single wait for the next OS event.
///
/// This is also the worst-case latency between `stop()` setting the flag and
/// the worker noticing it.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Default number of messages the consumer channel holds before the
/// overflow policy kicks in.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// What the worker does when the consumer channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued message to make room for the new one.
    #[default]
    DropOldest,
    /// Discard the new message and keep the queue as it is.
    DropNewest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Bounded wait for OS events, in milliseconds.
    pub poll_interval_ms: u64,
    /// Capacity of the consumer channel. Zero is treated as one.
    pub channel_capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            overflow: OverflowPolicy::default(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn capacity(&self) -> usize {
        self.channel_capacity.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.capacity(), DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.overflow, OverflowPolicy::DropOldest);
    }

    #[test]
    fn test_zero_values_are_clamped() {
        let config = MonitorConfig {
            poll_interval_ms: 0,
            channel_capacity: 0,
            overflow: OverflowPolicy::DropNewest,
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
        assert_eq!(config.capacity(), 1);
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: MonitorConfig =
            serde_json::from_str(r#"{ "overflow": "drop_newest" }"#).unwrap();
        assert_eq!(config.overflow, OverflowPolicy::DropNewest);
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }
}
