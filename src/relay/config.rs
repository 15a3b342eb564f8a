//! Relay configuration

use std::time::Duration;

/// Upper bound on the per-subscriber queue length
pub const MAX_SUBSCRIBER_BUFFER: usize = 1 << 16;

/// Configuration for the message relay
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Number of messages kept for replay to late joiners
    pub history_capacity: usize,

    /// Per-subscriber outbound queue length (rounded up to a power of two,
    /// clamped to `1..=MAX_SUBSCRIBER_BUFFER`).
    /// When full, the oldest queued message is dropped.
    pub subscriber_buffer: usize,

    /// Maximum identity length in bytes
    pub max_identity_len: usize,

    /// Publish a notice from the system sender on join and leave,
    /// including subscribers pruned after their receiver was dropped
    pub announce_presence: bool,

    /// How often the cleanup task sweeps for orphaned subscribers
    pub cleanup_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            subscriber_buffer: 256,
            max_identity_len: 32,
            announce_presence: false,
            cleanup_interval: Duration::from_secs(30),
        }
    }
}

impl RelayConfig {
    /// Set the history capacity
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Set the per-subscriber queue length (clamped to `1..=MAX_SUBSCRIBER_BUFFER`)
    pub fn subscriber_buffer(mut self, len: usize) -> Self {
        self.subscriber_buffer = len.clamp(1, MAX_SUBSCRIBER_BUFFER);
        self
    }

    /// Set the maximum identity length
    pub fn max_identity_len(mut self, len: usize) -> Self {
        self.max_identity_len = len;
        self
    }

    /// Enable join/leave notices
    pub fn announce_presence(mut self, enabled: bool) -> Self {
        self.announce_presence = enabled;
        self
    }

    /// Set the cleanup interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}
