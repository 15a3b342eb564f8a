//! Statistics for the relay, sessions and the server

use std::time::Duration;

/// Relay-wide statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Messages currently held in history
    pub history_len: usize,
    /// Maximum history length
    pub history_capacity: usize,
    /// Registered subscribers
    pub subscriber_count: usize,
    /// Sequence number the next message will receive
    pub next_seq: u64,
    /// Messages published since start
    pub total_published: u64,
    /// Messages evicted from history
    pub total_evicted: u64,
    /// Messages dropped from slow subscribers' queues
    pub total_dropped: u64,
    /// Subscribers removed because their receiver was gone
    pub total_pruned: u64,
}

/// Session-level statistics
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Messages published by this session
    pub messages_sent: u64,
    /// Messages delivered to this session (backlog and live)
    pub messages_received: u64,
    /// Backlog length replayed on join
    pub backlog_len: usize,
    /// Messages dropped because this session fell behind
    pub dropped: u64,
    /// Session duration
    pub duration: Duration,
}

impl SessionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivered messages per second over the session's lifetime
    pub fn receive_rate(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.messages_received as f64 / secs
        } else {
            0.0
        }
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    /// Total connections ever accepted
    pub total_connections: u64,
    /// Current active connections
    pub active_connections: u64,
    /// Connections refused because of the connection limit
    pub rejected_connections: u64,
    /// Uptime
    pub uptime: Duration,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }
}
