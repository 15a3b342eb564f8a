//! Chat message type
//!
//! A `Message` is created exactly once, by the message log at append time,
//! and never changes afterwards.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Sender name used for relay-generated notices (presence announcements)
pub const SYSTEM_SENDER: &str = "*";

/// A chat message as stored in the history and delivered to subscribers
///
/// Cheap to clone: sender and body are reference counted, so fan-out to
/// many subscribers shares one allocation per field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    seq: u64,
    sender: Arc<str>,
    body: Arc<str>,
    timestamp: SystemTime,
}

impl Message {
    pub(crate) fn new(seq: u64, sender: &str, body: &str, timestamp: SystemTime) -> Self {
        Self {
            seq,
            sender: Arc::from(sender),
            body: Arc::from(body),
            timestamp,
        }
    }

    /// Sequence number assigned by the log (starts at 1, never reused)
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Identity of the sender
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Message text
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Server-side time the message was appended
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Append time as milliseconds since the Unix epoch
    pub fn timestamp_millis(&self) -> u64 {
        self.timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Whether this is a relay-generated notice
    pub fn is_system(&self) -> bool {
        &*self.sender == SYSTEM_SENDER
    }
}
