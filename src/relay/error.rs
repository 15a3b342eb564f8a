//! Relay error types
//!
//! Error types for join, receive and session operations.

/// Error type for relay operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Identity is already registered
    DuplicateIdentity(String),
    /// Identity is empty, too long, contains whitespace or is reserved
    InvalidIdentity(String),
    /// No live registration for the identity (left, displaced or pruned)
    SubscriberNotFound(String),
    /// Subscriber fell behind and lost the oldest queued messages
    SlowConsumer {
        /// Identity of the lagging subscriber
        identity: String,
        /// Number of messages dropped from its queue
        dropped: u64,
    },
    /// Operation requires a joined session
    NotJoined,
    /// Session has already joined
    AlreadyJoined,
    /// Session is closed
    SessionClosed,
}

impl RelayError {
    /// Short machine-readable code, used on the wire
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::DuplicateIdentity(_) => "duplicate-identity",
            RelayError::InvalidIdentity(_) => "invalid-identity",
            RelayError::SubscriberNotFound(_) => "subscriber-not-found",
            RelayError::SlowConsumer { .. } => "slow-consumer",
            RelayError::NotJoined => "not-joined",
            RelayError::AlreadyJoined => "already-joined",
            RelayError::SessionClosed => "session-closed",
        }
    }
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::DuplicateIdentity(id) => write!(f, "Identity already joined: {}", id),
            RelayError::InvalidIdentity(id) => write!(f, "Invalid identity: {:?}", id),
            RelayError::SubscriberNotFound(id) => write!(f, "Subscriber not found: {}", id),
            RelayError::SlowConsumer { identity, dropped } => {
                write!(f, "Subscriber {} lagged, {} messages dropped", identity, dropped)
            }
            RelayError::NotJoined => write!(f, "Session has not joined"),
            RelayError::AlreadyJoined => write!(f, "Session already joined"),
            RelayError::SessionClosed => write!(f, "Session closed"),
        }
    }
}

impl std::error::Error for RelayError {}
