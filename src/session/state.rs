//! Session state machine
//!
//! Tracks a chat session from connection to close.
//!
//! ```text
//! Connecting ──join──► Joined ──leave──► Leaving ──unregistered──► Closed
//!      │                                                             ▲
//!      └──────────────────── closed before joining ──────────────────┘
//! ```

use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Connected, not yet joined
    Connecting,
    /// Registered and receiving messages
    Joined,
    /// Unregistering
    Leaving,
    /// Terminal
    Closed,
}

/// Why a session left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    /// Client asked to leave
    Requested,
    /// Transport closed or failed to read
    Disconnected,
    /// Writing to the client failed or timed out
    DeliveryFailed,
    /// No traffic within the idle timeout
    TimedOut,
    /// The registry no longer knows the subscriber
    Evicted,
}

impl std::fmt::Display for LeaveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LeaveReason::Requested => "requested",
            LeaveReason::Disconnected => "disconnected",
            LeaveReason::DeliveryFailed => "delivery failed",
            LeaveReason::TimedOut => "timed out",
            LeaveReason::Evicted => "evicted",
        };
        f.write_str(s)
    }
}

/// Complete session state
#[derive(Debug)]
pub struct SessionState {
    /// Unique session ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    pub phase: SessionPhase,

    /// Identity (after join)
    pub identity: Option<String>,

    /// Connection start time
    pub connected_at: Instant,

    /// Time the session joined
    pub joined_at: Option<Instant>,

    /// Reason recorded when leaving started
    pub leave_reason: Option<LeaveReason>,
}

impl SessionState {
    /// Create a new session state
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            phase: SessionPhase::Connecting,
            identity: None,
            connected_at: Instant::now(),
            joined_at: None,
            leave_reason: None,
        }
    }

    /// Connecting → Joined
    ///
    /// Returns false (and changes nothing) from any other phase.
    pub fn on_joined(&mut self, identity: &str) -> bool {
        if self.phase != SessionPhase::Connecting {
            return false;
        }
        self.phase = SessionPhase::Joined;
        self.identity = Some(identity.to_string());
        self.joined_at = Some(Instant::now());
        true
    }

    /// Joined → Leaving
    pub fn begin_leave(&mut self, reason: LeaveReason) -> bool {
        if self.phase != SessionPhase::Joined {
            return false;
        }
        self.phase = SessionPhase::Leaving;
        self.leave_reason = Some(reason);
        true
    }

    /// Leaving or Connecting → Closed
    pub fn close(&mut self) -> bool {
        match self.phase {
            SessionPhase::Leaving | SessionPhase::Connecting => {
                self.phase = SessionPhase::Closed;
                true
            }
            SessionPhase::Joined | SessionPhase::Closed => false,
        }
    }

    /// Check if the session is joined
    pub fn is_joined(&self) -> bool {
        self.phase == SessionPhase::Joined
    }

    /// Check if the session reached its terminal phase
    pub fn is_closed(&self) -> bool {
        self.phase == SessionPhase::Closed
    }

    /// Get session duration
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
