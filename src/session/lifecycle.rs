//! Per-connection chat session
//!
//! Drives one client through join, publish/receive and leave against the
//! shared broadcaster. The transport adapter owns one `ChatSession` per
//! connection and calls into it; `recv` is the only place it waits for
//! other sessions.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::relay::{Broadcaster, Message, RelayError, SubscriberHandle};
use crate::stats::SessionStats;

use super::state::{LeaveReason, SessionPhase, SessionState};

/// A single client's session
pub struct ChatSession {
    state: SessionState,
    broadcaster: Arc<Broadcaster>,
    subscription: Option<SubscriberHandle>,
    stats: SessionStats,
}

impl ChatSession {
    /// Create a session in the `Connecting` phase
    pub fn new(id: u64, peer_addr: SocketAddr, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            state: SessionState::new(id, peer_addr),
            broadcaster,
            subscription: None,
            stats: SessionStats::new(),
        }
    }

    /// Join under `identity` and return the backlog to replay
    ///
    /// The backlog must be delivered before anything from `recv`. On error
    /// the session stays in `Connecting` and may try another identity.
    pub async fn join(&mut self, identity: &str) -> Result<Vec<Message>, RelayError> {
        match self.state.phase {
            SessionPhase::Connecting => {}
            SessionPhase::Joined | SessionPhase::Leaving => return Err(RelayError::AlreadyJoined),
            SessionPhase::Closed => return Err(RelayError::SessionClosed),
        }

        let (backlog, handle) = self.broadcaster.join(identity).await?;

        self.state.on_joined(identity);
        self.subscription = Some(handle);
        self.stats.backlog_len = backlog.len();
        self.stats.messages_received += backlog.len() as u64;

        tracing::debug!(
            session_id = self.state.id,
            peer = %self.state.peer_addr,
            identity = identity,
            backlog = backlog.len(),
            "Session joined"
        );

        Ok(backlog)
    }

    /// Publish a message under this session's identity
    pub async fn publish(&mut self, body: &str) -> Result<Message, RelayError> {
        self.require_joined()?;
        let identity = self.state.identity.as_deref().ok_or(RelayError::NotJoined)?;

        let message = self.broadcaster.publish(identity, body).await;
        self.stats.messages_sent += 1;

        Ok(message)
    }

    /// Wait for the next live message
    ///
    /// `SlowConsumer` is informational: the session stays joined and the
    /// next call continues with the oldest message still queued.
    pub async fn recv(&mut self) -> Result<Message, RelayError> {
        self.require_joined()?;
        let handle = self.subscription.as_mut().ok_or(RelayError::NotJoined)?;

        match handle.recv().await {
            Ok(message) => {
                self.stats.messages_received += 1;
                Ok(message)
            }
            Err(RelayError::SlowConsumer { identity, dropped }) => {
                self.stats.dropped += dropped;
                Err(RelayError::SlowConsumer { identity, dropped })
            }
            Err(e) => Err(e),
        }
    }

    /// Leave and release the subscription
    ///
    /// Idempotent: leaving a closed session does nothing.
    pub async fn leave(&mut self, reason: LeaveReason) {
        match self.state.phase {
            SessionPhase::Connecting => {
                self.state.close();
            }
            SessionPhase::Joined => {
                self.state.begin_leave(reason);

                if let Some(handle) = self.subscription.take() {
                    self.broadcaster
                        .leave_subscriber(handle.identity(), handle.id())
                        .await;
                }

                self.state.close();

                tracing::debug!(
                    session_id = self.state.id,
                    identity = ?self.state.identity,
                    reason = %reason,
                    duration_secs = self.state.duration().as_secs(),
                    "Session closed"
                );
            }
            SessionPhase::Leaving | SessionPhase::Closed => {}
        }
    }

    fn require_joined(&self) -> Result<(), RelayError> {
        match self.state.phase {
            SessionPhase::Joined => Ok(()),
            SessionPhase::Closed | SessionPhase::Leaving => Err(RelayError::SessionClosed),
            SessionPhase::Connecting => Err(RelayError::NotJoined),
        }
    }

    /// Session ID
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Current phase
    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    /// Identity, once joined
    pub fn identity(&self) -> Option<&str> {
        self.state.identity.as_deref()
    }

    /// Reason the session left, if it has
    pub fn leave_reason(&self) -> Option<LeaveReason> {
        self.state.leave_reason
    }

    /// Current session statistics
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            duration: self.state.duration(),
            ..self.stats.clone()
        }
    }
}
