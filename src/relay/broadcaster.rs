//! Broadcaster implementation
//!
//! The single authority for message order. The message log and the
//! subscriber registry share one lock, so append + fan-out and
//! register + snapshot are each one critical section. That gives every
//! subscriber the same global order and makes the join boundary exact: a
//! message is either in the joiner's backlog or in its live queue, never
//! both and never neither.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::stats::RelayStats;

use super::config::RelayConfig;
use super::error::RelayError;
use super::log::MessageLog;
use super::message::{Message, SYSTEM_SENDER};
use super::subscriber::{Subscriber, SubscriberHandle, SubscriberRegistry};

/// State guarded by the broadcaster lock
#[derive(Debug)]
struct RelayState {
    log: MessageLog,
    subscribers: SubscriberRegistry,
    total_pruned: u64,
}

/// Central message relay
///
/// Share it between sessions with `Arc<Broadcaster>`.
pub struct Broadcaster {
    state: RwLock<RelayState>,
    config: RelayConfig,
}

impl Broadcaster {
    /// Create a broadcaster with default configuration
    pub fn new() -> Self {
        Self::with_config(RelayConfig::default())
    }

    /// Create a broadcaster with custom configuration
    pub fn with_config(config: RelayConfig) -> Self {
        Self {
            state: RwLock::new(RelayState {
                log: MessageLog::new(config.history_capacity),
                subscribers: SubscriberRegistry::new(config.subscriber_buffer),
                total_pruned: 0,
            }),
            config,
        }
    }

    /// Get the relay configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Append a message and deliver it to every subscriber
    ///
    /// Never fails because of a subscriber: full queues drop their oldest
    /// entry, and subscribers whose receiving half is gone are pruned.
    pub async fn publish(&self, sender: &str, body: &str) -> Message {
        let mut state = self.state.write().await;
        self.publish_locked(&mut state, sender, body)
    }

    fn publish_locked(&self, state: &mut RelayState, sender: &str, body: &str) -> Message {
        let message = state.log.append(sender, body);

        let mut closed = 0usize;
        state.subscribers.for_each(|sub| {
            if !sub.deliver(message.clone()) {
                closed += 1;
            }
        });

        if closed > 0 {
            self.prune_locked(state);
        }

        tracing::trace!(
            seq = message.seq(),
            sender = sender,
            subscribers = state.subscribers.len(),
            "Message published"
        );

        message
    }

    /// Join under `identity`
    ///
    /// Returns the current history (oldest first) and the live subscription.
    /// Everything with a sequence number below the handle's `joined_at` is
    /// in the backlog; everything from `joined_at` on arrives live.
    pub async fn join(
        &self,
        identity: &str,
    ) -> Result<(Vec<Message>, SubscriberHandle), RelayError> {
        self.validate_identity(identity)?;

        let mut state = self.state.write().await;
        let joined_at = state.log.next_seq();
        let handle = state.subscribers.register(identity, joined_at)?;
        let backlog = state.log.snapshot();

        tracing::info!(
            identity = identity,
            subscriber_id = handle.id(),
            subscribers = state.subscribers.len(),
            backlog = backlog.len(),
            "Subscriber joined"
        );

        if self.config.announce_presence {
            self.publish_locked(&mut state, SYSTEM_SENDER, &format!("{} joined", identity));
        }

        Ok((backlog, handle))
    }

    /// Remove whatever is registered under `identity`
    ///
    /// Unknown identities are ignored.
    pub async fn leave(&self, identity: &str) {
        let removed = self.state.write().await.subscribers.unregister(identity);
        self.on_removed(removed).await;
    }

    /// Remove `identity` only if it still belongs to registration `id`
    ///
    /// Used by sessions so a late cleanup never removes a newer session
    /// that reused the identity. Returns whether anything was removed.
    pub async fn leave_subscriber(&self, identity: &str, id: u64) -> bool {
        let removed = self
            .state
            .write()
            .await
            .subscribers
            .unregister_if(identity, id);
        let found = removed.is_some();
        self.on_removed(removed).await;
        found
    }

    async fn on_removed(&self, removed: Option<Subscriber>) {
        let Some(sub) = removed else {
            return;
        };

        tracing::info!(
            identity = sub.identity(),
            subscriber_id = sub.id(),
            dropped = sub.dropped(),
            connected_secs = sub.connected_for().as_secs(),
            "Subscriber left"
        );

        if self.config.announce_presence {
            self.publish(SYSTEM_SENDER, &format!("{} left", sub.identity()))
                .await;
        }
    }

    /// Copy of the current history, oldest first
    pub async fn backlog(&self) -> Vec<Message> {
        self.state.read().await.log.snapshot()
    }

    /// Number of registered subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.state.read().await.subscribers.len()
    }

    /// Check if an identity is currently joined
    pub async fn is_joined(&self, identity: &str) -> bool {
        self.state.read().await.subscribers.contains(identity)
    }

    /// Get relay statistics
    pub async fn stats(&self) -> RelayStats {
        let state = self.state.read().await;

        RelayStats {
            history_len: state.log.len(),
            history_capacity: state.log.capacity(),
            subscriber_count: state.subscribers.len(),
            next_seq: state.log.next_seq(),
            total_published: state.log.next_seq() - 1,
            total_evicted: state.log.evicted(),
            total_dropped: state.subscribers.total_dropped(),
            total_pruned: state.total_pruned,
        }
    }

    /// Remove subscribers whose receiving half has been dropped
    ///
    /// Returns the number removed.
    pub async fn prune(&self) -> usize {
        let mut state = self.state.write().await;
        self.prune_locked(&mut state)
    }

    /// Each notice can itself find closed subscribers; every round removes
    /// at least one, so the recursion ends.
    fn prune_locked(&self, state: &mut RelayState) -> usize {
        let removed = state.subscribers.remove_where(Subscriber::is_closed);
        state.total_pruned += removed.len() as u64;

        for identity in &removed {
            tracing::info!(identity = %identity, "Orphaned subscriber pruned");
        }

        if self.config.announce_presence {
            for identity in &removed {
                self.publish_locked(state, SYSTEM_SENDER, &format!("{} left", identity));
            }
        }

        removed.len()
    }

    /// Spawn background cleanup task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let broadcaster = Arc::clone(self);
        let interval = broadcaster.config.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                broadcaster.prune().await;
            }
        })
    }

    fn validate_identity(&self, identity: &str) -> Result<(), RelayError> {
        let valid = !identity.is_empty()
            && identity.len() <= self.config.max_identity_len
            && identity != SYSTEM_SENDER
            && !identity.chars().any(char::is_whitespace);

        if valid {
            Ok(())
        } else {
            Err(RelayError::InvalidIdentity(identity.to_string()))
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}
