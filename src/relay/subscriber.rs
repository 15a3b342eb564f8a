//! Subscriber registry and delivery channels
//!
//! Each subscriber owns a dedicated single-receiver `broadcast` channel.
//! The channel is bounded; when a stalled subscriber's queue is full the
//! oldest queued message is overwritten, and the receiver is told how many
//! it lost on its next receive. Publishing never blocks on a subscriber.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use super::config::MAX_SUBSCRIBER_BUFFER;
use super::error::RelayError;
use super::message::Message;

/// Registry-side half of a subscription
#[derive(Debug)]
pub struct Subscriber {
    id: u64,
    identity: Arc<str>,
    tx: broadcast::Sender<Message>,
    joined_at: u64,
    joined_instant: Instant,
    dropped: Arc<AtomicU64>,
}

impl Subscriber {
    /// Unique registration id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Identity the subscriber joined under
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Sequence number of the first message delivered live
    pub fn joined_at(&self) -> u64 {
        self.joined_at
    }

    /// Time since registration
    pub fn connected_for(&self) -> std::time::Duration {
        self.joined_instant.elapsed()
    }

    /// Messages this subscriber lost to queue overflow
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Check if the receiving half has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.receiver_count() == 0
    }

    /// Queue a message for this subscriber
    ///
    /// Returns false if the receiving half is gone.
    pub(super) fn deliver(&self, message: Message) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// Consumer-side half of a subscription
///
/// Handed to the session that joined. Dropping it closes the subscription;
/// the registry prunes it on the next fan-out or cleanup sweep.
#[derive(Debug)]
pub struct SubscriberHandle {
    id: u64,
    identity: Arc<str>,
    rx: broadcast::Receiver<Message>,
    joined_at: u64,
    dropped: Arc<AtomicU64>,
}

impl SubscriberHandle {
    /// Unique registration id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Identity the subscription was registered under
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Sequence number of the first message delivered live
    pub fn joined_at(&self) -> u64 {
        self.joined_at
    }

    /// Messages lost to queue overflow so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Wait for the next live message
    ///
    /// Returns `SlowConsumer` once after the queue overflowed; the following
    /// call resumes with the oldest message still queued. Returns
    /// `SubscriberNotFound` once the subscription was removed from the
    /// registry and everything queued before that has been drained.
    pub async fn recv(&mut self) -> Result<Message, RelayError> {
        match self.rx.recv().await {
            Ok(message) => Ok(message),
            Err(RecvError::Lagged(n)) => Err(self.lagged(n)),
            Err(RecvError::Closed) => Err(RelayError::SubscriberNotFound(self.identity.to_string())),
        }
    }

    /// Take the next queued message without waiting
    pub fn try_recv(&mut self) -> Result<Option<Message>, RelayError> {
        match self.rx.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Lagged(n)) => Err(self.lagged(n)),
            Err(TryRecvError::Closed) => {
                Err(RelayError::SubscriberNotFound(self.identity.to_string()))
            }
        }
    }

    fn lagged(&self, n: u64) -> RelayError {
        self.dropped.fetch_add(n, Ordering::Relaxed);

        tracing::warn!(
            identity = %self.identity,
            subscriber_id = self.id,
            dropped = n,
            "Slow consumer, oldest messages dropped"
        );

        RelayError::SlowConsumer {
            identity: self.identity.to_string(),
            dropped: n,
        }
    }
}

/// Active subscribers keyed by identity
#[derive(Debug)]
pub struct SubscriberRegistry {
    subscribers: HashMap<Arc<str>, Subscriber>,
    buffer: usize,
    next_id: u64,
    /// Drop counts of subscribers no longer registered
    retired_dropped: u64,
}

impl SubscriberRegistry {
    /// Create an empty registry; each subscriber queue holds `buffer` messages
    ///
    /// `buffer` is clamped to `1..=MAX_SUBSCRIBER_BUFFER`.
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: HashMap::new(),
            buffer: buffer.clamp(1, MAX_SUBSCRIBER_BUFFER),
            next_id: 1,
            retired_dropped: 0,
        }
    }

    /// Register a new subscriber with a fresh outbound channel
    ///
    /// Fails with `DuplicateIdentity` if the identity is taken; the
    /// existing registration is left untouched.
    pub fn register(
        &mut self,
        identity: &str,
        joined_at: u64,
    ) -> Result<SubscriberHandle, RelayError> {
        if self.subscribers.contains_key(identity) {
            return Err(RelayError::DuplicateIdentity(identity.to_string()));
        }

        let id = self.next_id;
        self.next_id += 1;

        let identity: Arc<str> = Arc::from(identity);
        let (tx, rx) = broadcast::channel(self.buffer);
        let dropped = Arc::new(AtomicU64::new(0));

        self.subscribers.insert(
            Arc::clone(&identity),
            Subscriber {
                id,
                identity: Arc::clone(&identity),
                tx,
                joined_at,
                joined_instant: Instant::now(),
                dropped: Arc::clone(&dropped),
            },
        );

        Ok(SubscriberHandle {
            id,
            identity,
            rx,
            joined_at,
            dropped,
        })
    }

    /// Remove the subscriber registered under `identity`
    ///
    /// Absent identities are ignored.
    pub fn unregister(&mut self, identity: &str) -> Option<Subscriber> {
        let removed = self.subscribers.remove(identity)?;
        self.retired_dropped += removed.dropped();
        Some(removed)
    }

    /// Remove the subscriber only if it is still registration `id`
    pub fn unregister_if(&mut self, identity: &str, id: u64) -> Option<Subscriber> {
        match self.subscribers.get(identity).map(|sub| sub.id) {
            Some(current) if current == id => self.unregister(identity),
            Some(current) => {
                tracing::warn!(
                    identity = identity,
                    expected = current,
                    actual = id,
                    "Subscriber unregister mismatch"
                );
                None
            }
            None => None,
        }
    }

    /// Visit every registered subscriber
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Subscriber),
    {
        for sub in self.subscribers.values() {
            f(sub);
        }
    }

    /// Remove subscribers matching `pred`, returning their identities
    pub fn remove_where<F>(&mut self, mut pred: F) -> Vec<String>
    where
        F: FnMut(&Subscriber) -> bool,
    {
        let doomed: Vec<Arc<str>> = self
            .subscribers
            .values()
            .filter(|&sub| pred(sub))
            .map(|sub| Arc::clone(&sub.identity))
            .collect();

        doomed
            .into_iter()
            .filter_map(|identity| self.unregister(&identity))
            .map(|sub| sub.identity.to_string())
            .collect()
    }

    /// Look up a subscriber
    pub fn get(&self, identity: &str) -> Option<&Subscriber> {
        self.subscribers.get(identity)
    }

    /// Check if an identity is registered
    pub fn contains(&self, identity: &str) -> bool {
        self.subscribers.contains_key(identity)
    }

    /// Number of registered subscribers
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Check if no subscribers are registered
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Total drops across current and past subscribers
    pub fn total_dropped(&self) -> u64 {
        self.retired_dropped + self.subscribers.values().map(Subscriber::dropped).sum::<u64>()
    }
}
