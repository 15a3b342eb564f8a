//! Bounded message history
//!
//! The log keeps the most recent `capacity` messages for replay to
//! late joiners. Appending past capacity evicts the oldest entry. The
//! sequence counter lives outside the buffer, so eviction never resets or
//! reuses a sequence number.

use std::collections::VecDeque;
use std::time::SystemTime;

use super::message::Message;

/// Bounded, append-only message history
#[derive(Debug)]
pub struct MessageLog {
    /// Maximum number of retained messages
    capacity: usize,
    /// Retained messages, oldest first
    messages: VecDeque<Message>,
    /// Sequence number for the next append
    next_seq: u64,
    /// Number of messages evicted over the log's lifetime
    evicted: u64,
}

impl MessageLog {
    /// Create a log retaining at most `capacity` messages
    ///
    /// A capacity of zero keeps no history; messages are still numbered.
    /// Storage grows with the history, not with `capacity`.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            messages: VecDeque::new(),
            next_seq: 1,
            evicted: 0,
        }
    }

    /// Append a message, assigning the next sequence number
    ///
    /// Evicts the oldest entry when the log is full.
    pub fn append(&mut self, sender: &str, body: &str) -> Message {
        let message = Message::new(self.next_seq, sender, body, SystemTime::now());
        self.next_seq += 1;

        if self.capacity == 0 {
            self.evicted += 1;
            return message;
        }

        while self.messages.len() >= self.capacity {
            self.messages.pop_front();
            self.evicted += 1;
        }
        self.messages.push_back(message.clone());

        message
    }

    /// Copy of the current contents, oldest first
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    /// Number of retained messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if the log holds no messages
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Maximum number of retained messages
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sequence number the next append will receive
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Sequence range currently retained
    pub fn seq_range(&self) -> Option<(u64, u64)> {
        let first = self.messages.front()?.seq();
        let last = self.messages.back()?.seq();
        Some((first, last))
    }

    /// Number of messages evicted so far
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seqs(messages: &[Message]) -> Vec<u64> {
        messages.iter().map(|m| m.seq()).collect()
    }

    #[test]
    fn test_append_assigns_sequence() {
        let mut log = MessageLog::new(10);

        let a = log.append("a", "hi");
        let b = log.append("b", "yo");

        assert_eq!(a.seq(), 1);
        assert_eq!(b.seq(), 2);
        assert_eq!(log.next_seq(), 3);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_eviction_keeps_capacity() {
        let mut log = MessageLog::new(3);

        for i in 0..4 {
            log.append("a", &format!("msg {}", i));
        }

        let snapshot = log.snapshot();
        assert_eq!(log.len(), 3);
        assert_eq!(seqs(&snapshot), vec![2, 3, 4]);
        assert_eq!(snapshot[0].body(), "msg 1");
        assert_eq!(log.evicted(), 1);
        assert_eq!(log.seq_range(), Some((2, 4)));
    }

    #[test]
    fn test_sequence_survives_eviction() {
        let mut log = MessageLog::new(2);
        let mut last = 0;

        for _ in 0..50 {
            let msg = log.append("a", "x");
            assert!(msg.seq() > last);
            last = msg.seq();
        }

        assert_eq!(last, 50);
        assert_eq!(seqs(&log.snapshot()), vec![49, 50]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut log = MessageLog::new(3);
        log.append("a", "hi");

        let snapshot = log.snapshot();
        log.append("b", "yo");
        log.append("c", "hey");
        log.append("d", "bye");

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].body(), "hi");
    }

    #[test]
    fn test_zero_capacity() {
        let mut log = MessageLog::new(0);

        assert_eq!(log.append("a", "hi").seq(), 1);
        assert_eq!(log.append("a", "again").seq(), 2);
        assert!(log.is_empty());
        assert_eq!(log.seq_range(), None);
    }

    #[test]
    fn test_unbounded_capacity_allocates_lazily() {
        let mut log = MessageLog::new(usize::MAX);

        for i in 0..3 {
            log.append("a", &i.to_string());
        }

        assert_eq!(log.len(), 3);
        assert_eq!(log.capacity(), usize::MAX);
        assert_eq!(log.seq_range(), Some((1, 3)));
    }
}
