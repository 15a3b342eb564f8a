//! Message relay core
//!
//! The relay keeps a bounded history of chat messages and fans every new
//! message out to all joined subscribers. Late joiners get the history as a
//! backlog, then the live tail, with no gap and no duplicate at the seam.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<Broadcaster>
//!                     ┌─────────────────────────┐
//!                     │ RwLock<RelayState {     │
//!                     │   log: MessageLog,      │
//!                     │   subscribers: {        │
//!                     │     identity ->         │
//!                     │       broadcast::Tx     │
//!                     │   }                     │
//!                     │ }>                      │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Session]              [Session]               [Session]
//!    publish()              handle.recv()           handle.recv()
//!         │                       │                       │
//!         └──► log.append() ──► fan-out ──► per-subscriber queue ──► TCP
//! ```
//!
//! # Slow consumers
//!
//! Each subscriber has its own bounded queue. When a subscriber stops
//! reading, its queue overwrites the oldest entries; the publisher and the
//! other subscribers are unaffected. The subscriber's next receive reports
//! how many messages it lost.

pub mod broadcaster;
pub mod config;
pub mod error;
pub mod log;
pub mod message;
pub mod subscriber;

pub use broadcaster::Broadcaster;
pub use config::{RelayConfig, MAX_SUBSCRIBER_BUFFER};
pub use error::RelayError;
pub use log::MessageLog;
pub use message::{Message, SYSTEM_SENDER};
pub use subscriber::{Subscriber, SubscriberHandle, SubscriberRegistry};
