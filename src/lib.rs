//! Real-time chat relay
//!
//! Clients connect over TCP, submit text messages and receive a live
//! broadcast of every message, starting with a replay of recent history.
//!
//! # Modules
//!
//! - [`relay`]: bounded message log, subscriber registry and broadcaster
//! - [`session`]: per-client join/leave lifecycle
//! - [`protocol`]: line-oriented wire format
//! - [`server`]: TCP listener and connection driver
//! - [`stats`]: counters for the relay, sessions and server
//!
//! # Example
//!
//! ```no_run
//! use chat_relay::{ChatServer, ServerConfig};
//!
//! # async fn example() -> chat_relay::error::Result<()> {
//! let config = ServerConfig::with_addr("127.0.0.1:50051".parse().unwrap());
//! let server = ChatServer::new(config);
//! server.run_until(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! }).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, Result};
pub use relay::{Broadcaster, Message, RelayConfig, RelayError, SubscriberHandle};
pub use server::{ChatServer, ServerConfig};
pub use session::{ChatSession, LeaveReason, SessionPhase};
