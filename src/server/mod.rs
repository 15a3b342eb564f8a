//! TCP chat server
//!
//! Accepts connections, enforces the connection limit and drives one
//! `Connection` task per client.

pub mod config;
pub mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use connection::Connection;
pub use listener::ChatServer;
