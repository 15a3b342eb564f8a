//! Statistics and counters

pub mod metrics;

pub use metrics::{RelayStats, ServerStats, SessionStats};
