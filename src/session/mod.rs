//! Session lifecycle
//!
//! A session is one client's connection from join to leave. `SessionState`
//! holds the phase machine; `ChatSession` binds it to the broadcaster.

pub mod lifecycle;
pub mod state;

pub use lifecycle::ChatSession;
pub use state::{LeaveReason, SessionPhase, SessionState};
