//! Line-oriented text protocol
//!
//! The transport adapter between TCP clients and chat sessions: inbound
//! lines become `Command`s, relay events go out as `Reply` lines.

pub mod codec;
pub mod error;
pub mod frame;

pub use codec::{LineCodec, DEFAULT_MAX_LINE_LENGTH};
pub use error::ProtocolError;
pub use frame::{ChatLine, Command, Reply};
