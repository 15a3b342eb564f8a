//! Crate-wide error type

use crate::protocol::ProtocolError;
use crate::relay::RelayError;

/// Errors surfaced by the server and connection drivers
#[derive(Debug)]
pub enum Error {
    /// Socket I/O failed
    Io(std::io::Error),
    /// Relay rejected an operation
    Relay(RelayError),
    /// Peer sent something that could not be framed or parsed
    Protocol(ProtocolError),
    /// An operation did not complete in time
    Timeout(&'static str),
}

/// Result alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Relay(e) => write!(f, "Relay error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Timeout(what) => write!(f, "Timed out: {}", what),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Relay(e) => Some(e),
            Error::Protocol(e) => Some(e),
            Error::Timeout(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<RelayError> for Error {
    fn from(e: RelayError) -> Self {
        Error::Relay(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}
