//! Protocol error types

/// Error type for wire protocol parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Line exceeded the configured limit
    LineTooLong(usize),
    /// Line was not valid UTF-8
    InvalidUtf8,
    /// Unknown command or reply verb
    UnknownCommand(String),
    /// A required argument was missing
    MissingArgument(&'static str),
    /// An argument could not be parsed
    InvalidArgument {
        /// Which argument
        name: &'static str,
        /// Offending value
        value: String,
    },
}

impl ProtocolError {
    /// Short machine-readable code, used on the wire
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::LineTooLong(_) => "line-too-long",
            ProtocolError::InvalidUtf8 => "invalid-utf8",
            ProtocolError::UnknownCommand(_)
            | ProtocolError::MissingArgument(_)
            | ProtocolError::InvalidArgument { .. } => "bad-command",
        }
    }

    /// Whether the stream can no longer be framed after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtocolError::LineTooLong(_) | ProtocolError::InvalidUtf8)
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::LineTooLong(limit) => write!(f, "Line exceeds {} bytes", limit),
            ProtocolError::InvalidUtf8 => write!(f, "Line is not valid UTF-8"),
            ProtocolError::UnknownCommand(verb) => write!(f, "Unknown command: {}", verb),
            ProtocolError::MissingArgument(name) => write!(f, "Missing argument: {}", name),
            ProtocolError::InvalidArgument { name, value } => {
                write!(f, "Invalid {}: {:?}", name, value)
            }
        }
    }
}

impl std::error::Error for ProtocolError {}
