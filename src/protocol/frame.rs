//! Wire frames
//!
//! Every frame is one UTF-8 line. Commands flow client → server, replies
//! server → client:
//!
//! ```text
//! Client                                   Server
//!   |------- JOIN alice ------------------->|
//!   |<------ WELCOME alice 2 ---------------|
//!   |<------ MSG 1 1700000000000 bob hi ----|  backlog
//!   |<------ MSG 2 1700000000050 bob yo ----|
//!   |------- SAY hello everyone ----------->|
//!   |<------ SENT 3 ------------------------|
//!   |<------ MSG 3 1700000001000 alice ... -|  live
//!   |------- LEAVE ------------------------>|
//!   |<------ BYE ---------------------------|
//! ```

use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::relay::Message;

use super::error::ProtocolError;

/// Client → server frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Join under an identity
    Join(String),
    /// Publish a message
    Say(String),
    /// Leave the chat
    Leave,
    /// Keepalive
    Ping,
}

impl Command {
    /// Parse a command line (without the trailing newline)
    ///
    /// Verbs are case-insensitive.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let (verb, rest) = split_verb(line);

        match verb.to_ascii_uppercase().as_str() {
            "JOIN" => {
                let identity = rest.trim();
                if identity.is_empty() {
                    return Err(ProtocolError::MissingArgument("identity"));
                }
                Ok(Command::Join(identity.to_string()))
            }
            "SAY" => {
                if rest.trim().is_empty() {
                    return Err(ProtocolError::MissingArgument("text"));
                }
                Ok(Command::Say(rest.to_string()))
            }
            "LEAVE" => Ok(Command::Leave),
            "PING" => Ok(Command::Ping),
            _ => Err(ProtocolError::UnknownCommand(verb.to_string())),
        }
    }

    /// Append the encoded line to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        put_line(buf, self);
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Join(identity) => write!(f, "JOIN {}", identity),
            Command::Say(text) => write!(f, "SAY {}", text),
            Command::Leave => f.write_str("LEAVE"),
            Command::Ping => f.write_str("PING"),
        }
    }
}

/// A chat message as carried on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub seq: u64,
    pub timestamp_millis: u64,
    pub sender: String,
    pub body: String,
}

impl From<&Message> for ChatLine {
    fn from(message: &Message) -> Self {
        Self {
            seq: message.seq(),
            timestamp_millis: message.timestamp_millis(),
            sender: message.sender().to_string(),
            body: message.body().to_string(),
        }
    }
}

/// Server → client frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Join accepted; `backlog` MSG lines follow
    Welcome { identity: String, backlog: usize },
    /// A chat message
    Message(ChatLine),
    /// Publish acknowledged with the assigned sequence number
    Sent { seq: u64 },
    /// Messages were dropped because the client fell behind
    Dropped { count: u64 },
    /// Keepalive answer
    Pong,
    /// Request failed
    Error { code: String, reason: String },
    /// Session closed by request
    Bye,
}

impl Reply {
    /// Build an error reply
    pub fn error(code: &str, reason: impl fmt::Display) -> Self {
        Reply::Error {
            code: code.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Parse a reply line (without the trailing newline)
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let (verb, rest) = split_verb(line);

        match verb {
            "WELCOME" => {
                let (identity, backlog) = split_word(rest, "identity")?;
                Ok(Reply::Welcome {
                    identity: identity.to_string(),
                    backlog: parse_num(backlog.trim(), "backlog")?,
                })
            }
            "MSG" => {
                let (seq, rest) = split_word(rest, "seq")?;
                let (timestamp, rest) = split_word(rest, "timestamp")?;
                let (sender, body) = split_word(rest, "sender")?;
                Ok(Reply::Message(ChatLine {
                    seq: parse_num(seq, "seq")?,
                    timestamp_millis: parse_num(timestamp, "timestamp")?,
                    sender: sender.to_string(),
                    body: body.to_string(),
                }))
            }
            "SENT" => Ok(Reply::Sent {
                seq: parse_num(rest.trim(), "seq")?,
            }),
            "DROPPED" => Ok(Reply::Dropped {
                count: parse_num(rest.trim(), "count")?,
            }),
            "PONG" => Ok(Reply::Pong),
            "ERR" => {
                let (code, reason) = split_word(rest, "code")?;
                Ok(Reply::Error {
                    code: code.to_string(),
                    reason: reason.to_string(),
                })
            }
            "BYE" => Ok(Reply::Bye),
            _ => Err(ProtocolError::UnknownCommand(verb.to_string())),
        }
    }

    /// Append the encoded line to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        put_line(buf, self);
    }
}

impl From<&Message> for Reply {
    fn from(message: &Message) -> Self {
        Reply::Message(ChatLine::from(message))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Welcome { identity, backlog } => write!(f, "WELCOME {} {}", identity, backlog),
            Reply::Message(line) => write!(
                f,
                "MSG {} {} {} {}",
                line.seq, line.timestamp_millis, line.sender, line.body
            ),
            Reply::Sent { seq } => write!(f, "SENT {}", seq),
            Reply::Dropped { count } => write!(f, "DROPPED {}", count),
            Reply::Pong => f.write_str("PONG"),
            Reply::Error { code, reason } => write!(f, "ERR {} {}", code, reason),
            Reply::Bye => f.write_str("BYE"),
        }
    }
}

fn put_line(buf: &mut BytesMut, frame: &impl fmt::Display) {
    buf.put_slice(frame.to_string().as_bytes());
    buf.put_u8(b'\n');
}

/// Split off the verb; the remainder keeps everything after the first space
fn split_verb(line: &str) -> (&str, &str) {
    line.split_once(' ').unwrap_or((line, ""))
}

fn split_word<'a>(s: &'a str, name: &'static str) -> Result<(&'a str, &'a str), ProtocolError> {
    match s.split_once(' ') {
        Some((word, rest)) if !word.is_empty() => Ok((word, rest)),
        None if !s.is_empty() => Ok((s, "")),
        _ => Err(ProtocolError::MissingArgument(name)),
    }
}

fn parse_num<T: std::str::FromStr>(s: &str, name: &'static str) -> Result<T, ProtocolError> {
    s.parse().map_err(|_| ProtocolError::InvalidArgument {
        name,
        value: s.to_string(),
    })
}
