//! Line codec
//!
//! Splits a byte stream into newline-terminated UTF-8 lines. A trailing
//! `\r` is stripped so `\r\n` clients work unchanged.

use bytes::{Buf, BytesMut};

use super::error::ProtocolError;
use super::frame::{Command, Reply};

/// Default maximum line length in bytes (excluding the newline)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

/// Newline-delimited line codec
#[derive(Debug, Clone, Copy)]
pub struct LineCodec {
    max_line_length: usize,
}

impl LineCodec {
    /// Create a codec with the default line limit
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create a codec with a custom line limit
    pub fn with_max_length(max_line_length: usize) -> Self {
        Self { max_line_length }
    }

    /// Maximum line length in bytes
    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    /// Take the next complete line out of `buf`
    ///
    /// Returns `Ok(None)` when more data is needed. Consumed bytes are
    /// removed from `buf`; partial lines are left in place.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<String>, ProtocolError> {
        let Some(pos) = buf.iter().position(|b| *b == b'\n') else {
            // The read may have stopped between `\r` and `\n`
            if content_len(buf) > self.max_line_length {
                return Err(ProtocolError::LineTooLong(self.max_line_length));
            }
            return Ok(None);
        };

        if content_len(&buf[..pos]) > self.max_line_length {
            return Err(ProtocolError::LineTooLong(self.max_line_length));
        }

        let line = buf.split_to(pos);
        buf.advance(1);

        let line = line.strip_suffix(b"\r").unwrap_or(&line[..]);
        std::str::from_utf8(line)
            .map(str::to_string)
            .map(Some)
            .map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Decode the next line as a client command
    ///
    /// The outer `Result` carries framing errors, the inner one parse errors
    /// for a line that was fully consumed.
    pub fn decode_command(
        &self,
        buf: &mut BytesMut,
    ) -> Result<Option<Result<Command, ProtocolError>>, ProtocolError> {
        Ok(self.decode(buf)?.map(|line| Command::parse(&line)))
    }

    /// Decode the next line as a server reply
    pub fn decode_reply(&self, buf: &mut BytesMut) -> Result<Option<Reply>, ProtocolError> {
        match self.decode(buf)? {
            Some(line) => Reply::parse(&line).map(Some),
            None => Ok(None),
        }
    }
}

/// Line length without a trailing `\r`
fn content_len(line: &[u8]) -> usize {
    match line.last() {
        Some(b'\r') => line.len() - 1,
        _ => line.len(),
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}
