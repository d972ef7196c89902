//! Zero-Copy Line Parser
//!
//! Incoming bytes are accumulated in a `BytesMut`. Whenever the buffer holds
//! a full line, the line is split off, frozen into `Bytes`, and cut into
//! whitespace-separated tokens with `Bytes::slice`, so no token is copied.
//!
//! The parser returns either:
//! - `Ok(Some(tokens))` - a full line was consumed (tokens may be empty for a blank line)
//! - `Ok(None)` - no newline yet, read more data
//! - `Err(ParseError)` - the peer sent something we refuse to buffer

use bytes::{Bytes, BytesMut};
use thiserror::Error;

/// Errors that can occur while framing input.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// A line grew past the limit without a terminating newline
    #[error("line too long: {size} bytes (max: {max})")]
    LineTooLong { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Longest line accepted before the session is dropped (64 KB)
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Splits newline-terminated commands out of a read buffer.
///
/// # Example
///
/// ```
/// use linekv::protocol::LineParser;
/// use bytes::{Bytes, BytesMut};
///
/// let parser = LineParser::new();
/// let mut buffer = BytesMut::from(&b"GET name\r\nPI"[..]);
///
/// let tokens = parser.next_line(&mut buffer).unwrap().unwrap();
/// assert_eq!(tokens, vec![Bytes::from("GET"), Bytes::from("name")]);
///
/// // "PI" is not a full line yet
/// assert_eq!(parser.next_line(&mut buffer).unwrap(), None);
/// assert_eq!(&buffer[..], b"PI");
/// ```
#[derive(Debug, Clone)]
pub struct LineParser {
    max_line_length: usize,
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LineParser {
    /// Creates a parser with the default line limit.
    pub fn new() -> Self {
        Self::with_max_line_length(MAX_LINE_LENGTH)
    }

    /// Creates a parser with a custom line limit.
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self { max_line_length }
    }

    /// Removes the next complete line from `buf` and tokenizes it.
    ///
    /// The `\n` terminator and an optional `\r` before it are dropped.
    /// Leaves `buf` untouched when it holds no complete line.
    pub fn next_line(&self, buf: &mut BytesMut) -> ParseResult<Option<Vec<Bytes>>> {
        let Some(pos) = buf.iter().position(|&b| b == b'\n') else {
            if buf.len() > self.max_line_length {
                return Err(ParseError::LineTooLong {
                    size: buf.len(),
                    max: self.max_line_length,
                });
            }
            return Ok(None);
        };

        if pos > self.max_line_length {
            return Err(ParseError::LineTooLong {
                size: pos,
                max: self.max_line_length,
            });
        }

        let line = buf.split_to(pos + 1).freeze();
        let mut end = pos;
        if end > 0 && line[end - 1] == b'\r' {
            end -= 1;
        }

        Ok(Some(tokenize(&line.slice(..end))))
    }
}

/// ASCII whitespace, vertical tab included.
#[inline]
fn is_separator(b: u8) -> bool {
    b.is_ascii_whitespace() || b == b'\x0b'
}

/// Splits a line into whitespace-separated tokens.
///
/// Runs of whitespace count as one separator; leading and trailing
/// whitespace produce no empty tokens.
pub fn tokenize(line: &Bytes) -> Vec<Bytes> {
    let mut tokens = Vec::new();
    let mut start = None;

    for (i, &b) in line.iter().enumerate() {
        match (is_separator(b), start) {
            (true, Some(s)) => {
                tokens.push(line.slice(s..i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }

    if let Some(s) = start {
        tokens.push(line.slice(s..));
    }

    tokens
}
