//! Response Types
//!
//! Every reply is a single line of text followed by `\n`. There is no type
//! prefix: an error is sent as its bare message, and a missing key is sent
//! as the `(nil)` sentinel. Clients tell them apart from what they asked.
//!
//! ## Examples
//!
//! Line: `PONG\n`
//! Nil: `(nil)\n`
//! Error: `unknown command: FOO\n`

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Sentinel written for a key that is absent or expired.
pub const NIL: &str = "(nil)";

/// The line terminator for every response.
pub const LF: u8 = b'\n';

/// A reply to one command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// A line of text (may be empty)
    Line(Bytes),

    /// The not-found sentinel
    Nil,

    /// A recoverable command error, sent as its message
    Error(String),
}

impl Response {
    /// Creates a line response.
    ///
    /// # Example
    /// ```
    /// use linekv::protocol::Response;
    /// assert_eq!(&Response::line("PONG").serialize()[..], b"PONG\n");
    /// ```
    pub fn line(s: impl Into<Bytes>) -> Self {
        Response::Line(s.into())
    }

    /// Creates an error response.
    pub fn error(msg: impl Into<String>) -> Self {
        Response::Error(msg.into())
    }

    /// Creates the nil response.
    pub fn nil() -> Self {
        Response::Nil
    }

    /// Creates an OK response.
    pub fn ok() -> Self {
        Response::line("OK")
    }

    /// Creates a PONG response.
    pub fn pong() -> Self {
        Response::line("PONG")
    }

    /// Returns true for error responses.
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    /// Serializes this response to wire format.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.serialized_len());
        self.serialize_into(&mut buf);
        buf.freeze()
    }

    /// Appends the wire format of this response to `buf`.
    pub fn serialize_into(&self, buf: &mut BytesMut) {
        match self {
            Response::Line(b) => buf.put_slice(b),
            Response::Nil => buf.put_slice(NIL.as_bytes()),
            Response::Error(msg) => buf.put_slice(msg.as_bytes()),
        }
        buf.put_u8(LF);
    }

    fn serialized_len(&self) -> usize {
        let body = match self {
            Response::Line(b) => b.len(),
            Response::Nil => NIL.len(),
            Response::Error(msg) => msg.len(),
        };
        body + 1
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Line(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Response::Nil => write!(f, "{}", NIL),
            Response::Error(msg) => write!(f, "(error) {}", msg),
        }
    }
}
