//! Line Protocol Implementation
//!
//! linekv speaks plain text: one command per newline-terminated line, tokens
//! separated by whitespace, and one newline-terminated line back.
//!
//! ## Modules
//!
//! - `parser`: Splits buffered input into lines and tokens
//! - `types`: Defines the `Response` enum and its serialization
//!
//! ## Example
//!
//! ```
//! use linekv::protocol::{LineParser, Response};
//! use bytes::BytesMut;
//!
//! let mut buffer = BytesMut::from(&b"SET name Ariz\n"[..]);
//! let tokens = LineParser::new().next_line(&mut buffer).unwrap().unwrap();
//! assert_eq!(tokens.len(), 3);
//!
//! let bytes = Response::line("OK").serialize();
//! assert_eq!(&bytes[..], b"OK\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{tokenize, LineParser, ParseError, ParseResult, MAX_LINE_LENGTH};
pub use types::{Response, NIL};
