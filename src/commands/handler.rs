//! Command Handler Module
//!
//! Takes one tokenized line, validates it, runs it against the storage
//! engine, and produces the reply.
//!
//! ## Supported Commands
//!
//! - `PING` - Test connection
//! - `ECHO [word ...]` - Echo the words back, joined by single spaces
//! - `SET key value [EX seconds | PX milliseconds]` - Set a key
//! - `GET key` - Get a key's value, or `(nil)`
//!
//! Command names and the `EX`/`PX` flags are case-insensitive.
//!
//! ## Errors
//!
//! Validation happens here, never in the storage engine. A failed command
//! becomes one line of error text; the session carries on.

use crate::protocol::Response;
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// A command that was rejected before touching the store.
///
/// The `Display` text is exactly what the client receives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Blank input line
    #[error("Usage: command \"argument\"")]
    Empty,

    /// Command name not recognised
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// SET without both a key and a value
    #[error("SET requires at least a 'key' and a 'value'")]
    SetMissingArgs,

    /// SET expiry clause with the wrong number of tokens
    #[error("requires a second expiry parameter")]
    ExpiryArity,

    /// SET expiry clause with a flag other than EX/PX
    #[error("invalid argument for 'SET'")]
    InvalidSetOption,

    /// EX duration not a non-negative integer
    #[error("invalid seconds value for 'EX'")]
    InvalidSeconds,

    /// PX duration not a non-negative integer
    #[error("invalid milliseconds value for 'PX'")]
    InvalidMillis,

    /// Duration too large to be represented as an instant
    #[error("invalid expire time in 'SET'")]
    ExpiryOverflow,

    /// GET without a key
    #[error("GET requires a 'key' parameter")]
    GetMissingKey,
}

/// Handles commands by dispatching them to the appropriate handlers.
#[derive(Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Executes a tokenized command line and returns the response.
    ///
    /// Errors are folded into [`Response::Error`].
    pub fn execute(&self, args: &[Bytes]) -> Response {
        self.try_execute(args)
            .unwrap_or_else(|e| Response::error(e.to_string()))
    }

    /// Executes a tokenized command line.
    ///
    /// The first token is the command name, the rest are its arguments.
    pub fn try_execute(&self, args: &[Bytes]) -> Result<Response, CommandError> {
        let (name, rest) = args.split_first().ok_or(CommandError::Empty)?;
        let cmd = String::from_utf8_lossy(name).to_uppercase();

        match cmd.as_str() {
            "PING" => Ok(Response::pong()),
            "ECHO" => Ok(self.cmd_echo(rest)),
            "SET" => self.cmd_set(rest),
            "GET" => self.cmd_get(rest),
            _ => Err(CommandError::UnknownCommand(
                String::from_utf8_lossy(name).into_owned(),
            )),
        }
    }

    /// ECHO [word ...]
    fn cmd_echo(&self, args: &[Bytes]) -> Response {
        Response::line(args.join(&b' '))
    }

    /// SET key value [EX seconds | PX milliseconds]
    fn cmd_set(&self, args: &[Bytes]) -> Result<Response, CommandError> {
        let [key, value, options @ ..] = args else {
            return Err(CommandError::SetMissingArgs);
        };

        let expires_at = match parse_expiry(options)? {
            Some(ttl) => Some(expiry_instant(Instant::now(), ttl)?),
            None => None,
        };

        self.storage.set(key.clone(), value.clone(), expires_at);
        Ok(Response::ok())
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> Result<Response, CommandError> {
        let key = args.first().ok_or(CommandError::GetMissingKey)?;

        Ok(match self.storage.get(key) {
            Some(value) => Response::Line(value),
            None => Response::nil(),
        })
    }
}

/// Parses the optional `EX seconds` / `PX milliseconds` clause of SET.
///
/// The clause is all-or-nothing: no tokens means no TTL, exactly two tokens
/// must be a known flag and a non-negative integer, anything else is an error.
pub fn parse_expiry(options: &[Bytes]) -> Result<Option<Duration>, CommandError> {
    let (flag, amount) = match options {
        [] => return Ok(None),
        [flag, amount] => (flag, amount),
        _ => return Err(CommandError::ExpiryArity),
    };

    let parse = |err: CommandError| {
        std::str::from_utf8(amount)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or(err)
    };

    let ttl = match String::from_utf8_lossy(flag).to_uppercase().as_str() {
        "EX" => Duration::from_secs(parse(CommandError::InvalidSeconds)?),
        "PX" => Duration::from_millis(parse(CommandError::InvalidMillis)?),
        _ => return Err(CommandError::InvalidSetOption),
    };

    Ok(Some(ttl))
}

/// Turns a TTL into the absolute instant stored alongside the value.
///
/// A zero TTL is stored just before `now`, so even a read at the same
/// instant sees it expired under the strict `now > expires_at` check.
pub fn expiry_instant(now: Instant, ttl: Duration) -> Result<Instant, CommandError> {
    if ttl.is_zero() {
        return Ok(now.checked_sub(Duration::from_nanos(1)).unwrap_or(now));
    }
    now.checked_add(ttl).ok_or(CommandError::ExpiryOverflow)
}
