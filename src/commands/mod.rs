//! Command Handler Module
//!
//! This module is the command interpreter sitting between a session and the
//! storage engine.
//!
//! ```text
//! Client line
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  LineParser     │  (protocol module)
//! └────────┬────────┘
//!          │ tokens
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │  - Dispatch     │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │ set / get
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```
//!
//! Supported commands: `PING`, `ECHO`, `SET`, `GET`.

pub mod handler;

pub use handler::{expiry_instant, parse_expiry, CommandError, CommandHandler};
