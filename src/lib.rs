//! # linekv - A Small In-Memory Key-Value Server
//!
//! linekv keeps string values in memory and serves them over a plain-text,
//! line-oriented TCP protocol, loosely modeled on Redis. Values can carry a
//! TTL after which they read as absent.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              linekv                                 │
//! │                                                                     │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐              │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │              │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │              │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘              │
//! │                            │                  │                     │
//! │                     ┌──────┴──────┐           ▼                     │
//! │                     │ LineParser  │    ┌──────────────────────────┐ │
//! │                     └─────────────┘    │      StorageEngine       │ │
//! │                                        │  Mutex<HashMap<_,Entry>> │ │
//! │                                        └──────────────────────────┘ │
//! │                                                   ▲                 │
//! │                                   ┌───────────────┴───────────────┐ │
//! │                                   │        ExpirySweeper          │ │
//! │                                   │   (Background Tokio Task)     │ │
//! │                                   └───────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use linekv::storage::{StorageEngine, start_expiry_sweeper};
//! use linekv::commands::CommandHandler;
//! use linekv::connection::{handle_connection, ConnectionStats};
//! use bytes::Bytes;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let storage = Arc::new(StorageEngine::new());
//!     let _sweeper = start_expiry_sweeper(Arc::clone(&storage));
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind("127.0.0.1:6379").await.unwrap();
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         let handler = CommandHandler::new(Arc::clone(&storage));
//!         let stats = Arc::clone(&stats);
//!
//!         tokio::spawn(handle_connection(stream, addr, handler, stats, Bytes::from("linekv> ")));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`
//! - `ECHO [word ...]`
//! - `SET key value [EX seconds | PX milliseconds]`
//! - `GET key`
//!
//! ## Lazy + Periodic Expiry
//!
//! Keys with a TTL are expired in two ways:
//! 1. **Lazy**: `GET` checks the expiry and deletes the key if it has passed
//! 2. **Periodic**: A background task sweeps every expired key every 10 seconds
//!
//! A key reads as absent the moment its expiry passes, even if the sweep
//! has not freed it yet.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod storage;

pub use commands::{CommandError, CommandHandler};
pub use config::{CliAction, Config, ConfigError};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{LineParser, ParseError, Response};
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port linekv listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host linekv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// The prompt written before each command is read
pub const DEFAULT_PROMPT: &str = "linekv> ";

/// Version of linekv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
