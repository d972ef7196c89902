//! Connection Handler Module
//!
//! This module manages individual client sessions. Every accepted
//! connection runs in its own Tokio task and shares the storage engine
//! with all other sessions through its `CommandHandler`.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (main.rs)                                │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ accept() + spawn
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌────────┐   ┌───────────┐   ┌───────────┐   ┌─────────┐  │
//! │  │ prompt │──>│ read line │──>│ execute   │──>│ respond │  │
//! │  └────────┘   └───────────┘   └───────────┘   └─────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use linekv::connection::{handle_connection, ConnectionStats};
//! use linekv::commands::CommandHandler;
//! use linekv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! let storage = Arc::new(StorageEngine::new());
//! let stats = Arc::new(ConnectionStats::new());
//! let handler = CommandHandler::new(storage);
//!
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, handler, stats, Bytes::from("linekv> ")));
//! ```

pub mod handler;

pub use handler::{
    handle_connection, ConnectionError, ConnectionHandler, ConnectionStats,
    ConnectionStatsSnapshot,
};
