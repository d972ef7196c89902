//! Storage Engine Module
//!
//! This module holds the in-memory key-value store and the background task
//! that reclaims expired entries.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               StorageEngine                 │
//! │   Mutex< HashMap<key, Entry{value, exp}> >  │
//! └─────────────────────────────────────────────┘
//!           ▲                       ▲
//!           │ set / get             │ cleanup_expired
//!    ┌──────┴───────┐     ┌─────────┴─────────┐
//!    │   Sessions   │     │   ExpirySweeper   │
//!    │ (one / conn) │     │  (every 10s)      │
//!    └──────────────┘     └───────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use linekv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new();
//!
//! engine.set(Bytes::from("name"), Bytes::from("Ariz"), None);
//! assert_eq!(engine.get(&Bytes::from("name")), Some(Bytes::from("Ariz")));
//!
//! engine.set_with_ttl(
//!     Bytes::from("session"),
//!     Bytes::from("token123"),
//!     Duration::from_secs(3600)
//! );
//! ```

pub mod engine;
pub mod expiry;

pub use engine::{Entry, StorageEngine, StorageStats};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, DEFAULT_SWEEP_INTERVAL};
