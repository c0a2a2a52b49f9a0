//! Storage Engine Module
//!
//! This module provides the in-memory store for snapkv: a single
//! reader/writer-locked map with TTL support and a background task that
//! removes keys whose TTL has passed.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              StorageEngine                  │
//! │   RwLock<HashMap<Bytes, Entry>>             │
//! │   Entry { value, expires_at, generation }   │
//! └──────────────┬──────────────────────────────┘
//!                │ Deadline { at, generation, key }
//!                ▼
//!  ┌───────────────────────────┐
//!  │     ExpirySweeper         │
//!  │  (Background Tokio Task)  │
//!  └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use snapkv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new();
//!
//! engine.set(Bytes::from("name"), Bytes::from("snap"));
//! assert_eq!(engine.get(&Bytes::from("name")), Some(Bytes::from("snap")));
//!
//! engine.set_with_ttl(
//!     Bytes::from("session"),
//!     Bytes::from("token123"),
//!     Duration::from_secs(3600),
//! );
//! assert_eq!(engine.len(), 2);
//! ```

pub mod engine;
pub mod expiry;

pub use engine::{Entry, StorageEngine};
pub use expiry::{start_expiry_sweeper, Deadline, ExpirySweeper};
