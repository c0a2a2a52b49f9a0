//! # snapkv - A Small In-Memory Key-Value Server with RDB Snapshots
//!
//! snapkv speaks a subset of the Redis wire protocol (RESP), keeps its data
//! in memory with optional per-key expiry, and can write its contents to
//! (and restore them from) a file in the RDB snapshot format.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                              snapkv                              │
//! │                                                                  │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐           │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │           │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │           │
//! │  └─────────────┘    └──────┬──────┘    └──┬───────┬──┘           │
//! │                            │              │       │ SAVE         │
//! │                            ▼              ▼       ▼              │
//! │                     ┌─────────────┐ ┌─────────┐ ┌──────────┐     │
//! │                     │CommandReader│ │ Storage │ │ Snapshot │     │
//! │                     │  (framer)   │ │ Engine  │ │  codec   │     │
//! │                     └─────────────┘ └────▲────┘ └──────────┘     │
//! │                                          │                       │
//! │                               ┌──────────┴──────────┐            │
//! │                               │    ExpirySweeper    │            │
//! │                               │ (Background Task)   │            │
//! │                               └─────────────────────┘            │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use snapkv::{handle_connection, load_snapshot, start_expiry_sweeper};
//! use snapkv::{CommandHandler, Config, ConnectionStats, StorageEngine};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(Config::default());
//!     let storage = Arc::new(StorageEngine::new());
//!     load_snapshot(&storage, &config.snapshot_path());
//!
//!     let _sweeper = start_expiry_sweeper(Arc::clone(&storage));
//!     let stats = Arc::new(ConnectionStats::new());
//!     let listener = TcpListener::bind(config.bind_address()).await?;
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await?;
//!         let handler = CommandHandler::new(Arc::clone(&storage), Arc::clone(&config));
//!         tokio::spawn(handle_connection(stream, addr, handler, Arc::clone(&stats)));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`
//! - `ECHO message`
//! - `SET key value [PX milliseconds]`
//! - `GET key`
//! - `CONFIG GET dir|dbfilename`
//! - `KEYS *`
//! - `SAVE`
//!
//! ## Module Overview
//!
//! - [`protocol`]: command framer and reply types
//! - [`storage`]: the locked map with lazy and active expiry
//! - [`snapshot`]: RDB encoder/decoder with CRC-64 trailer
//! - [`commands`]: command dispatch
//! - [`connection`]: per-client read/dispatch/write loop
//! - [`config`]: command-line flags
//!
//! ## Design Highlights
//!
//! ### Lazy + Active Expiry
//!
//! Keys with a TTL are expired in two ways:
//! 1. **Lazy**: `get` purges an entry whose deadline has passed
//! 2. **Active**: a background task sleeps until the next deadline and
//!    removes the key, unless a later write replaced it
//!
//! ### Snapshots
//!
//! `SAVE` writes the whole store to `<dir>/<dbfilename>`; the file is read
//! back at startup. A missing or damaged file never stops the server.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod snapshot;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{Command, CommandReader, ParseError, RespValue};
pub use snapshot::{load_snapshot, save_snapshot, SnapshotError};
pub use storage::{start_expiry_sweeper, ExpirySweeper, StorageEngine};

/// The default port snapkv listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host snapkv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of snapkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
