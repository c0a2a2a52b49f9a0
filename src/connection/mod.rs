//! Connection Handler Module
//!
//! Each accepted client is served by its own async task that frames
//! commands off the socket, dispatches them and writes the replies back.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │        TCP Listener          │
//! │         (main.rs)            │
//! └──────────────┬───────────────┘
//!                │ accept() + spawn
//!                ▼
//! ┌──────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                    │
//! │                                                      │
//! │  CommandReader ──> CommandHandler ──> BufWriter      │
//! │   (read half)        (dispatch)       (write half)   │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Pipelining**: several commands in one TCP packet are answered in order
//! - **Plain text**: `PING\r\n` typed into a raw socket works too
//! - **Statistics**: connection and command counters in [`ConnectionStats`]
//!
//! ## Example
//!
//! ```ignore
//! use snapkv::connection::{handle_connection, ConnectionStats};
//! use snapkv::commands::CommandHandler;
//! use snapkv::storage::StorageEngine;
//! use snapkv::Config;
//! use std::sync::Arc;
//!
//! let storage = Arc::new(StorageEngine::new());
//! let config = Arc::new(Config::default());
//! let stats = Arc::new(ConnectionStats::new());
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! let handler = CommandHandler::new(Arc::clone(&storage), Arc::clone(&config));
//! tokio::spawn(handle_connection(stream, addr, handler, Arc::clone(&stats)));
//! ```

pub mod handler;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
