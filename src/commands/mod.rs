//! Command Handler Module
//!
//! This module implements the command processing layer for snapkv.
//! It receives decoded commands, executes them against the storage engine,
//! and returns the replies.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ CommandReader   │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Validate     │
//! │  - Execute      │
//! └───┬─────────┬───┘
//!     │         │ SAVE
//!     ▼         ▼
//! ┌────────┐ ┌──────────┐
//! │Storage │ │ Snapshot │
//! └────────┘ └──────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`, `ECHO`
//! - `SET` (with optional `PX`), `GET`
//! - `CONFIG GET`, `KEYS *`, `SAVE`

pub mod handler;

// Re-export the main command handler
pub use handler::CommandHandler;
