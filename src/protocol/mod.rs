//! RESP Protocol Implementation
//!
//! The subset of the Redis Serialization Protocol that snapkv speaks.
//!
//! ## Modules
//!
//! - `parser`: frames incoming bytes into [`Command`]s (array encoding or
//!   plain whitespace-separated text)
//! - `types`: the [`Command`] type and the [`RespValue`] reply grammar
//!
//! ## Example
//!
//! ```
//! use snapkv::protocol::RespValue;
//! use bytes::Bytes;
//!
//! let reply = RespValue::bulk_string(Bytes::from("bar"));
//! assert_eq!(reply.serialize(), b"$3\r\nbar\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{CommandReader, ParseError, ParseResult};
pub use types::{Command, RespValue};
