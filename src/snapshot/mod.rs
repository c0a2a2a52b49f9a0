//! RDB Snapshot Persistence
//!
//! Serializes the store to a single binary file in the RDB layout and reads
//! such a file back at startup.
//!
//! ## File Layout
//!
//! ```text
//! ┌───────────┬──────────────────────┬─────────┬──────────────┬───────────────────┬──────┬──────────┐
//! │ REDIS0011 │ FA <key> <value> ... │ FE <db> │ FB <n> <exp> │ 00 <key> <value>… │  FF  │ CRC-64 LE│
//! │  9 bytes  │   metadata records   │ select  │  size hints  │   string records  │ EOF  │ 8 bytes  │
//! └───────────┴──────────────────────┴─────────┴──────────────┴───────────────────┴──────┴──────────┘
//! ```
//!
//! Strings and counts are prefixed with the RDB size encoding (see
//! [`encoding`]). The trailing checksum covers every byte before it.
//!
//! ## Modules
//!
//! - `encoding`: buffered reader/writer with size encoding and checksumming
//! - `rdb`: whole-file save and load against a [`StorageEngine`](crate::storage::StorageEngine)

pub mod encoding;
pub mod rdb;

use std::path::PathBuf;
use thiserror::Error;

pub use encoding::{checksum, SnapshotReader, SnapshotWriter};
pub use rdb::{load_snapshot, read_snapshot, save_snapshot, write_snapshot, MAGIC};

/// Record markers understood by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Marker {
    /// A string key followed by a string value
    StringValue = 0x00,
    Auxiliary = 0xFA,
    ResizeDatabase = 0xFB,
    ExpireTimeMillis = 0xFC,
    ExpireTimeSecs = 0xFD,
    SelectDatabase = 0xFE,
    EndOfFile = 0xFF,
}

impl TryFrom<u8> for Marker {
    type Error = SnapshotError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Marker::StringValue),
            0xFA => Ok(Marker::Auxiliary),
            0xFB => Ok(Marker::ResizeDatabase),
            0xFC => Ok(Marker::ExpireTimeMillis),
            0xFD => Ok(Marker::ExpireTimeSecs),
            0xFE => Ok(Marker::SelectDatabase),
            0xFF => Ok(Marker::EndOfFile),
            other => Err(SnapshotError::UnknownMarker(other)),
        }
    }
}

/// Errors raised while saving or loading a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to create snapshot file {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file does not start with `REDIS0011`
    #[error("invalid snapshot header")]
    InvalidHeader,

    #[error("invalid size encoding byte {0:#04x}")]
    InvalidSizeEncoding(u8),

    /// A special string encoding this codec does not read (e.g. LZF)
    #[error("unsupported string encoding {0:#04x}")]
    UnsupportedEncoding(u8),

    #[error("unknown record marker {0:#04x}")]
    UnknownMarker(u8),

    /// A length that does not fit the 32-bit size encoding
    #[error("length {0} is too large to encode")]
    TooLarge(usize),
}
