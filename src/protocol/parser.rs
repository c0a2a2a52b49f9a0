//! Line-Oriented Command Framer
//!
//! This module turns a buffered byte stream into discrete [`Command`]s.
//!
//! ## Accepted Encodings
//!
//! 1. **Array encoding**, as sent by `redis-cli` and client libraries:
//!
//!    ```text
//!    *2\r\n
//!    $3\r\n
//!    GET\r\n
//!    $3\r\n
//!    foo\r\n
//!    ```
//!
//!    The `$<len>` line before each payload is read and skipped. The payload
//!    is whatever the next line holds, trimmed of surrounding whitespace, so
//!    the declared length is never checked against it.
//!
//! 2. **Plain text**, as typed into `nc` or `telnet`: any line that does not
//!    start with `*` is split on whitespace.
//!
//! ## Results
//!
//! [`CommandReader::read_command`] returns:
//! - `Ok(Some(command))` - one command was decoded
//! - `Ok(None)` - the stream ended (possibly in the middle of a command)
//! - `Err(ParseError)` - malformed framing; the caller should drop the peer

use crate::protocol::types::{prefix, Command};
use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use thiserror::Error;

/// Errors that can occur while framing a command.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The count after `*` is not a non-negative integer
    #[error("invalid array length: {0:?}")]
    InvalidArrayLength(String),

    /// The underlying stream failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for framing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Upper bound on the up-front allocation for one command's elements.
/// Larger arrays still decode, they just grow as they go.
const MAX_PREALLOCATED_ELEMENTS: usize = 1024;

/// Decodes commands from a buffered async reader.
///
/// Payloads are kept as raw bytes; nothing here requires UTF-8.
///
/// # Example
///
/// ```
/// # tokio_test::block_on(async {
/// use snapkv::protocol::CommandReader;
///
/// let input: &[u8] = b"*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\nPING\r\n";
/// let mut reader = CommandReader::new(input);
///
/// let echo = reader.read_command().await.unwrap().unwrap();
/// assert_eq!(echo.parts(), &["ECHO", "hi"]);
///
/// let ping = reader.read_command().await.unwrap().unwrap();
/// assert_eq!(ping.name().as_deref(), Some("PING"));
///
/// assert!(reader.read_command().await.unwrap().is_none());
/// # });
/// ```
#[derive(Debug)]
pub struct CommandReader<R> {
    reader: R,
    /// Scratch buffer reused for every line
    line: Vec<u8>,
}

impl<R> CommandReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::with_capacity(256),
        }
    }

    /// Reads the next command from the stream.
    pub async fn read_command(&mut self) -> ParseResult<Option<Command>> {
        if !self.fill_line().await? {
            return Ok(None);
        }

        let line = self.line.trim_ascii();
        let count = match line.strip_prefix(&[prefix::ARRAY]) {
            Some(count) => count,
            None => {
                let parts = line
                    .split(u8::is_ascii_whitespace)
                    .filter(|token| !token.is_empty())
                    .map(Bytes::copy_from_slice)
                    .collect();
                return Ok(Some(Command::new(parts)));
            }
        };

        let count: usize = std::str::from_utf8(count)
            .ok()
            .and_then(|count| count.parse().ok())
            .ok_or_else(|| {
                ParseError::InvalidArrayLength(String::from_utf8_lossy(count).into_owned())
            })?;

        let mut parts = Vec::with_capacity(count.min(MAX_PREALLOCATED_ELEMENTS));
        for _ in 0..count {
            // The `$<len>` line
            if !self.fill_line().await? {
                return Ok(None);
            }
            if !self.fill_line().await? {
                return Ok(None);
            }
            parts.push(Bytes::copy_from_slice(self.line.trim_ascii()));
        }

        Ok(Some(Command::new(parts)))
    }

    /// Reads one newline-terminated line into the scratch buffer.
    ///
    /// Returns `false` at end of stream, including a trailing fragment
    /// without a newline.
    async fn fill_line(&mut self) -> ParseResult<bool> {
        self.line.clear();
        let n = self.reader.read_until(b'\n', &mut self.line).await?;
        Ok(n > 0 && self.line.last() == Some(&b'\n'))
    }
}
