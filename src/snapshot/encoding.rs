//! Size Encoding and Buffered Snapshot I/O
//!
//! Both directions of the codec go through the types in this module:
//! [`SnapshotWriter`] checksums every byte it writes, [`SnapshotReader`]
//! wraps the file in a `BufReader` so the byte-at-a-time marker scan does
//! not hit the file system for every byte.
//!
//! ## Size Encoding
//!
//! The two most significant bits of the first byte pick the form:
//!
//! | First byte   | Total bytes | Value                                   |
//! |--------------|-------------|-----------------------------------------|
//! | `00xxxxxx`   | 1           | the 6 low bits (0..=63)                 |
//! | `01xxxxxx`   | 2           | 14 bits, big-endian (64..=16383)        |
//! | `0x80`       | 5           | next 4 bytes, big-endian                |
//! | `0x81`       | 9           | next 8 bytes, big-endian (read only)    |
//! | `11xxxxxx`   | 1+          | special string encoding (read only)     |
//!
//! Special string encodings `0xC0`, `0xC1` and `0xC2` hold an 8, 16 or 32
//! bit little-endian integer that stands for its decimal text.

use crate::snapshot::SnapshotError;
use bytes::Bytes;
use crc::{Crc, Digest, CRC_64_GO_ISO};
use std::io::{self, BufReader, BufWriter, Read, Write};

/// CRC-64 with the ISO polynomial, reflected, as used by Go's `hash/crc64`.
static CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

const SIZE_6BIT_MAX: usize = 0x3F;
const SIZE_14BIT_MAX: usize = 0x3FFF;
const SIZE_14BIT_TAG: u8 = 0x40;
const SIZE_32BIT_TAG: u8 = 0x80;
const SIZE_64BIT_TAG: u8 = 0x81;

const INT8_ENCODING: u8 = 0xC0;
const INT16_ENCODING: u8 = 0xC1;
const INT32_ENCODING: u8 = 0xC2;

/// Checksum of `data` as written in the snapshot trailer.
pub fn checksum(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

/// Buffered writer that keeps a running CRC-64 of everything written.
pub struct SnapshotWriter<W: Write> {
    inner: BufWriter<W>,
    digest: Digest<'static, u64>,
}

impl<W: Write> SnapshotWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: BufWriter::new(inner),
            digest: CRC64.digest(),
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.digest.update(bytes);
        self.inner.write_all(bytes)
    }

    pub fn write_u8(&mut self, byte: u8) -> io::Result<()> {
        self.write_bytes(&[byte])
    }

    /// Writes `size` in the shortest size-encoding form.
    pub fn write_size(&mut self, size: usize) -> Result<(), SnapshotError> {
        if size <= SIZE_6BIT_MAX {
            self.write_u8(size as u8)?;
        } else if size <= SIZE_14BIT_MAX {
            self.write_bytes(&[SIZE_14BIT_TAG | (size >> 8) as u8, (size & 0xFF) as u8])?;
        } else {
            let size32 = u32::try_from(size).map_err(|_| SnapshotError::TooLarge(size))?;
            self.write_u8(SIZE_32BIT_TAG)?;
            self.write_bytes(&size32.to_be_bytes())?;
        }
        Ok(())
    }

    /// Writes a size-prefixed string.
    pub fn write_string(&mut self, data: &[u8]) -> Result<(), SnapshotError> {
        self.write_size(data.len())?;
        self.write_bytes(data)?;
        Ok(())
    }

    /// Appends the little-endian checksum, flushes, and returns the inner writer.
    pub fn finish(mut self) -> Result<W, SnapshotError> {
        let crc = self.digest.finalize();
        self.inner.write_all(&crc.to_le_bytes())?;
        self.inner
            .into_inner()
            .map_err(|e| SnapshotError::Io(e.into_error()))
    }
}

/// What a size-encoded prefix announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    /// A plain length or count
    Size(usize),
    /// A `11xxxxxx` special string encoding; holds the full first byte
    Special(u8),
}

/// Buffered reader for the snapshot load path.
pub struct SnapshotReader<R: Read> {
    inner: BufReader<R>,
}

impl<R: Read> SnapshotReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
        }
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        let [byte] = self.read_array::<1>()?;
        Ok(byte)
    }

    pub fn read_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads exactly `len` bytes.
    ///
    /// The buffer grows as data arrives, so a corrupt length cannot force a
    /// huge allocation up front.
    pub fn read_bytes(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        (&mut self.inner).take(len as u64).read_to_end(&mut buf)?;
        if buf.len() != len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {} bytes, found {}", len, buf.len()),
            ));
        }
        Ok(buf)
    }

    pub fn skip(&mut self, len: usize) -> io::Result<()> {
        let copied = io::copy(&mut (&mut self.inner).take(len as u64), &mut io::sink())?;
        if copied != len as u64 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(())
    }

    /// Reads a size-encoded prefix.
    pub fn read_length(&mut self) -> Result<Length, SnapshotError> {
        let first = self.read_u8()?;
        match first >> 6 {
            0b00 => Ok(Length::Size((first & 0x3F) as usize)),
            0b01 => {
                let next = self.read_u8()?;
                Ok(Length::Size((((first & 0x3F) as usize) << 8) | next as usize))
            }
            0b10 => match first {
                SIZE_32BIT_TAG => Ok(Length::Size(u32::from_be_bytes(self.read_array()?) as usize)),
                SIZE_64BIT_TAG => {
                    let size = u64::from_be_bytes(self.read_array()?);
                    usize::try_from(size)
                        .map(Length::Size)
                        .map_err(|_| SnapshotError::InvalidSizeEncoding(first))
                }
                _ => Err(SnapshotError::InvalidSizeEncoding(first)),
            },
            _ => Ok(Length::Special(first)),
        }
    }

    /// Reads a size-encoded count. Special encodings are an error here.
    pub fn read_size(&mut self) -> Result<usize, SnapshotError> {
        match self.read_length()? {
            Length::Size(size) => Ok(size),
            Length::Special(byte) => Err(SnapshotError::InvalidSizeEncoding(byte)),
        }
    }

    /// Reads a size-prefixed or integer-encoded string.
    pub fn read_string(&mut self) -> Result<Bytes, SnapshotError> {
        match self.read_length()? {
            Length::Size(len) => Ok(Bytes::from(self.read_bytes(len)?)),
            Length::Special(INT8_ENCODING) => {
                let n = i8::from_le_bytes(self.read_array()?);
                Ok(Bytes::from(n.to_string()))
            }
            Length::Special(INT16_ENCODING) => {
                let n = i16::from_le_bytes(self.read_array()?);
                Ok(Bytes::from(n.to_string()))
            }
            Length::Special(INT32_ENCODING) => {
                let n = i32::from_le_bytes(self.read_array()?);
                Ok(Bytes::from(n.to_string()))
            }
            Length::Special(other) => Err(SnapshotError::UnsupportedEncoding(other)),
        }
    }
}
