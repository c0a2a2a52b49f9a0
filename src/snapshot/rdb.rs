//! Whole-File Snapshot Save and Load
//!
//! [`save_snapshot`] serves the `SAVE` command; [`load_snapshot`] runs once
//! at startup. Loading never fails from the caller's point of view: a
//! missing or invalid file means an empty store, and a file that breaks off
//! mid-way keeps whatever was read before the break.

use crate::snapshot::encoding::{SnapshotReader, SnapshotWriter};
use crate::snapshot::{Marker, SnapshotError};
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Magic string plus format version.
pub const MAGIC: &[u8; 9] = b"REDIS0011";

/// Metadata record written into every snapshot.
const AUX_VERSION_KEY: &[u8] = b"redis-ver";
const AUX_VERSION_VALUE: &[u8] = b"6.0.16";

/// Bytes of the timestamp after an expiry marker.
const EXPIRY_TIMESTAMP_LEN: usize = 8;

/// Encodes `entries` as a complete snapshot into `out`.
///
/// Returns `out` after the trailing checksum has been written and flushed.
pub fn write_snapshot<W: Write>(entries: &[(Bytes, Bytes)], out: W) -> Result<W, SnapshotError> {
    let mut writer = SnapshotWriter::new(out);

    writer.write_bytes(MAGIC)?;

    writer.write_u8(Marker::Auxiliary as u8)?;
    writer.write_string(AUX_VERSION_KEY)?;
    writer.write_string(AUX_VERSION_VALUE)?;

    writer.write_u8(Marker::SelectDatabase as u8)?;
    writer.write_size(0)?;

    // Hash table size, then expires table size
    writer.write_u8(Marker::ResizeDatabase as u8)?;
    writer.write_size(entries.len())?;
    writer.write_size(0)?;

    for (key, value) in entries {
        writer.write_u8(Marker::StringValue as u8)?;
        writer.write_string(key)?;
        writer.write_string(value)?;
    }

    writer.write_u8(Marker::EndOfFile as u8)?;
    writer.finish()
}

/// Writes the engine's current contents to `path`.
///
/// The entries are copied out first, so the store lock is not held during
/// file I/O. Each call writes its own uniquely named temp file next to
/// `path` and renames it over `path` once complete, so concurrent saves
/// never share a partial file. Missing parent directories are created.
///
/// Returns the number of entries written.
pub fn save_snapshot(engine: &StorageEngine, path: &Path) -> Result<usize, SnapshotError> {
    let entries = engine.entries();

    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(|source| SnapshotError::Create {
                path: parent.to_path_buf(),
                source,
            })?;
            parent
        }
        None => Path::new("."),
    };

    // Dropping the temp file on an early return removes it.
    let temp = NamedTempFile::new_in(dir).map_err(|source| SnapshotError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    let file = write_snapshot(&entries, temp.as_file())?;
    file.sync_all()?;
    temp.persist(path).map_err(|e| SnapshotError::Io(e.error))?;

    info!(path = %path.display(), keys = entries.len(), "Snapshot saved");
    Ok(entries.len())
}

/// What one record of the scan produced.
enum Record {
    Entry,
    Skipped,
    End,
}

/// Decodes a snapshot from `input` into `engine`.
///
/// Fails only when the header is wrong. Any later problem ends the scan and
/// the entries inserted so far stay in the store. The trailing checksum is
/// not verified.
///
/// Returns the number of entries inserted.
pub fn read_snapshot<R: Read>(input: R, engine: &StorageEngine) -> Result<usize, SnapshotError> {
    let mut reader = SnapshotReader::new(input);

    let header: [u8; 9] = reader.read_array().map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => SnapshotError::InvalidHeader,
        _ => SnapshotError::Io(e),
    })?;
    if &header != MAGIC {
        return Err(SnapshotError::InvalidHeader);
    }

    let mut loaded = 0;
    loop {
        match read_record(&mut reader, engine) {
            Ok(Record::Entry) => loaded += 1,
            Ok(Record::Skipped) => {}
            Ok(Record::End) => break,
            Err(e) => {
                warn!(error = %e, loaded = loaded, "Snapshot scan stopped early");
                break;
            }
        }
    }

    Ok(loaded)
}

fn read_record<R: Read>(
    reader: &mut SnapshotReader<R>,
    engine: &StorageEngine,
) -> Result<Record, SnapshotError> {
    match Marker::try_from(reader.read_u8()?)? {
        Marker::StringValue => {
            let key = reader.read_string()?;
            let value = reader.read_string()?;
            // Expiry is not carried over from the file
            engine.set(key, value);
            Ok(Record::Entry)
        }
        Marker::Auxiliary => {
            let key = reader.read_string()?;
            let value = reader.read_string()?;
            debug!(
                key = %String::from_utf8_lossy(&key),
                value = %String::from_utf8_lossy(&value),
                "Snapshot metadata"
            );
            Ok(Record::Skipped)
        }
        Marker::SelectDatabase => {
            let db = reader.read_size()?;
            debug!(db = db, "Snapshot database selector");
            Ok(Record::Skipped)
        }
        Marker::ResizeDatabase => {
            let keys = reader.read_size()?;
            let expires = reader.read_size()?;
            debug!(keys = keys, expires = expires, "Snapshot size hints");
            Ok(Record::Skipped)
        }
        Marker::ExpireTimeMillis | Marker::ExpireTimeSecs => {
            reader.skip(EXPIRY_TIMESTAMP_LEN)?;
            Ok(Record::Skipped)
        }
        Marker::EndOfFile => Ok(Record::End),
    }
}

/// Loads the snapshot at `path` into `engine`.
///
/// Never fails: a missing, unreadable or malformed file leaves the store as
/// it was (normally empty) and is only logged.
///
/// Returns the number of entries loaded.
pub fn load_snapshot(engine: &StorageEngine, path: &Path) -> usize {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No snapshot found, starting with an empty database");
            return 0;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot open snapshot, starting with an empty database");
            return 0;
        }
    };

    match read_snapshot(file, engine) {
        Ok(loaded) => {
            info!(path = %path.display(), keys = loaded, "Snapshot loaded");
            loaded
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Invalid snapshot, starting with an empty database");
            0
        }
    }
}
