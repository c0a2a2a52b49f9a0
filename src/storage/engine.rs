//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the in-memory key-value store behind snapkv.
//!
//! ## Design Decisions
//!
//! 1. **One RwLock**: the whole map sits behind a single reader/writer lock.
//!    `get`, `keys` and `entries` share it; writes and purges take it exclusively.
//! 2. **Lazy Expiry**: an expired key is purged by the read that finds it.
//! 3. **Active Expiry**: while a sweeper is running, every TTL-bearing write
//!    hands a [`Deadline`] to the [`ExpirySweeper`](super::ExpirySweeper),
//!    which removes the key once the deadline passes.
//! 4. **Generations**: every write stamps its entry with a fresh generation
//!    number. A deadline only removes the entry whose generation it carries,
//!    so a later `SET` always overrides an earlier TTL.
//!
//! ```text
//!   set_with_ttl(k, v, 50ms) ──► Entry { gen: 7, expires_at: t+50 }
//!                            └─► Deadline { t+50, gen: 7, k } ──► sweeper
//!   set(k, v2)               ──► Entry { gen: 8, expires_at: None }
//!   sweeper fires for gen 7  ──► gen 8 != 7, entry kept
//! ```

use crate::storage::expiry::Deadline;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The actual value stored
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
    /// Which write produced this entry
    generation: u64,
}

impl Entry {
    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| Instant::now() >= exp)
            .unwrap_or(false)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// The store shared by every connection.
///
/// Wrap it in an `Arc`; all operations take `&self` and are thread-safe.
///
/// # Example
///
/// ```
/// use snapkv::storage::StorageEngine;
/// use bytes::Bytes;
///
/// let engine = StorageEngine::new();
/// engine.set(Bytes::from("name"), Bytes::from("snap"));
/// assert_eq!(engine.get(&Bytes::from("name")), Some(Bytes::from("snap")));
/// assert_eq!(engine.get(&Bytes::from("missing")), None);
/// ```
pub struct StorageEngine {
    data: RwLock<HashMap<Bytes, Entry>>,

    /// Source of entry generations
    next_generation: AtomicU64,

    /// Keys removed because their TTL ran out (lazy or active)
    expired_count: AtomicU64,

    /// Deadlines for the expiry sweeper
    deadlines: mpsc::UnboundedSender<Deadline>,

    /// Receiving end, handed to the sweeper when it starts
    deadline_rx: Mutex<Option<mpsc::UnboundedReceiver<Deadline>>>,

    /// Set once a sweeper owns the receiver; until then nothing is queued
    sweeper_attached: AtomicBool,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("keys", &self.len())
            .field("expired", &self.expired_count())
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates an empty store.
    pub fn new() -> Self {
        let (deadlines, deadline_rx) = mpsc::unbounded_channel();

        Self {
            data: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            expired_count: AtomicU64::new(0),
            deadlines,
            deadline_rx: Mutex::new(Some(deadline_rx)),
            sweeper_attached: AtomicBool::new(false),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Bytes, Entry>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Bytes, Entry>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Sets a key-value pair without expiry.
    ///
    /// Any expiry the key had before is cleared.
    ///
    /// # Returns
    ///
    /// Returns `true` if a new key was created, `false` if an existing key was updated.
    pub fn set(&self, key: Bytes, value: Bytes) -> bool {
        let mut data = self.write();
        let entry = Entry {
            value,
            expires_at: None,
            generation: self.generation(),
        };
        data.insert(key, entry).is_none()
    }

    /// Sets a key-value pair that expires after `ttl`.
    ///
    /// The deadline is handed to the expiry sweeper only when one is
    /// running. Without a sweeper the key is expired lazily by `get`.
    ///
    /// # Returns
    ///
    /// Returns `true` if a new key was created, `false` if an existing key was updated.
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) -> bool {
        let expires_at = Instant::now() + ttl;

        let (is_new, generation) = {
            let mut data = self.write();
            let generation = self.generation();
            let entry = Entry {
                value,
                expires_at: Some(expires_at),
                generation,
            };
            (data.insert(key.clone(), entry).is_none(), generation)
        };

        if self.sweeper_attached.load(Ordering::Acquire) {
            // Fails only once the sweeper has shut down; lazy expiry still applies.
            let _ = self.deadlines.send(Deadline {
                at: expires_at,
                generation,
                key,
            });
        }

        is_new
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    /// This implements "lazy expiry" - expired keys are detected and removed on access.
    pub fn get(&self, key: &Bytes) -> Option<Bytes> {
        // Fast path under the read lock
        {
            let data = self.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Key exists but is expired - need write lock to remove it
        let mut data = self.write();
        match data.get(key) {
            Some(entry) if entry.is_expired() => {
                data.remove(key);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                None
            }
            // Race: another writer refreshed the key in between
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Returns every mapped key.
    ///
    /// Keys whose TTL has passed but which nothing has purged yet are
    /// included; only `get` and the sweeper remove expired keys.
    pub fn keys(&self) -> Vec<Bytes> {
        self.read().keys().cloned().collect()
    }

    /// Copies out every key/value pair, without expiry filtering.
    ///
    /// The read lock is released before this returns, so callers can do
    /// slow work (file I/O) on the copy.
    pub fn entries(&self) -> Vec<(Bytes, Bytes)> {
        self.read()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    /// Removes `key` if it still holds the entry written with `generation`.
    ///
    /// Called by the expiry sweeper when a deadline fires.
    pub fn expire_if_current(&self, key: &Bytes, generation: u64) -> bool {
        let mut data = self.write();
        match data.get(key) {
            Some(entry) if entry.generation == generation => {
                data.remove(key);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    /// Returns the number of mapped keys, including expired-but-unpurged ones.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys removed because their TTL passed.
    pub fn expired_count(&self) -> u64 {
        self.expired_count.load(Ordering::Relaxed)
    }

    /// Hands out the deadline receiver. Only the first caller gets it.
    pub(crate) fn take_deadline_receiver(&self) -> Option<mpsc::UnboundedReceiver<Deadline>> {
        let rx = self
            .deadline_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if rx.is_some() {
            self.sweeper_attached.store(true, Ordering::Release);
        }
        rx
    }
}
