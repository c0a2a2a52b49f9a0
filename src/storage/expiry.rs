//! Background Expiry Sweeper
//!
//! This module implements "active expiry": removing a key once its TTL
//! passes, even if nobody ever reads it again. Lazy expiry on `get` covers
//! keys that are read; this task covers the rest.
//!
//! ## Design
//!
//! One Tokio task per store:
//! 1. Once the sweeper is running, every `set_with_ttl` sends a [`Deadline`]
//!    over an unbounded channel
//! 2. The task keeps pending deadlines in a min-heap
//! 3. It sleeps until the earliest deadline (or until a new one arrives)
//! 4. On wake it removes every due key whose generation still matches
//!
//! A deadline whose key was overwritten since is dropped without touching
//! the newer entry. Superseded deadlines are not removed from the heap
//! early: each stays queued until its own `at` passes, so a key rewritten
//! with long TTLs many times holds one heap slot per write until then.

use crate::storage::StorageEngine;
use bytes::Bytes;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

/// A scheduled removal: drop `key` at `at` if it still holds `generation`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline {
    pub at: Instant,
    pub generation: u64,
    pub key: Bytes,
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Starts the expiry sweeper as a background task.
    ///
    /// Only TTL writes made after this call are expired actively; keys set
    /// before it are left to lazy expiry on `get`. A store supports one
    /// sweeper; starting a second one only logs a warning.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(engine: Arc<StorageEngine>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        match engine.take_deadline_receiver() {
            Some(deadlines) => {
                tokio::spawn(sweeper_loop(Arc::downgrade(&engine), deadlines, shutdown_rx));
                info!("Background expiry sweeper started");
            }
            None => warn!("Expiry sweeper already running for this store"),
        }

        Self { shutdown_tx }
    }

    /// Stops the expiry sweeper.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        if self.shutdown_tx.send(true).is_ok() {
            info!("Background expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main sweeper loop.
async fn sweeper_loop(
    engine: Weak<StorageEngine>,
    mut deadlines: mpsc::UnboundedReceiver<Deadline>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut pending: BinaryHeap<Reverse<Deadline>> = BinaryHeap::new();

    loop {
        let next = pending.peek().map(|Reverse(deadline)| deadline.at);

        tokio::select! {
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
            received = deadlines.recv() => match received {
                Some(deadline) => {
                    trace!(generation = deadline.generation, "Deadline scheduled");
                    pending.push(Reverse(deadline));
                }
                None => {
                    debug!("Deadline channel closed, expiry sweeper exiting");
                    return;
                }
            },
            _ = sleep_until(next) => {
                let Some(engine) = engine.upgrade() else {
                    return;
                };

                let now = tokio::time::Instant::now().into_std();
                let mut expired = 0u64;
                while pending.peek().is_some_and(|Reverse(deadline)| deadline.at <= now) {
                    if let Some(Reverse(deadline)) = pending.pop() {
                        if engine.expire_if_current(&deadline.key, deadline.generation) {
                            expired += 1;
                        }
                    }
                }

                if expired > 0 {
                    debug!(
                        expired = expired,
                        keys_remaining = engine.len(),
                        pending = pending.len(),
                        "Expired keys cleaned up"
                    );
                }
            }
        }
    }
}

/// Sleeps until `next`, or forever when nothing is scheduled.
async fn sleep_until(next: Option<Instant>) {
    match next {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

/// Starts the expiry sweeper for `engine`.
///
/// This is a convenience function for simple use cases.
pub fn start_expiry_sweeper(engine: Arc<StorageEngine>) -> ExpirySweeper {
    ExpirySweeper::start(engine)
}
