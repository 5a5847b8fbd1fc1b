//! # Luck Cache
//!
//! TTL-bounded map from actor to last-known luck value.
//!
//! ```text
//!  observed_at            +30s                          +300s
//!      │ ── fresh: served ──┤ ── stale: miss, kept ──────┤ ── purged by sweep
//! ```
//!
//! ## Thread Safety
//!
//! `get`/`set` run on the host's event threads, `sweep` on the
//! [`CacheSweeper`] thread. All three take the same `parking_lot::Mutex` for
//! one map operation only; a cache miss is fetched by the caller with the
//! lock released and stored afterwards with `set`.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::integration::ActorId;

/// Reads are served from cache only while younger than this.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(30);

/// Entries older than this are removed by the sweep.
pub const PURGE_WINDOW: Duration = Duration::from_secs(300);

/// How often the background sweeper runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// A cached luck value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CachedLuck {
    /// Last known luck.
    pub value: f64,
    /// When it was observed.
    pub observed_at: Instant,
}

/// TTL-bounded luck cache.
#[derive(Debug)]
pub struct LuckCache {
    entries: Mutex<HashMap<ActorId, CachedLuck>>,
    freshness: Duration,
    purge_after: Duration,
}

impl Default for LuckCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LuckCache {
    /// Creates a cache with the standard 30 s / 300 s windows.
    #[must_use]
    pub fn new() -> Self {
        Self::with_windows(FRESHNESS_WINDOW, PURGE_WINDOW)
    }

    /// Creates a cache with custom windows.
    #[must_use]
    pub fn with_windows(freshness: Duration, purge_after: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            freshness,
            purge_after,
        }
    }

    /// Returns the cached value if fresh.
    #[must_use]
    pub fn get(&self, actor: &ActorId) -> Option<f64> {
        self.get_at(actor, Instant::now())
    }

    /// [`get`](Self::get) evaluated at `now`.
    #[must_use]
    pub fn get_at(&self, actor: &ActorId, now: Instant) -> Option<f64> {
        let cached = self.entries.lock().get(actor).copied()?;
        let age = now.saturating_duration_since(cached.observed_at);
        if age < self.freshness {
            tracing::trace!(actor = %actor, value = cached.value, "luck cache hit");
            Some(cached.value)
        } else {
            None
        }
    }

    /// Upserts a value observed now.
    pub fn set(&self, actor: &ActorId, value: f64) {
        self.set_at(actor, value, Instant::now());
    }

    /// [`set`](Self::set) observed at `now`.
    pub fn set_at(&self, actor: &ActorId, value: f64, now: Instant) {
        self.entries.lock().insert(
            actor.clone(),
            CachedLuck {
                value,
                observed_at: now,
            },
        );
    }

    /// Removes every entry older than the purge window. Returns how many.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// [`sweep`](Self::sweep) evaluated at `now`.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let purge_after = self.purge_after;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, cached| now.saturating_duration_since(cached.observed_at) <= purge_after);
        before - entries.len()
    }

    /// Number of entries, fresh or stale.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

// ============================================================================
// Background sweeper
// ============================================================================

/// Periodically sweeps a [`LuckCache`] on a dedicated thread.
///
/// The thread stops when the sweeper is dropped.
pub struct CacheSweeper {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CacheSweeper {
    /// Starts sweeping `cache` every [`SWEEP_INTERVAL`].
    #[must_use]
    pub fn start(cache: Arc<LuckCache>) -> Self {
        Self::with_interval(cache, SWEEP_INTERVAL)
    }

    /// Starts sweeping `cache` every `interval`.
    #[must_use]
    pub fn with_interval(cache: Arc<LuckCache>, interval: Duration) -> Self {
        let (tx, rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("magicfind-luck-sweeper".to_string())
            .spawn(move || loop {
                match rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let removed = cache.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, "swept stale luck entries");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "luck sweeper thread failed to start");
                None
            }
        };

        Self {
            shutdown: Some(tx),
            handle,
        }
    }

    /// Whether the sweeper thread is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        // Signal shutdown
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.try_send(());
        }

        // Wait for the sweeper to finish
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
