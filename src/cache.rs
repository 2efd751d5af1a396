//! In-memory TTL caches.
//!
//! Each operation class (search, chapter pages, feeds) gets its own [`TtlCache`] with
//! its own lifetime. Entries are valid while `now - created_at < ttl`. Expired entries
//! are kept around (they serve as a stale fallback when the upstream fails) until a
//! write finds the map above its sweep threshold and prunes them.
//!
//! The clock is injectable so tests can move time without sleeping.
//!
//! ```rust
//! use shiori::cache::{ManualClock, TtlCache};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let clock = Arc::new(ManualClock::new());
//! let cache = TtlCache::new(Duration::from_secs(60)).with_clock(clock.clone());
//!
//! cache.insert("k".to_string(), 1);
//! clock.advance(Duration::from_secs(59));
//! assert_eq!(cache.get(&"k".to_string()), Some(1));
//! clock.advance(Duration::from_secs(1));
//! assert_eq!(cache.get(&"k".to_string()), None);
//! ```

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Time source for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }
}

/// A cached value and the time it was written.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) < ttl
    }
}

/// A keyed map whose entries are valid for a fixed time after they are written.
///
/// All operations hold the lock only for their own duration and never across an
/// `.await`, so a check-then-write done through one call (such as
/// [`insert_if_stale`](TtlCache::insert_if_stale)) cannot interleave with another
/// writer.
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
    sweep_threshold: Option<usize>,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            sweep_threshold: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Prunes expired entries on any write that leaves more than `threshold` entries.
    pub fn with_sweep_threshold(mut self, threshold: usize) -> Self {
        self.sweep_threshold = Some(threshold);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the value if it was written less than one TTL ago.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        self.entries
            .lock()
            .get(key)
            .filter(|entry| entry.is_fresh(now, self.ttl))
            .map(|entry| entry.value.clone())
    }

    /// Returns the value regardless of age.
    pub fn get_stale(&self, key: &K) -> Option<V> {
        self.entries.lock().get(key).map(|entry| entry.value.clone())
    }

    pub fn is_fresh(&self, key: &K) -> bool {
        let now = self.clock.now();
        self.entries
            .lock()
            .get(key)
            .is_some_and(|entry| entry.is_fresh(now, self.ttl))
    }

    /// Writes `value`, replacing any previous entry.
    pub fn insert(&self, key: K, value: V) {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
            },
        );
        self.sweep(&mut entries, now);
    }

    /// Writes `value` unless a fresh entry already exists. Returns whether it wrote.
    pub fn insert_if_stale(&self, key: K, value: V) -> bool {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        if entries
            .get(&key)
            .is_some_and(|entry| entry.is_fresh(now, self.ttl))
        {
            return false;
        }
        entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
            },
        );
        self.sweep(&mut entries, now);
        true
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.lock().remove(key).map(|entry| entry.value)
    }

    /// Number of entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn sweep(&self, entries: &mut HashMap<K, CacheEntry<V>>, now: Instant) {
        if let Some(threshold) = self.sweep_threshold {
            if entries.len() > threshold {
                let before = entries.len();
                entries.retain(|_, entry| entry.is_fresh(now, self.ttl));
                tracing::debug!(before, after = entries.len(), "swept expired cache entries");
            }
        }
    }
}

impl<K, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.lock().len())
            .field("sweep_threshold", &self.sweep_threshold)
            .finish()
    }
}
