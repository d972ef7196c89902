//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the core key-value store for linekv.
//! Every key maps to one [`Entry`] holding the value and an optional
//! absolute expiry instant.
//!
//! ## Design Decisions
//!
//! 1. **One Lock**: The whole map sits behind a single `Mutex`. Every
//!    operation is one short critical section, so a `get` that finds an
//!    expired entry can delete it without re-acquiring anything.
//! 2. **Checked, Not Scheduled**: There are no per-key timers. Expiry is the
//!    predicate `now > expires_at`, evaluated lazily on `get` and in bulk by
//!    [`StorageEngine::cleanup_expired`].
//! 3. **Value and Expiry Together**: Both live in the same `Entry`, so they are
//!    inserted, replaced and removed as one unit. An expiry can never outlive
//!    its value.
//!
//! ## Expiry Timing
//!
//! A key reports itself absent from `get` as soon as its expiry passes, but it
//! is only physically freed when the next `get` or sweep touches it. Between
//! those two moments [`StorageEngine::len`] still counts it.
//!
//! ```text
//!   set(k, v, now+1s)        expiry passes          sweep / get(k)
//! ───────●──────────────────────●──────────────────────●─────────────▶ time
//!        │   get(k) -> Some(v)  │  get(k) -> None       │  freed
//!        │   len() counts k     │  len() still counts k │  len() drops k
//! ```

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The actual value stored
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates a new entry expiring at the given instant.
    pub fn with_expiry(value: Bytes, expires_at: Instant) -> Self {
        Self {
            value,
            expires_at: Some(expires_at),
        }
    }

    /// Checks whether this entry is expired as of `now`.
    ///
    /// An entry is expired only when `now` is strictly later than its expiry;
    /// at the exact expiry instant it is still live.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| now > exp).unwrap_or(false)
    }
}

/// The main storage engine for linekv.
///
/// Designed to be wrapped in an `Arc` and shared by every session and the
/// expiry sweeper. All operations are thread-safe and never fail.
///
/// # Example
///
/// ```
/// use linekv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), Bytes::from("Ariz"), None);
/// assert_eq!(engine.get(&Bytes::from("name")), Some(Bytes::from("Ariz")));
///
/// engine.set_with_ttl(Bytes::from("session"), Bytes::from("abc123"), Duration::from_secs(60));
/// assert!(engine.get(&Bytes::from("session")).is_some());
/// ```
pub struct StorageEngine {
    /// Key -> entry, guarded as one unit
    data: Mutex<HashMap<Bytes, Entry>>,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: total SET operations
    set_count: AtomicU64,

    /// Statistics: number of expired keys reclaimed (lazily or by sweep)
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("keys", &self.len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates a new, empty storage engine.
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    /// Acquires the map lock.
    ///
    /// A panic in another holder cannot leave the map half-written (every
    /// mutation is a single `insert`/`remove`/`retain`), so a poisoned lock
    /// is recovered rather than propagated.
    #[inline]
    fn lock(&self) -> MutexGuard<'_, HashMap<Bytes, Entry>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts or overwrites the entry for `key`.
    ///
    /// The previous value and the previous expiry are both replaced. Passing
    /// `None` clears any expiry a prior `set` left behind.
    ///
    /// # Returns
    ///
    /// Returns `true` if a new key was created, `false` if an existing key was updated.
    pub fn set(&self, key: Bytes, value: Bytes, expires_at: Option<Instant>) -> bool {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let entry = Entry { value, expires_at };
        self.lock().insert(key, entry).is_none()
    }

    /// Sets a key-value pair that expires `ttl` from now.
    ///
    /// If `now + ttl` does not fit in an `Instant`, the key is stored without
    /// expiry.
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) -> bool {
        let expires_at = Instant::now().checked_add(ttl);
        self.set(key, value, expires_at)
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. An expired
    /// entry is removed in the same critical section that observed it.
    pub fn get(&self, key: &Bytes) -> Option<Bytes> {
        self.get_at(key, Instant::now())
    }

    /// Same as [`get`](Self::get), evaluating expiry against `now`.
    pub fn get_at(&self, key: &Bytes, now: Instant) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.lock();
        let entry = data.get(key)?;

        if entry.is_expired_at(now) {
            data.remove(key);
            self.expired_count.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        Some(entry.value.clone())
    }

    /// Removes every entry whose expiry has passed.
    ///
    /// This is the sweep run by the background expiry sweeper. The reference
    /// instant is taken once, before the lock is acquired.
    ///
    /// # Returns
    ///
    /// Returns the number of keys that were reclaimed.
    pub fn cleanup_expired(&self) -> u64 {
        self.cleanup_expired_at(Instant::now())
    }

    /// Same as [`cleanup_expired`](Self::cleanup_expired), evaluating expiry against `now`.
    pub fn cleanup_expired_at(&self, now: Instant) -> u64 {
        let mut data = self.lock();
        let before = data.len();

        data.retain(|_, entry| !entry.is_expired_at(now));

        let cleaned = (before - data.len()) as u64;
        drop(data);

        if cleaned > 0 {
            self.expired_count.fetch_add(cleaned, Ordering::Relaxed);
        }

        cleaned
    }

    /// Reports whether `key` is physically stored, expired or not.
    ///
    /// Unlike [`get`](Self::get) this never reclaims anything, which makes it
    /// useful for observing what the sweeper has or hasn't freed yet.
    pub fn contains_raw(&self, key: &Bytes) -> bool {
        self.lock().contains_key(key)
    }

    /// Returns the number of physically stored entries.
    ///
    /// Expired entries that no `get` or sweep has reclaimed yet are counted.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns database statistics.
    pub fn stats(&self) -> StorageStats {
        let (keys, keys_with_expiry) = {
            let data = self.lock();
            let with_expiry = data.values().filter(|e| e.expires_at.is_some()).count();
            (data.len(), with_expiry)
        };

        StorageStats {
            keys,
            keys_with_expiry,
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

/// Database statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of entries currently stored
    pub keys: usize,
    /// How many of those carry an expiry
    pub keys_with_expiry: usize,
    /// Total GET operations
    pub get_ops: u64,
    /// Total SET operations
    pub set_ops: u64,
    /// Total expired keys reclaimed
    pub expired: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_set_and_get() {
        let engine = StorageEngine::new();

        assert!(engine.set(Bytes::from("key"), Bytes::from("value"), None));
        assert_eq!(engine.get(&Bytes::from("key")), Some(Bytes::from("value")));
    }

    #[test]
    fn test_get_nonexistent() {
        let engine = StorageEngine::new();
        assert_eq!(engine.get(&Bytes::from("nonexistent")), None);
    }

    #[test]
    fn test_overwrite() {
        let engine = StorageEngine::new();

        assert!(engine.set(Bytes::from("key"), Bytes::from("v1"), None));
        assert!(!engine.set(Bytes::from("key"), Bytes::from("v2"), None));
        assert_eq!(engine.get(&Bytes::from("key")), Some(Bytes::from("v2")));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_expiry() {
        let engine = StorageEngine::new();

        engine.set_with_ttl(
            Bytes::from("key"),
            Bytes::from("value"),
            Duration::from_millis(500),
        );
        assert_eq!(engine.get(&Bytes::from("key")), Some(Bytes::from("value")));

        thread::sleep(Duration::from_millis(600));

        assert_eq!(engine.get(&Bytes::from("key")), None);
        // The read reclaimed it
        assert!(!engine.contains_raw(&Bytes::from("key")));
        assert_eq!(engine.stats().expired, 1);
    }

    #[test]
    fn test_overwrite_clears_stale_ttl() {
        let engine = StorageEngine::new();
        let key = Bytes::from("key");
        let now = Instant::now();

        engine.set(key.clone(), Bytes::from("v1"), Some(now + Duration::from_secs(1)));
        engine.set(key.clone(), Bytes::from("v2"), None);

        let later = now + Duration::from_secs(2);
        assert_eq!(engine.cleanup_expired_at(later), 0);
        assert_eq!(engine.get_at(&key, later), Some(Bytes::from("v2")));
        assert_eq!(engine.stats().keys_with_expiry, 0);
    }

    #[test]
    fn test_expiry_boundary_is_strict() {
        let engine = StorageEngine::new();
        let key = Bytes::from("key");
        let expires_at = Instant::now() + Duration::from_secs(5);

        engine.set(key.clone(), Bytes::from("value"), Some(expires_at));

        assert_eq!(engine.cleanup_expired_at(expires_at), 0);
        assert_eq!(engine.get_at(&key, expires_at), Some(Bytes::from("value")));

        let just_after = expires_at + Duration::from_nanos(1);
        assert_eq!(engine.get_at(&key, just_after), None);
        assert!(engine.is_empty());
    }

    #[test]
    fn test_sweep_and_get_agree() {
        let now = Instant::now();
        let entry = Entry::with_expiry(Bytes::from("v"), now);

        let engine = StorageEngine::new();
        engine.set(Bytes::from("a"), entry.value.clone(), entry.expires_at);

        // At the expiry instant neither path treats it as expired
        assert!(!entry.is_expired_at(now));
        assert_eq!(engine.cleanup_expired_at(now), 0);
        assert!(engine.get_at(&Bytes::from("a"), now).is_some());
    }

    #[test]
    fn test_no_expiry_never_expires() {
        let engine = StorageEngine::new();
        let key = Bytes::from("persistent");

        engine.set(key.clone(), Bytes::from("value"), None);

        let far_future = Instant::now() + Duration::from_secs(365 * 24 * 3600);
        assert_eq!(engine.cleanup_expired_at(far_future), 0);
        assert_eq!(engine.get_at(&key, far_future), Some(Bytes::from("value")));
    }

    #[test]
    fn test_cleanup_expired() {
        let engine = StorageEngine::new();

        engine.set_with_ttl(
            Bytes::from("key1"),
            Bytes::from("value1"),
            Duration::from_millis(10),
        );
        engine.set_with_ttl(
            Bytes::from("key2"),
            Bytes::from("value2"),
            Duration::from_millis(10),
        );
        engine.set(Bytes::from("key3"), Bytes::from("value3"), None);

        thread::sleep(Duration::from_millis(50));

        // Expired but not yet reclaimed
        assert_eq!(engine.len(), 3);

        let cleaned = engine.cleanup_expired();
        assert_eq!(cleaned, 2);
        assert_eq!(engine.len(), 1);
        assert!(engine.contains_raw(&Bytes::from("key3")));
        assert!(!engine.contains_raw(&Bytes::from("key1")));
    }

    #[test]
    fn test_huge_ttl_is_stored_without_expiry() {
        let engine = StorageEngine::new();

        engine.set_with_ttl(Bytes::from("key"), Bytes::from("value"), Duration::MAX);
        assert_eq!(engine.get(&Bytes::from("key")), Some(Bytes::from("value")));
    }

    #[test]
    fn test_stats() {
        let engine = StorageEngine::new();

        engine.set(Bytes::from("a"), Bytes::from("1"), None);
        engine.set_with_ttl(Bytes::from("b"), Bytes::from("2"), Duration::from_secs(60));
        engine.get(&Bytes::from("a"));
        engine.get(&Bytes::from("missing"));

        let stats = engine.stats();
        assert_eq!(stats.keys, 2);
        assert_eq!(stats.keys_with_expiry, 1);
        assert_eq!(stats.set_ops, 2);
        assert_eq!(stats.get_ops, 2);
        assert_eq!(stats.expired, 0);
    }

    #[test]
    fn test_concurrent_access() {
        let engine = Arc::new(StorageEngine::new());
        let mut handles = vec![];

        // Writers on distinct keys
        for i in 0..10 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = format!("key-{}-{}", i, j);
                    let value = format!("value-{}-{}", i, j);
                    engine.set(Bytes::from(key), Bytes::from(value), None);
                }
            }));
        }

        // Readers on arbitrary keys; anything they see must be what was written
        for r in 0..4 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for n in 0..1000 {
                    let (i, j) = ((n + r) % 10, n % 100);
                    let key = Bytes::from(format!("key-{}-{}", i, j));
                    if let Some(value) = engine.get(&key) {
                        assert_eq!(value, Bytes::from(format!("value-{}-{}", i, j)));
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len(), 1000);
    }

    #[test]
    fn test_concurrent_get_and_sweep() {
        let engine = Arc::new(StorageEngine::new());

        for i in 0..500 {
            engine.set_with_ttl(
                Bytes::from(format!("key-{}", i)),
                Bytes::from("value"),
                Duration::from_millis(5),
            );
        }
        thread::sleep(Duration::from_millis(20));

        let reader = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                (0..500)
                    .filter(|i| engine.get(&Bytes::from(format!("key-{}", i))).is_some())
                    .count()
            })
        };
        let swept = engine.cleanup_expired();

        assert_eq!(reader.join().unwrap(), 0);
        assert!(engine.is_empty());
        // Each key was reclaimed exactly once, by one path or the other
        assert!(swept <= 500);
        assert_eq!(engine.stats().expired, 500);
    }
}
