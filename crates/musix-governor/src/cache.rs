//! Response caches.
//!
//! [`ResponseCache`] is the TTL store consulted by the governor before any
//! network work. [`MemoryCache`] is a small bounded store used by clients
//! for large payloads such as search results, where freshness is judged by
//! the reader.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Default capacity of a [`MemoryCache`].
pub const DEFAULT_MEMORY_CACHE_CAPACITY: usize = 20;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    payload: T,
    expires_at: Instant,
}

/// A time-to-live keyed store of response payloads.
///
/// Expired entries are treated as absent and dropped on read; there is no
/// background sweep.
#[derive(Debug)]
pub struct ResponseCache<T> {
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
}

impl<T> Default for ResponseCache<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> ResponseCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the payload for `key` if it has not expired.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let mut entries = lock(&self.entries);

        match entries.get(key) {
            Some(entry) if now < entry.expires_at => Some(entry.payload.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores `payload` under `key` for `ttl`, replacing any previous entry.
    pub fn set(&self, key: impl Into<String>, payload: T, ttl: Duration) {
        let entry = CacheEntry {
            payload,
            expires_at: Instant::now() + ttl,
        };
        lock(&self.entries).insert(key.into(), entry);
    }

    /// Removes the entry for `key`, returning whether one existed.
    pub fn remove(&self, key: &str) -> bool {
        lock(&self.entries).remove(key).is_some()
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

#[derive(Debug)]
struct MemoryEntries<T> {
    values: HashMap<String, (T, Instant)>,
    order: VecDeque<String>,
}

/// A bounded cache that evicts its oldest inserted key when full.
///
/// Entries carry the time they were stored; each read decides how old is
/// too old, so one cache can hold short-lived search results next to
/// long-lived artist lookups.
#[derive(Debug)]
pub struct MemoryCache<T> {
    capacity: usize,
    entries: Mutex<MemoryEntries<T>>,
}

impl<T: Clone> Default for MemoryCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CACHE_CAPACITY)
    }
}

impl<T: Clone> MemoryCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(MemoryEntries {
                values: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the value for `key` if it was stored less than `max_age` ago.
    pub fn get(&self, key: &str, max_age: Duration) -> Option<T> {
        let entries = lock(&self.entries);
        let (value, stored_at) = entries.values.get(key)?;
        (stored_at.elapsed() < max_age).then(|| value.clone())
    }

    /// Stores `value` under `key`.
    ///
    /// Re-inserting an existing key refreshes it in place without changing
    /// its eviction position.
    pub fn insert(&self, key: impl Into<String>, value: T) {
        let key = key.into();
        let now = Instant::now();
        let mut entries = lock(&self.entries);

        if let Some(slot) = entries.values.get_mut(&key) {
            *slot = (value, now);
            return;
        }

        entries.order.push_back(key.clone());
        entries.values.insert(key, (value, now));

        while entries.values.len() > self.capacity {
            let Some(oldest) = entries.order.pop_front() else {
                break;
            };
            entries.values.remove(&oldest);
            log::debug!("Evicted {} from memory cache", oldest);
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        lock(&self.entries).values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
