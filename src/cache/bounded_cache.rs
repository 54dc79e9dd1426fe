use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::time::Instant;

use lru::LruCache;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use super::{
    CacheError, CacheStats, CLEANUP_FRACTION, DEFAULT_CAPACITY, DEFAULT_CLEANUP_THRESHOLD,
};

#[derive(Clone)]
struct Slot<V> {
    value: V,
    last_access: Instant,
}

impl<V> Slot<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            last_access: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_access = Instant::now();
    }
}

/// Fixed-capacity key-value store with least-recently-used eviction.
///
/// Reads through [`get`](Self::get) and every write move the key to the
/// most-recently-used end. A new key arriving at full capacity evicts the
/// least-recently-used entry. Once the cache fills past `cleanup_threshold`
/// of its capacity, the oldest [`CLEANUP_FRACTION`] of capacity is removed in
/// one batch so sustained inserts do not pay for an eviction each time.
#[derive(Clone)]
pub struct BoundedCache<K: Hash + Eq, V> {
    entries: LruCache<K, Slot<V>>,
    capacity: usize,
    cleanup_threshold: f64,
    hits: u64,
    misses: u64,
    evictions: u64,
    cleanups: u64,
}

impl<K: Hash + Eq, V> BoundedCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self::with_threshold(capacity, DEFAULT_CLEANUP_THRESHOLD)
    }

    pub fn with_threshold(capacity: usize, cleanup_threshold: f64) -> Self {
        Self {
            entries: LruCache::unbounded(),
            capacity: capacity.max(1),
            cleanup_threshold: sanitize_threshold(cleanup_threshold),
            hits: 0,
            misses: 0,
            evictions: 0,
            cleanups: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cleanup_threshold(&self) -> f64 {
        self.cleanup_threshold
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a value and mark it most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Result<&V, CacheError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.entries.get_mut(key) {
            Some(slot) => {
                self.hits += 1;
                slot.touch();
                Ok(&slot.value)
            }
            None => {
                self.misses += 1;
                Err(CacheError::KeyNotFound)
            }
        }
    }

    /// Look up a value without touching recency or counters.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.peek(key).map(|slot| &slot.value)
    }

    /// When the key was last read through `get` or written.
    pub fn last_access<Q>(&self, key: &Q) -> Option<Instant>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.peek(key).map(|slot| slot.last_access)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains(key)
    }

    /// Insert or replace a value. Overflow evicts, it never fails.
    pub fn set(&mut self, key: K, value: V) {
        if let Some(slot) = self.entries.get_mut(&key) {
            slot.value = value;
            slot.touch();
            return;
        }
        self.insert_new(key, value);
    }

    /// Mutate the value stored under `key` in place, inserting `default()`
    /// first when the key is absent. Recency and eviction follow [`set`](Self::set).
    pub fn upsert_with<D, F>(&mut self, key: K, default: D, update: F)
    where
        D: FnOnce() -> V,
        F: FnOnce(&mut V),
    {
        if let Some(slot) = self.entries.get_mut(&key) {
            update(&mut slot.value);
            slot.touch();
            return;
        }
        let mut value = default();
        update(&mut value);
        self.insert_new(key, value);
    }

    pub fn delete<Q>(&mut self, key: &Q) -> Result<V, CacheError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries
            .pop(key)
            .map(|slot| slot.value)
            .ok_or(CacheError::KeyNotFound)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries from least to most recently used.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().rev().map(|(k, slot)| (k, &slot.value))
    }

    /// Mutable access to every value, without changing recency.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.entries.iter_mut().map(|(_, slot)| &mut slot.value)
    }

    /// Apply new limits, evicting least-recently-used entries until the
    /// cache fits.
    pub fn set_limits(&mut self, capacity: usize, cleanup_threshold: f64) {
        self.capacity = capacity.max(1);
        self.cleanup_threshold = sanitize_threshold(cleanup_threshold);
        while self.entries.len() > self.capacity {
            self.evict_lru();
        }
    }

    pub fn stats(&self) -> CacheStats {
        let current_size = self.entries.len();
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            cleanups: self.cleanups,
            current_size,
            capacity: self.capacity,
            usage_percentage: current_size as f64 / self.capacity as f64 * 100.0,
        }
    }

    fn insert_new(&mut self, key: K, value: V) {
        if self.entries.len() >= self.capacity {
            self.evict_lru();
        }
        self.entries.put(key, Slot::new(value));
        self.maybe_cleanup();
    }

    fn evict_lru(&mut self) {
        if self.entries.pop_lru().is_some() {
            self.evictions += 1;
        }
    }

    fn maybe_cleanup(&mut self) {
        let len = self.entries.len();
        if (len as f64) < self.capacity as f64 * self.cleanup_threshold {
            return;
        }

        // The entry that was just written sits at the MRU end and must survive.
        let batch = ((self.capacity as f64 * CLEANUP_FRACTION).floor() as usize)
            .min(len.saturating_sub(1));
        if batch == 0 {
            return;
        }

        for _ in 0..batch {
            self.evict_lru();
        }
        self.cleanups += 1;
        debug!(
            "cache cleanup removed {} entries ({} remain, capacity {})",
            batch,
            self.entries.len(),
            self.capacity
        );
    }
}

fn sanitize_threshold(threshold: f64) -> f64 {
    if threshold.is_finite() && threshold > 0.0 {
        threshold
    } else {
        DEFAULT_CLEANUP_THRESHOLD
    }
}

impl<K: Hash + Eq, V> Default for BoundedCache<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<K: Hash + Eq + fmt::Debug, V: fmt::Debug> fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedCache")
            .field("capacity", &self.capacity)
            .field("cleanup_threshold", &self.cleanup_threshold)
            .field("entries", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}

impl<K: Hash + Eq, V: PartialEq> PartialEq for BoundedCache<K, V> {
    /// Caches compare equal when they hold the same entries in the same
    /// recency order. Limits and counters are ignored.
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && va == vb)
    }
}

// Persisted as a plain object from least to most recently used. Limits are
// not written; the owner re-applies them after loading.
impl<K, V> Serialize for BoundedCache<K, V>
where
    K: Hash + Eq + Serialize,
    V: Serialize,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de, K, V> Deserialize<'de> for BoundedCache<K, V>
where
    K: Hash + Eq + Deserialize<'de>,
    V: Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CacheVisitor<K, V>(PhantomData<(K, V)>);

        impl<'de, K, V> Visitor<'de> for CacheVisitor<K, V>
        where
            K: Hash + Eq + Deserialize<'de>,
            V: Deserialize<'de>,
        {
            type Value = BoundedCache<K, V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of cache entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<K, V>()? {
                    entries.push((key, value));
                }

                let mut cache = BoundedCache::new(entries.len().max(DEFAULT_CAPACITY));
                for (key, value) in entries {
                    cache.entries.put(key, Slot::new(value));
                }
                Ok(cache)
            }
        }

        deserializer.deserialize_map(CacheVisitor(PhantomData))
    }
}
