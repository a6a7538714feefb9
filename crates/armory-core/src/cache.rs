//! Generic tick-scoped keyed cache with batch LRU eviction.
//!
//! Entries expire against the host's tick clock, never wall time. Recency
//! is tracked with a separate strictly monotonic access counter so two
//! touches landing on the same tick still have a total order.

use std::collections::BTreeMap;

use contracts::{CacheCounters, CacheStats, Tick};

use crate::eviction;

#[derive(Debug, Clone)]
struct TtlEntry<V> {
    value: V,
    cached_tick: Tick,
    last_access: u64,
}

/// Keyed lookup-or-compute table with per-call TTL and a global entry cap.
///
/// When the table grows past its capacity, the oldest quarter (by access
/// stamp) is shed in one batch, amortising the ranking cost across many
/// future inserts.
#[derive(Debug, Clone)]
pub struct TtlCache<K: Ord + Clone, V: Clone> {
    entries: BTreeMap<K, TtlEntry<V>>,
    max_entries: usize,
    access_counter: u64,
    counters: CacheCounters,
}

impl<K: Ord + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            max_entries: max_entries.max(1),
            access_counter: 0,
            counters: CacheCounters::default(),
        }
    }

    fn next_stamp(&mut self) -> u64 {
        self.access_counter += 1;
        self.access_counter
    }

    fn is_fresh(entry_tick: Tick, now: Tick, ttl: Tick) -> bool {
        now.saturating_sub(entry_tick) < ttl
    }

    /// Return the cached value for `key`, or invoke `compute` exactly once,
    /// store its result, and return it.
    ///
    /// `compute` runs on a miss or on an expired entry, nothing else. A
    /// panic inside `compute` propagates to the caller and stores nothing.
    pub fn get_or_compute(
        &mut self,
        key: K,
        now: Tick,
        ttl: Tick,
        compute: impl FnOnce() -> V,
    ) -> V {
        if let Some(entry) = self.entries.get(&key) {
            if Self::is_fresh(entry.cached_tick, now, ttl) {
                let stamp = self.next_stamp();
                let entry = self.entries.get_mut(&key).expect("entry checked above");
                entry.last_access = stamp;
                self.counters.record_hit();
                return entry.value.clone();
            }
        }

        self.counters.record_miss();
        let value = compute();
        self.store(key, value.clone(), now);
        value
    }

    /// Fallible variant: a compute error propagates and nothing is stored.
    pub fn try_get_or_compute<E>(
        &mut self,
        key: K,
        now: Tick,
        ttl: Tick,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(entry) = self.entries.get(&key) {
            if Self::is_fresh(entry.cached_tick, now, ttl) {
                let stamp = self.next_stamp();
                let entry = self.entries.get_mut(&key).expect("entry checked above");
                entry.last_access = stamp;
                self.counters.record_hit();
                return Ok(entry.value.clone());
            }
        }

        self.counters.record_miss();
        let value = compute()?;
        self.store(key, value.clone(), now);
        Ok(value)
    }

    fn store(&mut self, key: K, value: V, now: Tick) {
        let stamp = self.next_stamp();
        self.entries.insert(
            key,
            TtlEntry {
                value,
                cached_tick: now,
                last_access: stamp,
            },
        );
        self.evict_if_over_capacity();
    }

    fn evict_if_over_capacity(&mut self) {
        if self.entries.len() <= self.max_entries {
            return;
        }
        let batch = (self.max_entries / 4).max(1);
        let evictees = eviction::oldest_in_full_order(
            self.entries
                .iter()
                .map(|(key, entry)| (key.clone(), entry.last_access)),
            batch,
        );
        for key in evictees {
            self.entries.remove(&key);
        }
    }

    /// Read without touching recency or hit counters. Expiry is the
    /// caller's concern here; inspection paths want the raw entry.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Drop one key. Removing an absent key is a no-op.
    pub fn invalidate(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every key matching the predicate, returning how many went.
    pub fn invalidate_matching(&mut self, predicate: impl Fn(&K) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !predicate(key));
        before - self.entries.len()
    }

    /// Drop entries older than `ttl`, returning how many went.
    pub fn cleanup_expired(&mut self, now: Tick, ttl: Tick) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| Self::is_fresh(entry.cached_tick, now, ttl));
        before - self.entries.len()
    }

    /// Wipe the table and reset the access counter.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.access_counter = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            capacity: self.max_entries,
            hits: self.counters.hits,
            misses: self.counters.misses,
        }
    }
}
