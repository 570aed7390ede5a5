//! Sharded LRU cache.
//!
//! Backs [`MemoryStore`](super::MemoryStore). Keys are store key tuples, so
//! lookups take any borrowed form of the key and whole key ranges can be
//! dropped with [`LruCache::retain`].

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Number of independently locked shards.
const SHARDS: usize = 16;

/// Link value meaning "no slot".
const NIL: usize = usize::MAX;

/// Statistics for cache operations.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Lookups that found an entry.
    pub hits: AtomicU64,
    /// Lookups that found nothing.
    pub misses: AtomicU64,
    /// Inserts and replacements.
    pub inserts: AtomicU64,
    /// Entries dropped for capacity.
    pub evictions: AtomicU64,
    /// Entries dropped by `remove`, `retain` or `clear`.
    pub removals: AtomicU64,
}

impl CacheStats {
    /// Fraction of lookups that hit, 0.0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let lookups = hits + self.misses.load(Ordering::Relaxed);
        if lookups == 0 {
            return 0.0;
        }
        hits as f64 / lookups as f64
    }
}

enum Slot<K, V> {
    Vacant {
        next_free: usize,
    },
    Occupied {
        key: K,
        value: V,
        older: usize,
        newer: usize,
    },
}

/// One shard: a slot arena threaded by a recency list and a free chain.
struct Shard<K, V> {
    capacity: usize,
    index: HashMap<K, usize>,
    slots: Vec<Slot<K, V>>,
    free: usize,
    newest: usize,
    oldest: usize,
}

impl<K: Hash + Eq + Clone, V: Clone> Shard<K, V> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            index: HashMap::new(),
            slots: Vec::new(),
            free: NIL,
            newest: NIL,
            oldest: NIL,
        }
    }

    fn lookup<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = *self.index.get(key)?;
        self.touch(slot);
        match &self.slots[slot] {
            Slot::Occupied { value, .. } => Some(value.clone()),
            Slot::Vacant { .. } => None,
        }
    }

    /// Insert or replace; true when the oldest entry had to go.
    fn store(&mut self, key: K, value: V) -> bool {
        if let Some(&slot) = self.index.get(&key) {
            if let Slot::Occupied { value: current, .. } = &mut self.slots[slot] {
                *current = value;
            }
            self.touch(slot);
            return false;
        }

        let evicted = self.index.len() >= self.capacity && self.evict_oldest();
        let slot = self.claim(key.clone(), value);
        self.index.insert(key, slot);
        evicted
    }

    fn take<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = self.index.remove(key)?;
        self.release(slot).map(|(_, value)| value)
    }

    /// Drop every entry whose key fails `keep`; returns how many went.
    fn retain<F: Fn(&K) -> bool>(&mut self, keep: &F) -> usize {
        let doomed: Vec<usize> = self
            .index
            .iter()
            .filter(|(key, _)| !keep(key))
            .map(|(_, &slot)| slot)
            .collect();
        self.index.retain(|key, _| keep(key));
        for &slot in &doomed {
            self.release(slot);
        }
        doomed.len()
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn reset(&mut self) -> usize {
        let dropped = self.index.len();
        self.index.clear();
        self.slots.clear();
        self.free = NIL;
        self.newest = NIL;
        self.oldest = NIL;
        dropped
    }

    fn touch(&mut self, slot: usize) {
        if self.newest != slot {
            self.detach(slot);
            self.attach_newest(slot);
        }
    }

    fn claim(&mut self, key: K, value: V) -> usize {
        let entry = Slot::Occupied {
            key,
            value,
            older: NIL,
            newer: NIL,
        };
        let slot = if self.free == NIL {
            self.slots.push(entry);
            self.slots.len() - 1
        } else {
            let slot = self.free;
            if let Slot::Vacant { next_free } = &self.slots[slot] {
                self.free = *next_free;
            }
            self.slots[slot] = entry;
            slot
        };
        self.attach_newest(slot);
        slot
    }

    /// Unlink `slot` and push it on the free chain. The index is not touched.
    fn release(&mut self, slot: usize) -> Option<(K, V)> {
        self.detach(slot);
        let vacant = Slot::Vacant { next_free: self.free };
        match std::mem::replace(&mut self.slots[slot], vacant) {
            Slot::Occupied { key, value, .. } => {
                self.free = slot;
                Some((key, value))
            }
            already_vacant => {
                self.slots[slot] = already_vacant;
                None
            }
        }
    }

    fn evict_oldest(&mut self) -> bool {
        if self.oldest == NIL {
            return false;
        }
        match self.release(self.oldest) {
            Some((key, _)) => {
                self.index.remove(&key);
                true
            }
            None => false,
        }
    }

    fn links(&self, slot: usize) -> Option<(usize, usize)> {
        match &self.slots[slot] {
            Slot::Occupied { older, newer, .. } => Some((*older, *newer)),
            Slot::Vacant { .. } => None,
        }
    }

    fn set_older(&mut self, slot: usize, to: usize) {
        if let Slot::Occupied { older, .. } = &mut self.slots[slot] {
            *older = to;
        }
    }

    fn set_newer(&mut self, slot: usize, to: usize) {
        if let Slot::Occupied { newer, .. } = &mut self.slots[slot] {
            *newer = to;
        }
    }

    fn detach(&mut self, slot: usize) {
        let Some((older, newer)) = self.links(slot) else {
            return;
        };
        if older == NIL {
            self.oldest = newer;
        } else {
            self.set_newer(older, newer);
        }
        if newer == NIL {
            self.newest = older;
        } else {
            self.set_older(newer, older);
        }
        self.set_older(slot, NIL);
        self.set_newer(slot, NIL);
    }

    fn attach_newest(&mut self, slot: usize) {
        let previous = self.newest;
        self.set_older(slot, previous);
        self.set_newer(slot, NIL);
        if previous == NIL {
            self.oldest = slot;
        } else {
            self.set_newer(previous, slot);
        }
        self.newest = slot;
    }
}

/// A sharded LRU cache for concurrent access.
///
/// Capacity is split evenly across shards and recency is tracked per shard,
/// so eviction order is only approximately global.
pub struct LruCache<K, V> {
    shards: Box<[Mutex<Shard<K, V>>]>,
    hasher: RandomState,
    capacity: usize,
    stats: Arc<CacheStats>,
}

impl<K: Hash + Eq + Clone, V: Clone> LruCache<K, V> {
    /// Create a cache holding about `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let per_shard = capacity.div_ceil(SHARDS).max(1);
        Self {
            shards: (0..SHARDS)
                .map(|_| Mutex::new(Shard::with_capacity(per_shard)))
                .collect(),
            hasher: RandomState::new(),
            capacity: per_shard * SHARDS,
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Look up `key`, marking it most recently used.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let found = self.shard(key).lock().lookup(key);
        let counter = if found.is_some() { &self.stats.hits } else { &self.stats.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Insert or replace. Returns true if another entry was evicted.
    pub fn insert(&self, key: K, value: V) -> bool {
        let evicted = self.shard(&key).lock().store(key, value);
        self.stats.inserts.fetch_add(1, Ordering::Relaxed);
        if evicted {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        evicted
    }

    /// Remove `key`, returning its value.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.shard(key).lock().take(key);
        if removed.is_some() {
            self.stats.removals.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Keep only entries whose key satisfies `keep`.
    ///
    /// Shards are locked one at a time; an entry inserted into a shard that
    /// was already visited survives.
    pub fn retain<F: Fn(&K) -> bool>(&self, keep: F) -> usize {
        let removed: usize = self.shards.iter().map(|shard| shard.lock().retain(&keep)).sum();
        self.stats.removals.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Drop everything.
    pub fn clear(&self) {
        let removed: usize = self.shards.iter().map(|shard| shard.lock().reset()).sum();
        self.stats.removals.fetch_add(removed as u64, Ordering::Relaxed);
    }

    /// Entries across all shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.lock().len() == 0)
    }

    /// Total capacity after rounding up to whole shards.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Shared statistics handle.
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    fn shard<Q: Hash + ?Sized>(&self, key: &Q) -> &Mutex<Shard<K, V>> {
        let hash = self.hasher.hash_one(key);
        &self.shards[hash as usize % SHARDS]
    }
}
