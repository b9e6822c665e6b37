use std::{
    collections::{hash_map::RandomState, BTreeMap, HashMap},
    hash::{BuildHasher, Hash, Hasher},
    sync::{Mutex, MutexGuard, PoisonError},
};

const MAX_SHARDS: usize = 16;

/// Least-recently-used map with a fixed maximum number of entries.
///
/// Recency is tracked with a monotonically increasing tick; `recency` maps each tick back to its
/// key so the oldest entry is always the first one.
struct LruCache<K, V> {
    capacity: usize,
    tick: u64,
    entries: HashMap<K, (V, u64)>,
    recency: BTreeMap<u64, K>,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    fn new(capacity: usize) -> Self {
        LruCache {
            capacity,
            tick: 0,
            entries: HashMap::with_capacity(capacity.min(1024)),
            recency: BTreeMap::new(),
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Look up `key`, marking it as most recently used.
    fn get(&mut self, key: &K) -> Option<&V> {
        let tick = self.next_tick();
        let (_, last_used) = self.entries.get_mut(key)?;
        let previous = std::mem::replace(last_used, tick);
        if let Some(k) = self.recency.remove(&previous) {
            self.recency.insert(tick, k);
        }
        self.entries.get(key).map(|(value, _)| value)
    }

    fn insert(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }

        let tick = self.next_tick();
        if let Some((_, previous)) = self.entries.insert(key.clone(), (value, tick)) {
            self.recency.remove(&previous);
        } else if self.entries.len() > self.capacity {
            self.evict_oldest();
        }
        self.recency.insert(tick, key);
    }

    fn evict_oldest(&mut self) {
        if let Some((_, key)) = self.recency.pop_first() {
            self.entries.remove(&key);
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Thread-safe LRU split into independently locked shards, selected by key hash.
pub(super) struct ShardedLruCache<K, V> {
    shards: Vec<Mutex<LruCache<K, V>>>,
    hasher: RandomState,
}

impl<K: Hash + Eq + Clone, V: PartialEq> ShardedLruCache<K, V> {
    /// Create a cache holding at most `capacity` entries (rounded up to a multiple of the shard
    /// count).
    pub(super) fn new(capacity: usize) -> Self {
        let n_shards = capacity.clamp(1, MAX_SHARDS);
        let per_shard = (capacity + n_shards - 1) / n_shards;
        ShardedLruCache {
            shards: (0..n_shards)
                .map(|_| Mutex::new(LruCache::new(per_shard)))
                .collect(),
            hasher: RandomState::new(),
        }
    }

    fn shard(&self, key: &K) -> MutexGuard<'_, LruCache<K, V>> {
        let mut hasher = self.hasher.build_hasher();
        key.hash(&mut hasher);
        let index = (hasher.finish() % self.shards.len() as u64) as usize;
        // A panic while holding the lock cannot leave the map inconsistent enough to matter for
        // deduplication, so poisoning is ignored.
        self.shards[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if `key` is cached with exactly `value`. Touches the entry either way.
    pub(super) fn contains(&self, key: &K, value: &V) -> bool {
        self.shard(key).get(key) == Some(value)
    }

    pub(super) fn insert(&self, key: K, value: V) {
        self.shard(&key).insert(key, value);
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::{LruCache, ShardedLruCache};

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        // Touch "a" so "b" becomes the oldest.
        assert_eq!(cache.get(&"a"), Some(&1));
        cache.insert("c", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(&1));
        assert_eq!(cache.get(&"c"), Some(&3));
    }

    #[test]
    fn overwrite_does_not_evict() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 10);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), Some(&10));
        assert_eq!(cache.get(&"b"), Some(&2));
    }

    #[test]
    fn zero_capacity_holds_nothing() {
        let mut cache = LruCache::new(0);
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn sharded_cache_is_bounded() {
        let cache = ShardedLruCache::new(64);
        for i in 0..1_000 {
            cache.insert(i, i);
        }
        assert!(cache.len() <= 64);
        assert!(cache.contains(&999, &999));
    }

    #[test]
    fn contains_compares_value() {
        let cache = ShardedLruCache::new(10);
        cache.insert("key", "value");
        assert!(cache.contains(&"key", &"value"));
        assert!(!cache.contains(&"key", &"other"));
        assert!(!cache.contains(&"missing", &"value"));
    }
}
