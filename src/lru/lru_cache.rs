use linked_hash_map::LinkedHashMap;

/// Returns the allocated memory in bytes.
pub trait ByteSize {
    /// Returns the amount of memory in bytes which is accounted for this value.
    ///
    /// Along with the length of its key, this is what counts against the budget of an
    /// [LRUCache](LRUCache).
    fn allocated_size(&self) -> usize;
}

impl ByteSize for String {
    fn allocated_size(&self) -> usize {
        self.len()
    }
}

impl ByteSize for Vec<u8> {
    fn allocated_size(&self) -> usize {
        self.len()
    }
}

/// Invoked for each entry which is dropped to make room for newer ones.
pub type EvictionCallback<V> = Box<dyn FnMut(String, V) + Send>;

/// Provides a memory constrained LRU cache.
///
/// A cache behaves just like a **Map** as long as the sum of all key and value sizes stays
/// within **max_memory**. Once an insertion pushes the cache beyond this limit, the least
/// recently used entries are evicted until the cache fits again. A **max_memory** of 0 disables
/// the limit.
///
/// Note that the cache itself is not synchronized. A [Group](crate::group::Group) wraps it in
/// a mutex.
///
/// # Examples
/// ```
/// # use peercache::lru::LRUCache;
/// // Specifies a cache which can store up to 20 bytes (keys and values)...
/// let mut lru = LRUCache::new(20);
///
/// lru.put("Foo".to_owned(), "Bar".to_owned());
/// assert_eq!(lru.get("Foo").unwrap(), &"Bar".to_owned());
///
/// // this will still fit..
/// lru.put("Foo1".to_owned(), "XXXXX".to_owned());
/// assert_eq!(lru.allocated_memory(), 15);
///
/// // this will exceed the limit...
/// lru.put("Foo2".to_owned(), "XXXXX".to_owned());
/// // ..and therefore throw out the least recently used entry:
/// assert_eq!(lru.get("Foo").is_some(), false);
/// assert_eq!(lru.get("Foo1").is_some(), true);
/// assert_eq!(lru.get("Foo2").is_some(), true);
///```
pub struct LRUCache<V: ByteSize> {
    allocated_memory: usize,
    max_memory: usize,
    reads: usize,
    hits: usize,
    writes: usize,
    evictions: usize,
    on_evicted: Option<EvictionCallback<V>>,
    map: LinkedHashMap<String, Entry<V>>,
}

struct Entry<V: ByteSize> {
    mem_size: usize,
    value: V,
}

impl<V: ByteSize> LRUCache<V> {
    /// Creates a new cache which keeps at most **max_memory** bytes of keys and values.
    ///
    /// Passing 0 creates an unbounded cache.
    pub fn new(max_memory: usize) -> Self {
        LRUCache {
            allocated_memory: 0,
            max_memory,
            reads: 0,
            hits: 0,
            writes: 0,
            evictions: 0,
            on_evicted: None,
            map: LinkedHashMap::new(),
        }
    }

    /// Creates a new cache which reports each evicted entry to the given callback.
    ///
    /// # Examples
    /// ```
    /// # use peercache::lru::LRUCache;
    /// # use std::sync::{Arc, Mutex};
    /// let evicted = Arc::new(Mutex::new(Vec::new()));
    /// let log = evicted.clone();
    /// let mut lru = LRUCache::with_eviction_callback(
    ///     6,
    ///     Box::new(move |key: String, _value: String| log.lock().unwrap().push(key)),
    /// );
    ///
    /// lru.put("A".to_owned(), "123".to_owned());
    /// lru.put("B".to_owned(), "123".to_owned());
    /// assert_eq!(evicted.lock().unwrap().as_slice(), &["A".to_owned()]);
    /// ```
    pub fn with_eviction_callback(max_memory: usize, on_evicted: EvictionCallback<V>) -> Self {
        let mut cache = LRUCache::new(max_memory);
        cache.on_evicted = Some(on_evicted);

        cache
    }

    /// Stores the given value for the given key and marks it as most recently used.
    ///
    /// If an entry is already present, it is replaced and the memory accounting is adjusted
    /// accordingly. Afterwards, least recently used entries are evicted until the cache fits
    /// into its budget again.
    ///
    /// An entry which is larger than the whole budget is never stored. Any previous value for
    /// the key is removed in this case, as it would be outdated anyway.
    pub fn put(&mut self, key: String, value: V) {
        self.writes += 1;

        let mem_size = key.len() + value.allocated_size();
        if self.max_memory > 0 && mem_size > self.max_memory {
            log::debug!(
                "Not caching '{}' as its size ({} bytes) exceeds the whole cache ({} bytes).",
                key,
                mem_size,
                self.max_memory
            );
            let _ = self.remove(&key);
            return;
        }

        if let Some(stale_entry) = self.map.insert(key, Entry { mem_size, value }) {
            self.allocated_memory -= stale_entry.mem_size;
        }
        self.allocated_memory += mem_size;

        self.enforce_constraints();
    }

    fn enforce_constraints(&mut self) {
        while self.max_memory > 0 && self.allocated_memory > self.max_memory {
            if !self.remove_oldest() {
                unreachable!("Failed to enforce constraints of a LRU cache!");
            }
        }
    }

    /// Evicts the least recently used entry.
    ///
    /// Returns **false** if the cache was empty. The eviction callback (if any) is invoked for
    /// the removed entry.
    pub fn remove_oldest(&mut self) -> bool {
        match self.map.pop_front() {
            Some((key, entry)) => {
                self.allocated_memory -= entry.mem_size;
                self.evictions += 1;
                if let Some(callback) = self.on_evicted.as_mut() {
                    callback(key, entry.value);
                }
                true
            }
            None => false,
        }
    }

    /// Returns the value which has previously been stored for the given key or **None** if
    /// no value is present.
    ///
    /// A hit marks the entry as most recently used.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        self.reads += 1;

        match self.map.get_refresh(key) {
            Some(entry) => {
                self.hits += 1;
                Some(&entry.value)
            }
            None => None,
        }
    }

    /// Determines if a value is present for the given key without touching its recency.
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Removes the entry for the given key if present.
    ///
    /// Note that explicit removals are not reported to the eviction callback.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let entry = self.map.remove(key)?;
        self.writes += 1;
        self.allocated_memory -= entry.mem_size;

        Some(entry.value)
    }

    /// Removes all entries in this cache.
    ///
    /// Note that this will also zero all metrics.
    pub fn flush(&mut self) {
        self.map.clear();
        self.allocated_memory = 0;
        self.reads = 0;
        self.writes = 0;
        self.hits = 0;
        self.evictions = 0;
    }

    /// Returns the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Determines if the cache is completely empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the maximal amount of memory (keys and values) to be occupied by this cache.
    pub fn max_memory(&self) -> usize {
        self.max_memory
    }

    /// Specifies the maximal amount of memory to be occupied by this cache.
    ///
    /// Shrinking the limit immediately evicts entries until the cache fits again.
    ///
    /// # Examples
    /// ```
    /// # use peercache::lru::LRUCache;
    /// let mut lru = LRUCache::new(0);
    /// for i in 0..6 {
    ///     lru.put(format!("Foo{}", i), "Bar".to_owned());
    /// }
    /// assert_eq!(lru.len(), 6);
    ///
    /// // Each entry occupies 7 bytes, so only the two most recent ones survive...
    /// lru.set_max_memory(14);
    /// assert_eq!(lru.len(), 2);
    /// assert_eq!(lru.contains("Foo5"), true);
    /// ```
    pub fn set_max_memory(&mut self, max_memory: usize) {
        self.max_memory = max_memory;
        self.enforce_constraints();
    }

    /// Returns the number of bytes occupied by the keys and values of this cache.
    pub fn allocated_memory(&self) -> usize {
        self.allocated_memory
    }

    /// Returns the memory utilization in percent or 0 for an unbounded cache.
    pub fn memory_utilization(&self) -> f32 {
        match self.max_memory {
            0 => 0.,
            max => self.allocated_memory as f32 / max as f32 * 100.,
        }
    }

    /// Returns the cache hit rate in percent.
    ///
    /// Note that all metrics are reset when **flush()** is called.
    pub fn hit_rate(&self) -> f32 {
        match self.reads {
            0 => 0.,
            n => self.hits as f32 / n as f32 * 100.,
        }
    }

    /// Returns the total number of reads performed on this cache since the last flush.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Returns the number of reads which found a value since the last flush.
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Returns the total number of writes performed on this cache since the last flush.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Returns the number of entries evicted to stay within the budget since the last flush.
    pub fn evictions(&self) -> usize {
        self.evictions
    }
}

#[cfg(test)]
mod tests {
    use crate::lru::LRUCache;
    use std::sync::{Arc, Mutex};

    fn accounted_size(lru: &LRUCache<String>, keys: &[&str]) -> usize {
        keys.iter()
            .filter(|key| lru.contains(key))
            .map(|key| key.len() + 6)
            .sum()
    }

    #[test]
    fn max_memory_is_enforced() {
        let mut lru = LRUCache::new(12 * 4);

        // We expect 4 entries with a size of 12 bytes each to fully fit in the cache....
        lru.put("Hello0".to_owned(), "World0".to_owned());
        lru.put("Hello1".to_owned(), "World1".to_owned());
        lru.put("Hello2".to_owned(), "World2".to_owned());
        lru.put("Hello3".to_owned(), "World3".to_owned());
        assert_eq!(lru.len(), 4);
        assert_eq!(lru.allocated_memory(), 12 * 4);

        // If we remove an entry, the used memory is corrected...
        assert_eq!(lru.remove("Hello0"), Some("World0".to_owned()));
        assert_eq!(lru.len(), 3);
        assert_eq!(lru.allocated_memory(), 12 * 3);

        // If we replace an entry, the used memory is corrected...
        lru.put("Hello1".to_owned(), "".to_owned());
        assert_eq!(lru.allocated_memory(), 12 * 3 - 6);

        // Restore the original entry, so that the table has three entries with 12 bytes each...
        lru.put("Hello1".to_owned(), "World1".to_owned());
        assert_eq!(lru.allocated_memory(), 12 * 3);

        // Adding two 13 byte entries needs 62 bytes, so two entries have to go...
        lru.put("Hello0".to_owned(), "World01".to_owned());
        lru.put("Hello4".to_owned(), "World04".to_owned());
        assert_eq!(lru.allocated_memory(), 12 + 13 * 2);
        assert_eq!(lru.len(), 3);

        // "Hello2" and "Hello3" were the least recently touched, so they will have been evicted..
        assert_eq!(lru.get("Hello2"), None);
        assert_eq!(lru.get("Hello3"), None);
        assert_eq!(lru.get("Hello1").is_some(), true);
        assert_eq!(lru.evictions(), 2);
    }

    #[test]
    fn usage_matches_live_entries_after_every_put() {
        let keys = ["a", "bb", "ccc", "dddd", "eeeee", "ffffff", "ggggggg"];
        let mut lru = LRUCache::new(40);

        for round in 0..5 {
            for (index, key) in keys.iter().enumerate() {
                if (index + round) % 3 == 0 {
                    let _ = lru.get(keys[(index + 2) % keys.len()]);
                }
                lru.put(key.to_string(), "123456".to_owned());

                assert_eq!(lru.allocated_memory() <= 40, true);
                assert_eq!(lru.allocated_memory(), accounted_size(&lru, &keys));
            }
        }
    }

    #[test]
    fn reads_promote_entries() {
        // Room for exactly two entries with 4 bytes each...
        let mut lru = LRUCache::new(8);
        lru.put("A".to_owned(), "123".to_owned());
        lru.put("B".to_owned(), "123".to_owned());

        // Touching A makes B the least recently used entry...
        assert_eq!(lru.get("A").is_some(), true);
        lru.put("C".to_owned(), "123".to_owned());

        assert_eq!(lru.contains("A"), true);
        assert_eq!(lru.contains("B"), false);
        assert_eq!(lru.contains("C"), true);
    }

    #[test]
    fn re_adding_promotes_entries() {
        let mut lru = LRUCache::new(8);
        lru.put("A".to_owned(), "123".to_owned());
        lru.put("B".to_owned(), "123".to_owned());
        lru.put("A".to_owned(), "456".to_owned());
        lru.put("C".to_owned(), "123".to_owned());

        assert_eq!(lru.get("A"), Some(&"456".to_owned()));
        assert_eq!(lru.contains("B"), false);
    }

    #[test]
    fn evictions_are_reported() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let log = evicted.clone();
        let mut lru = LRUCache::with_eviction_callback(
            12,
            Box::new(move |key: String, value: String| log.lock().unwrap().push((key, value))),
        );

        lru.put("key1".to_owned(), "v1".to_owned());
        lru.put("k2".to_owned(), "v2".to_owned());
        lru.put("k3".to_owned(), "v3".to_owned());
        lru.put("k4".to_owned(), "v4".to_owned());

        assert_eq!(
            evicted.lock().unwrap().as_slice(),
            &[("key1".to_owned(), "v1".to_owned())]
        );

        // Explicit removals are not reported...
        let _ = lru.remove("k2");
        assert_eq!(evicted.lock().unwrap().len(), 1);

        // ..but explicit evictions are.
        assert_eq!(lru.remove_oldest(), true);
        assert_eq!(evicted.lock().unwrap().len(), 2);
        assert_eq!(evicted.lock().unwrap()[1].0, "k3");
    }

    #[test]
    fn remove_oldest_on_empty_cache_is_a_noop() {
        let mut lru: LRUCache<String> = LRUCache::new(10);
        assert_eq!(lru.remove_oldest(), false);
        assert_eq!(lru.allocated_memory(), 0);
    }

    #[test]
    fn unbounded_caches_never_evict() {
        let mut lru = LRUCache::new(0);
        for i in 0..1000 {
            lru.put(format!("key{}", i), "X".repeat(100));
        }

        assert_eq!(lru.len(), 1000);
        assert_eq!(lru.evictions(), 0);
        assert_eq!(lru.memory_utilization(), 0.);
    }

    #[test]
    fn oversized_entries_are_not_stored() {
        let mut lru = LRUCache::new(10);
        lru.put("A".to_owned(), "1".to_owned());
        lru.put("B".to_owned(), "12".to_owned());

        // This would exceed the whole cache - keep everything else...
        lru.put("C".to_owned(), "X".repeat(10));
        assert_eq!(lru.contains("C"), false);
        assert_eq!(lru.len(), 2);

        // ..but drop a previous value of the same key.
        lru.put("A".to_owned(), "X".repeat(10));
        assert_eq!(lru.contains("A"), false);
        assert_eq!(lru.allocated_memory(), 3);
    }

    #[test]
    fn metrics_are_computed_correctly() {
        let mut lru = LRUCache::new(10);

        lru.put("A".to_owned(), "A".to_owned());
        lru.put("B".to_owned(), "B".to_owned());
        lru.put("C".to_owned(), "C".to_owned());

        // Perform 4 reads, of which 3 hit a cache entry...
        assert_eq!(lru.get("A").is_some(), true);
        assert_eq!(lru.get("B").is_some(), true);
        assert_eq!(lru.get("C").is_some(), true);
        assert_eq!(lru.get("D").is_none(), true);

        assert_eq!(lru.writes(), 3);
        assert_eq!(lru.reads(), 4);
        assert_eq!(lru.hits(), 3);
        assert_eq!(lru.hit_rate().round() as i32, 75);

        // The cache contains 6 bytes of data and has a max memory of 10 -> 60% memory utilization..
        assert_eq!(lru.memory_utilization().round() as i32, 60);

        lru.flush();
        assert_eq!(lru.is_empty(), true);
        assert_eq!(lru.reads(), 0);
        assert_eq!(lru.allocated_memory(), 0);
    }
}
