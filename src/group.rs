//! Provides the cache group which ties loading, caching and peer selection together.
//!
//! A [Group] is a named namespace of keys along with a [Loader] which fetches the value of a key
//! from its source of truth (e.g. a database). Each lookup via [Group::get] runs through the
//! following steps:
//! 1. An empty key is rejected right away.
//! 2. The local cache is consulted. A hit is returned immediately.
//! 3. Otherwise, the lookup enters a [SingleFlight](crate::singleflight::SingleFlight), so that
//!    concurrent misses for the same key are resolved only once. The resolving caller asks the
//!    [PeerPicker] (if any) which peer owns the key and tries to fetch the value from it. Values
//!    fetched from a peer are **not** stored in the local cache, as the owning peer caches them
//!    already.
//! 4. If no peer is responsible or if the peer fails, the loader is invoked and its result is
//!    stored in the local cache.
//!
//! # Examples
//!
//! ```
//! # use peercache::group::{loader_fn, Group};
//! # #[tokio::main]
//! # async fn main() {
//! let scores = Group::new(
//!     "scores",
//!     2 << 10,
//!     loader_fn(|key| match key {
//!         "Tom" => Ok(b"630".to_vec()),
//!         _ => Err(anyhow::anyhow!("{} does not exist", key)),
//!     }),
//! );
//!
//! assert_eq!(scores.get("Tom").await.unwrap().to_string(), "630");
//! assert_eq!(scores.get("Jerry").await.is_err(), true);
//! assert_eq!(scores.get("").await.is_err(), true);
//! # }
//! ```
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use crate::byteview::ByteView;
use crate::fmt::format_size;
use crate::lru::LRUCache;
use crate::peers::{PeerGetter, PeerPicker};
use crate::singleflight::SingleFlight;
use crate::stats::{increment, GroupStats};

/// Fetches the value of a key from the source of truth on a cache miss.
///
/// A loader has to be safe for concurrent use: different keys are loaded concurrently, only
/// concurrent lookups of the same key are collapsed into a single invocation.
#[async_trait::async_trait]
pub trait Loader: Send + Sync {
    /// Loads the value for the given key.
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

/// Adapts a plain (synchronous) function to the [Loader] trait.
///
/// This is mostly useful for tests or when the source of truth lives in memory anyway.
pub struct FnLoader<F> {
    loader: F,
}

#[async_trait::async_trait]
impl<F> Loader for FnLoader<F>
where
    F: Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync,
{
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        (self.loader)(key)
    }
}

/// Wraps the given function into a [Loader].
pub fn loader_fn<F>(loader: F) -> Arc<dyn Loader>
where
    F: Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync + 'static,
{
    Arc::new(FnLoader { loader })
}

/// Describes why a lookup failed.
///
/// An error is shared among all callers which were waiting on the same resolution, therefore it
/// is cheaply cloneable.
#[derive(Clone, Debug)]
pub enum CacheError {
    /// An empty key was given.
    EmptyKey,
    /// The loader failed to provide a value.
    Loader(Arc<anyhow::Error>),
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::EmptyKey => write!(f, "A key is required"),
            CacheError::Loader(error) => write!(f, "Failed to load value: {:#}", error),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::EmptyKey => None,
            CacheError::Loader(error) => Some(&***error),
        }
    }
}

/// Represents the outcome of a lookup.
pub type CacheResult = Result<ByteView, CacheError>;

/// A named cache namespace along with its loader, cache and peers.
pub struct Group {
    name: String,
    loader: Arc<dyn Loader>,
    main_cache: Mutex<LRUCache<ByteView>>,
    peers: OnceLock<Arc<dyn PeerPicker>>,
    flights: SingleFlight<CacheResult>,
    stats: GroupStats,
}

impl Group {
    /// Creates a new group which keeps up to **max_memory** bytes (keys and values) in its local
    /// cache. A **max_memory** of 0 disables the limit.
    ///
    /// Note that the group is not registered anywhere - see
    /// [Registry](crate::registry::Registry) for that.
    pub fn new(name: impl Into<String>, max_memory: usize, loader: Arc<dyn Loader>) -> Self {
        let name = name.into();
        let cache_name = name.clone();

        Group {
            main_cache: Mutex::new(LRUCache::with_eviction_callback(
                max_memory,
                Box::new(move |key: String, _: ByteView| {
                    log::debug!("Evicted '{}' from {}.", key, cache_name)
                }),
            )),
            name,
            loader,
            peers: OnceLock::new(),
            flights: SingleFlight::new(),
            stats: GroupStats::default(),
        }
    }

    /// Returns the name of this group.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attaches the peer picker used to determine remote owners of keys.
    ///
    /// # Panics
    /// Panics if peers have already been registered for this group. This is part of wiring up
    /// the application and must happen exactly once.
    pub fn register_peers(&self, peers: Arc<dyn PeerPicker>) {
        if self.peers.set(peers).is_err() {
            panic!(
                "Peers have already been registered for the group {}!",
                self.name
            );
        }
    }

    /// Returns the value for the given key.
    ///
    /// See the [module documentation](crate::group) for how a value is resolved. Loader errors
    /// are reported as is, peer errors are not reported at all, as the loader is used instead.
    pub async fn get(&self, key: &str) -> CacheResult {
        increment(&self.stats.gets);
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }

        if let Some(value) = self.lookup_cache(key) {
            increment(&self.stats.cache_hits);
            return Ok(value);
        }

        self.flights.run(key, || self.load(key)).await
    }

    fn lookup_cache(&self, key: &str) -> Option<ByteView> {
        self.main_cache.lock().unwrap().get(key).cloned()
    }

    async fn load(&self, key: &str) -> CacheResult {
        increment(&self.stats.loads);
        let watch = Instant::now();

        if let Some(peer) = self.peers.get().and_then(|peers| peers.pick_peer(key)) {
            if let Some(value) = self.load_from_peer(peer.as_ref(), key).await {
                self.record_duration(watch);
                return Ok(value);
            }
        }

        let result = self.load_locally(key).await;
        self.record_duration(watch);

        result
    }

    async fn load_from_peer(&self, peer: &dyn PeerGetter, key: &str) -> Option<ByteView> {
        match peer.fetch(&self.name, key).await {
            Ok(data) => {
                increment(&self.stats.peer_loads);
                Some(ByteView::from(data))
            }
            Err(error) => {
                increment(&self.stats.peer_errors);
                log::warn!(
                    "Failed to fetch '{}' of {} from its peer: {:#}. Using the local loader...",
                    key,
                    self.name,
                    error
                );
                None
            }
        }
    }

    async fn load_locally(&self, key: &str) -> CacheResult {
        match self.loader.load(key).await {
            Ok(data) => {
                increment(&self.stats.local_loads);
                let value = ByteView::from(data);
                self.populate_cache(key, value.clone());
                Ok(value)
            }
            Err(error) => {
                increment(&self.stats.loader_errors);
                Err(CacheError::Loader(Arc::new(error)))
            }
        }
    }

    fn populate_cache(&self, key: &str, value: ByteView) {
        log::debug!("Caching '{}' in {} ({} bytes).", key, self.name, value.len());
        self.main_cache.lock().unwrap().put(key.to_owned(), value);
    }

    fn record_duration(&self, watch: Instant) {
        self.stats
            .load_duration
            .add(watch.elapsed().as_micros() as u64);
    }

    /// Stores the given value for the given key in the local cache.
    ///
    /// This bypasses the loader as well as any peer. Empty keys are ignored.
    pub fn set(&self, key: &str, value: impl Into<ByteView>) {
        if key.is_empty() {
            return;
        }

        self.populate_cache(key, value.into());
    }

    /// Removes the given key from the local cache.
    ///
    /// Returns **true** if a value was present.
    pub fn remove(&self, key: &str) -> bool {
        self.main_cache.lock().unwrap().remove(key).is_some()
    }

    /// Drops all entries of the local cache.
    pub fn flush(&self) {
        self.main_cache.lock().unwrap().flush();
    }

    /// Changes the memory budget of the local cache.
    ///
    /// Shrinking the budget evicts entries right away.
    pub fn set_max_memory(&self, max_memory: usize) {
        self.main_cache.lock().unwrap().set_max_memory(max_memory);
    }

    /// Returns the memory budget of the local cache.
    pub fn max_memory(&self) -> usize {
        self.main_cache.lock().unwrap().max_memory()
    }

    /// Returns the number of entries in the local cache.
    pub fn cache_size(&self) -> usize {
        self.main_cache.lock().unwrap().len()
    }

    /// Returns the number of bytes occupied by keys and values in the local cache.
    pub fn allocated_memory(&self) -> usize {
        self.main_cache.lock().unwrap().allocated_memory()
    }

    /// Determines if the local cache contains a value for the given key.
    pub fn is_cached(&self, key: &str) -> bool {
        self.main_cache.lock().unwrap().contains(key)
    }

    /// Returns the lookup statistics of this group.
    pub fn stats(&self) -> &GroupStats {
        &self.stats
    }

    /// Returns how many lookups received the result of a resolution performed by a concurrent
    /// lookup for the same key.
    pub fn collapsed_lookups(&self) -> u64 {
        self.flights.shared_results()
    }

    /// Renders a human readable report of the cache utilization and the lookup statistics.
    pub fn report(&self) -> String {
        let (entries, allocated, max_memory, hit_rate, evictions) = {
            let cache = self.main_cache.lock().unwrap();
            (
                cache.len(),
                cache.allocated_memory(),
                cache.max_memory(),
                cache.hit_rate(),
                cache.evictions(),
            )
        };

        let mut result = String::new();
        result += format!("{:<30} {:>12}\n", "Group", self.name).as_str();
        result += format!("{:<30} {:>12}\n", "Entries", entries).as_str();
        result += format!("{:<30} {:>12}\n", "Allocated Memory", format_size(allocated)).as_str();
        result += format!("{:<30} {:>12}\n", "Max Memory", format_size(max_memory)).as_str();
        result += format!("{:<30} {:>11.2}%\n", "Hit Rate", hit_rate).as_str();
        result += format!("{:<30} {:>12}\n", "Evictions", evictions).as_str();
        result += format!(
            "{:<30} {:>12}\n",
            "Collapsed Lookups",
            self.collapsed_lookups()
        )
        .as_str();
        result += self.stats.to_string().as_str();

        result
    }
}
