//! Peercache is a library for caching expensive lookups across a fleet of peers.
//!
//! # Introduction
//! Each node of a fleet runs the same set of **groups**. A group is a named keyspace along with a
//! **loader** which fetches values from the actual source of truth (e.g. a database or a remote
//! service). Instead of each node asking the source for every key, the keyspace is distributed
//! among all nodes using **consistent hashing**. A node receiving a lookup for a key owned by
//! another peer asks that peer, which then answers from its own cache (or loads the value once).
//!
//! Within a single node, concurrent lookups for the same missing key are **collapsed**, so that
//! the loader (or the peer) is only asked once, no matter how many tasks are waiting for the
//! value.
//!
//! # Features
//! * **Memory bound LRU caches**: Each group keeps its values in an LRU cache which is limited
//!   by the number of bytes occupied by keys and values rather than by the number of entries.
//! * **100% Async/Await**: Loaders and peer fetches are async and everything builds upon
//!   [tokio](https://tokio.rs/). No lock is ever held while waiting for I/O.
//! * **Pluggable transport**: How peers talk to each other is up to the application. All that
//!   is needed is a [PeerGetter](peers::PeerGetter) which fetches a key of a group from a
//!   remote node.
//! * **Reload-aware config facility**: Memory budgets can be changed during operation via the
//!   [config] module.
//!
//! # Modules
//! * **Group**: The main entry point which ties everything together. See [group].
//! * **LRU-Cache**: The memory bound cache used by each group. See [lru].
//! * **HashRing**: Consistent hashing with virtual nodes. See [ring].
//! * **SingleFlight**: Collapses concurrent calls for the same key. See [singleflight].
//! * **Peers**: The capabilities required to reach other nodes along with a ring based
//!   picker. See [peers].
//! * **Registry**: Resolves groups by name. See [registry].
//!
//! # Examples
//! A short example on how to set up a group can be found here: [GroupBuilder](builder::GroupBuilder).
#![deny(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]
use simplelog::{format_description, ConfigBuilder, LevelFilter, SimpleLogger};
use std::sync::Once;

pub mod builder;
pub mod byteview;
pub mod config;
pub mod fmt;
pub mod group;
pub mod lru;
pub mod peers;
pub mod registry;
pub mod ring;
pub mod singleflight;
pub mod stats;

/// Contains the version of the Peercache library.
pub const PEERCACHE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initializes the logging system.
///
/// This logs to stdout using an ISO timestamp. It is safe to invoke this several times, as only
/// the first call has an effect.
pub fn init_logging() {
    static INIT_LOGGING: Once = Once::new();

    // We need to do this as otherwise the tests might crash as the logging system
    // is initialized several times...
    INIT_LOGGING.call_once(|| {
        if let Err(error) = SimpleLogger::init(
            LevelFilter::Debug,
            ConfigBuilder::new()
                .set_time_format_custom(format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
                ))
                .set_thread_level(LevelFilter::Trace)
                .set_target_level(LevelFilter::Error)
                .set_location_level(LevelFilter::Trace)
                .build(),
        ) {
            panic!("Failed to initialize logging system: {}", error);
        }

        log::info!("||. PEERCACHE (v {})", PEERCACHE_VERSION);
    });
}

#[cfg(test)]
mod testing {
    use crate::group::Loader;
    use crate::peers::{PeerGetter, PeerPicker};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Executes async code within a single threaded tokio runtime.
    pub fn test_async<F: std::future::Future>(future: F) {
        use tokio::runtime;

        crate::init_logging();

        let rt = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let _ = rt.block_on(future);
    }

    /// Serves values from a fixed table and records how often each key was requested.
    pub struct CountingLoader {
        values: HashMap<String, String>,
        invocations: Mutex<HashMap<String, usize>>,
        delay: Option<Duration>,
    }

    impl CountingLoader {
        pub fn new(values: &[(&str, &str)]) -> Self {
            CountingLoader {
                values: values
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect(),
                invocations: Mutex::new(HashMap::new()),
                delay: None,
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn invocations(&self, key: &str) -> usize {
            self.invocations
                .lock()
                .unwrap()
                .get(key)
                .copied()
                .unwrap_or(0)
        }

        pub fn total_invocations(&self) -> usize {
            self.invocations.lock().unwrap().values().sum()
        }
    }

    #[async_trait::async_trait]
    impl Loader for CountingLoader {
        async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
            *self
                .invocations
                .lock()
                .unwrap()
                .entry(key.to_owned())
                .or_insert(0) += 1;

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            match self.values.get(key) {
                Some(value) => Ok(value.as_bytes().to_vec()),
                None => Err(anyhow::anyhow!("{} does not exist", key)),
            }
        }
    }

    /// A peer which answers each fetch with the same value (or always fails).
    pub struct StaticPeer {
        value: Option<String>,
        fetches: AtomicUsize,
        last_request: Mutex<Option<(String, String)>>,
    }

    impl StaticPeer {
        pub fn new(value: &str) -> Self {
            StaticPeer {
                value: Some(value.to_owned()),
                fetches: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }

        pub fn failing() -> Self {
            StaticPeer {
                value: None,
                fetches: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }

        pub fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }

        pub fn last_request(&self) -> Option<(String, String)> {
            self.last_request.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl PeerGetter for StaticPeer {
        async fn fetch(&self, group: &str, key: &str) -> anyhow::Result<Vec<u8>> {
            let _ = self.fetches.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some((group.to_owned(), key.to_owned()));

            match &self.value {
                Some(value) => Ok(value.as_bytes().to_vec()),
                None => Err(anyhow::anyhow!("Connection refused")),
            }
        }
    }

    /// Picks the same peer for every key or never picks one at all.
    pub struct FixedPicker {
        peer: Option<Arc<dyn PeerGetter>>,
    }

    impl FixedPicker {
        pub fn new(peer: Arc<dyn PeerGetter>) -> Self {
            FixedPicker { peer: Some(peer) }
        }

        pub fn local() -> Self {
            FixedPicker { peer: None }
        }
    }

    impl PeerPicker for FixedPicker {
        fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerGetter>> {
            self.peer.clone()
        }
    }
}
