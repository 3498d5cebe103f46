//! Provides a builder which can be used to set up a group.
//!
//! A [Group](crate::group::Group) can be created directly, however, during startup some more
//! wiring is commonly required: the memory budget might be provided by the config, peers have to
//! be attached and the group has to be made available via a [Registry](crate::registry::Registry).
//! The builder bundles these steps.
//!
//! # Example
//! ```
//! # use std::sync::Arc;
//! # use peercache::builder::GroupBuilder;
//! # use peercache::config::Config;
//! # use peercache::group::loader_fn;
//! # use peercache::peers::RingPeerPicker;
//! # use peercache::registry::Registry;
//! # #[tokio::main]
//! # async fn main() {
//! let config = Config::new("settings.yml");
//! config.load_from_string("groups:\n    scores:\n        max_memory: 64m\n", None).unwrap();
//!
//! let registry = Registry::new();
//! let scores = GroupBuilder::new("scores")
//!     .max_memory(1024)
//!     .with_config(&config)
//!     .loader(loader_fn(|key| Ok(format!("Score of {}", key).into_bytes())))
//!     .peers(Arc::new(RingPeerPicker::from_config("http://localhost:8001", &config)))
//!     .install(&registry);
//!
//! assert_eq!(scores.max_memory(), 64 * 1024 * 1024);
//! assert_eq!(registry.require("scores").get("Tom").await.unwrap().to_string(), "Score of Tom");
//! # }
//! ```
use std::sync::Arc;

use crate::config::Config;
use crate::group::{Group, Loader};
use crate::peers::PeerPicker;
use crate::registry::Registry;

/// Collects all settings of a group before creating it.
pub struct GroupBuilder {
    name: String,
    max_memory: usize,
    loader: Option<Arc<dyn Loader>>,
    peers: Option<Arc<dyn PeerPicker>>,
}

impl GroupBuilder {
    /// Contains the memory budget used if none is given.
    pub const DEFAULT_MAX_MEMORY: usize = 64 * 1024 * 1024;

    /// Creates a new builder for a group with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        GroupBuilder {
            name: name.into(),
            max_memory: GroupBuilder::DEFAULT_MAX_MEMORY,
            loader: None,
            peers: None,
        }
    }

    /// Specifies the maximal number of bytes to keep in the local cache. Use 0 to disable
    /// the limit.
    pub fn max_memory(mut self, max_memory: usize) -> Self {
        self.max_memory = max_memory;
        self
    }

    /// Reads the memory budget from **groups.<name>.max_memory** if present.
    ///
    /// An invalid setting is logged and the current budget is kept.
    pub fn with_config(mut self, config: &Config) -> Self {
        match config
            .current()
            .size(&format!("groups.{}.max_memory", self.name))
        {
            Ok(Some(max_memory)) => self.max_memory = max_memory,
            Ok(None) => (),
            Err(error) => log::error!(
                "Ignoring the config of group {}: {:#}",
                self.name,
                error
            ),
        }

        self
    }

    /// Specifies the loader which resolves cache misses.
    pub fn loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Specifies the peers to ask for keys owned by other nodes.
    pub fn peers(mut self, peers: Arc<dyn PeerPicker>) -> Self {
        self.peers = Some(peers);
        self
    }

    /// Creates the group.
    ///
    /// # Panics
    /// Panics if no [loader](GroupBuilder::loader) was specified.
    pub fn build(self) -> Arc<Group> {
        let loader = match self.loader {
            Some(loader) => loader,
            None => panic!("Cannot create the group {} without a loader!", self.name),
        };

        let group = Arc::new(Group::new(self.name, self.max_memory, loader));
        if let Some(peers) = self.peers {
            group.register_peers(peers);
        }

        group
    }

    /// Creates the group and registers it in the given registry.
    ///
    /// # Panics
    /// Panics if no loader was specified or if the registry already contains a group with the
    /// same name.
    pub fn install(self, registry: &Registry) -> Arc<Group> {
        let group = self.build();
        registry.register(group.clone());

        group
    }
}
