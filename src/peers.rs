//! Defines how a group talks to the other peers of the fleet.
//!
//! The transport which actually moves a lookup to a remote peer is not part of this crate. A
//! [Group](crate::group::Group) only needs two capabilities:
//! * a [PeerPicker] which determines which peer owns a key and
//! * a [PeerGetter] per remote peer which fetches the value of a key from it.
//!
//! [RingPeerPicker] provides a picker which distributes the keyspace among all peers via a
//! [HashRing](crate::ring::HashRing). The local node is part of the ring as well - keys owned by it
//! are resolved locally.
//!
//! # Examples
//!
//! ```
//! # use std::sync::Arc;
//! # use peercache::peers::{PeerGetter, PeerPicker, RingPeerPicker};
//! struct HttpPeer {
//!     base_url: String,
//! }
//!
//! #[async_trait::async_trait]
//! impl PeerGetter for HttpPeer {
//!     async fn fetch(&self, group: &str, key: &str) -> anyhow::Result<Vec<u8>> {
//!         // Perform the actual request against "{base_url}/{group}/{key}" here...
//!         Err(anyhow::anyhow!("{}/{}/{} is not reachable", self.base_url, group, key))
//!     }
//! }
//!
//! let picker = RingPeerPicker::new("http://10.0.0.1:8001", 50);
//! picker.add_peer("http://10.0.0.2:8001", Arc::new(HttpPeer {
//!     base_url: "http://10.0.0.2:8001".to_owned(),
//! }));
//!
//! // Each key is either owned by the local node (None) or by the other peer...
//! let owner = picker.owner("Tom").unwrap();
//! assert_eq!(picker.pick_peer("Tom").is_some(), owner == "http://10.0.0.2:8001");
//! ```
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::Config;
use crate::ring::HashRing;

/// Fetches values from a single remote peer.
#[async_trait::async_trait]
pub trait PeerGetter: Send + Sync {
    /// Fetches the value of the given key in the given group from the peer.
    ///
    /// Any error makes the calling group fall back to its local loader.
    async fn fetch(&self, group: &str, key: &str) -> anyhow::Result<Vec<u8>>;
}

/// Determines the remote peer which owns a key.
pub trait PeerPicker: Send + Sync {
    /// Returns the peer which owns the given key or **None** if the key is to be resolved
    /// locally (because the local node owns it or because no peers are known).
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>>;
}

/// Contains the number of virtual nodes per peer unless configured otherwise.
pub const DEFAULT_REPLICAS: usize = 50;

/// Picks peers using consistent hashing.
pub struct RingPeerPicker {
    self_name: String,
    state: RwLock<PeerState>,
}

struct PeerState {
    ring: HashRing,
    getters: HashMap<String, Arc<dyn PeerGetter>>,
}

impl RingPeerPicker {
    /// Creates a picker for the local node with the given name.
    ///
    /// The local node is placed on the ring right away, so that it owns its share of keys.
    pub fn new(self_name: impl Into<String>, replicas: usize) -> Self {
        let self_name = self_name.into();
        let mut ring = HashRing::new(replicas);
        ring.add([self_name.as_str()]);

        RingPeerPicker {
            self_name,
            state: RwLock::new(PeerState {
                ring,
                getters: HashMap::new(),
            }),
        }
    }

    /// Creates a picker which reads the number of replicas from **peers.replicas**.
    pub fn from_config(self_name: impl Into<String>, config: &Config) -> Self {
        let replicas = match config.current().query("peers.replicas").as_i64() {
            Some(replicas) if replicas > 0 => replicas as usize,
            Some(replicas) => {
                log::error!(
                    "Invalid number of replicas ({}) - using {}.",
                    replicas,
                    DEFAULT_REPLICAS
                );
                DEFAULT_REPLICAS
            }
            None => DEFAULT_REPLICAS,
        };

        RingPeerPicker::new(self_name, replicas)
    }

    /// Returns the name of the local node.
    pub fn self_name(&self) -> &str {
        &self.self_name
    }

    /// Adds (or replaces) a remote peer.
    pub fn add_peer(&self, name: impl Into<String>, getter: Arc<dyn PeerGetter>) {
        let name = name.into();
        if name == self.self_name {
            log::warn!("Not adding the local node {} as remote peer.", name);
            return;
        }

        let mut state = self.state.write().unwrap();
        state.ring.add([name.as_str()]);
        log::info!(
            "Added peer {} - the ring now contains {} node(s).",
            name,
            state.ring.nodes().len()
        );
        let _ = state.getters.insert(name, getter);
    }

    /// Removes a remote peer so that its keys are redistributed among the remaining nodes.
    ///
    /// Returns **false** if no such peer is known. The local node cannot be removed.
    pub fn remove_peer(&self, name: &str) -> bool {
        if name == self.self_name {
            return false;
        }

        let mut state = self.state.write().unwrap();
        if state.getters.remove(name).is_some() {
            let _ = state.ring.remove(name);
            log::info!("Removed peer {}.", name);
            true
        } else {
            false
        }
    }

    /// Replaces all remote peers at once.
    pub fn set_peers(&self, peers: Vec<(String, Arc<dyn PeerGetter>)>) {
        let mut ring = HashRing::new(self.state.read().unwrap().ring.replicas());
        ring.add([self.self_name.as_str()]);

        let mut getters = HashMap::new();
        for (name, getter) in peers {
            if name != self.self_name {
                ring.add([name.as_str()]);
                let _ = getters.insert(name, getter);
            }
        }

        log::info!(
            "Updated peers - the ring now contains {} node(s).",
            ring.nodes().len()
        );
        *self.state.write().unwrap() = PeerState { ring, getters };
    }

    /// Returns the name of the node (local or remote) which owns the given key.
    pub fn owner(&self, key: &str) -> Option<String> {
        self.state.read().unwrap().ring.get(key).map(str::to_owned)
    }

    /// Returns the names of all nodes on the ring, including the local one.
    pub fn nodes(&self) -> Vec<String> {
        self.state.read().unwrap().ring.nodes().to_vec()
    }
}

impl PeerPicker for RingPeerPicker {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let state = self.state.read().unwrap();
        match state.ring.get(key) {
            Some(owner) if owner != self.self_name => {
                log::debug!("Picked peer {} for '{}'.", owner, key);
                state.getters.get(owner).cloned()
            }
            _ => None,
        }
    }
}
