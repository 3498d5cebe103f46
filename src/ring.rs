//! Provides a consistent hash ring which maps keys to peers.
//!
//! Each peer (node) is placed on the ring several times - once per **replica** - at the
//! positions `hash("{replica}{name}")`. A key is owned by the node of the first position which is
//! greater than or equal to the hash of the key, wrapping around at the end of the ring. Adding or
//! removing a node therefore only moves the keys which fall between the positions of this node
//! and their predecessors. All other keys keep their owner.
//!
//! By default, positions are computed using the CRC-32 (IEEE) checksum. A custom [HashFn] can be
//! supplied for testing or to match other implementations.
//!
//! # Examples
//!
//! ```
//! # use peercache::ring::HashRing;
//! let mut ring = HashRing::new(50);
//! ring.add(["peer-a", "peer-b", "peer-c"]);
//!
//! let owner = ring.get("Tom").unwrap().to_owned();
//! assert_eq!(ring.get("Tom"), Some(owner.as_str()));
//!
//! // Once the owner leaves, another peer takes over...
//! assert_eq!(ring.remove(&owner), true);
//! assert_ne!(ring.get("Tom"), Some(owner.as_str()));
//! ```
use crc::{Crc, CRC_32_ISO_HDLC};
use fnv::FnvHashMap;

/// Computes the position of a node replica or a key on the ring.
pub type HashFn = fn(&[u8]) -> u32;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Computes the CRC-32 (IEEE) checksum of the given data.
///
/// This is the default [HashFn] of a [HashRing].
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// Maps arbitrary keys to the name of the owning node.
#[derive(Clone)]
pub struct HashRing {
    hash: HashFn,
    replicas: usize,
    positions: Vec<u32>,
    owners: FnvHashMap<u32, String>,
    nodes: Vec<String>,
}

impl HashRing {
    /// Creates an empty ring which places each node **replicas** times using [crc32].
    pub fn new(replicas: usize) -> Self {
        HashRing::with_hash(replicas, crc32)
    }

    /// Creates an empty ring which uses the given hash function to compute positions.
    pub fn with_hash(replicas: usize, hash: HashFn) -> Self {
        HashRing {
            hash,
            replicas: replicas.max(1),
            positions: Vec::new(),
            owners: FnvHashMap::default(),
            nodes: Vec::new(),
        }
    }

    /// Returns the number of virtual positions per node.
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Adds the given nodes to the ring.
    ///
    /// Adding a node which is already present has no effect. If a replica position of a new node
    /// collides with an existing one, the existing owner keeps the position.
    pub fn add<I, S>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for node in nodes {
            let node = node.as_ref();
            if self.contains(node) {
                continue;
            }

            for replica in 0..self.replicas {
                let position = (self.hash)(format!("{}{}", replica, node).as_bytes());
                let _ = self
                    .owners
                    .entry(position)
                    .or_insert_with(|| node.to_owned());
            }
            self.nodes.push(node.to_owned());
        }

        self.rebuild_positions();
    }

    /// Removes the given node and all of its positions from the ring.
    ///
    /// Returns **false** if the node wasn't part of the ring.
    pub fn remove(&mut self, node: &str) -> bool {
        if !self.contains(node) {
            return false;
        }

        self.nodes.retain(|name| name != node);
        self.owners.retain(|_, owner| owner != node);
        self.rebuild_positions();

        true
    }

    fn rebuild_positions(&mut self) {
        self.positions = self.owners.keys().copied().collect();
        self.positions.sort_unstable();
    }

    /// Returns the node which owns the given key or **None** if the ring is empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.positions.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let index = self.positions.partition_point(|position| *position < hash);
        let position = self.positions[index % self.positions.len()];

        self.owners.get(&position).map(String::as_str)
    }

    /// Determines if the given node is part of the ring.
    pub fn contains(&self, node: &str) -> bool {
        self.nodes.iter().any(|name| name == node)
    }

    /// Returns the names of all nodes in the order they were added.
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Returns the number of virtual positions on the ring.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Determines if no node has been added yet.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::ring::{crc32, HashRing};

    fn numeric_hash(data: &[u8]) -> u32 {
        std::str::from_utf8(data).unwrap().parse().unwrap()
    }

    #[test]
    fn keys_map_to_the_next_position() {
        // Using a numeric hash, "6" is placed at 6, 16 and 26, "4" at 4, 14, 24 and "2" at
        // 2, 12 and 22...
        let mut ring = HashRing::with_hash(3, numeric_hash);
        ring.add(["6", "4", "2"]);
        assert_eq!(ring.len(), 9);

        assert_eq!(ring.get("2"), Some("2"));
        assert_eq!(ring.get("11"), Some("2"));
        assert_eq!(ring.get("23"), Some("4"));
        // Wraps around to the first position...
        assert_eq!(ring.get("27"), Some("2"));

        // Adding "8" places it at 8, 18 and 28 so that it now owns 27...
        ring.add(["8"]);
        assert_eq!(ring.get("27"), Some("8"));
        assert_eq!(ring.get("11"), Some("2"));
        assert_eq!(ring.get("23"), Some("4"));

        // ..and removing it restores the previous mapping.
        assert_eq!(ring.remove("8"), true);
        assert_eq!(ring.get("27"), Some("2"));
        assert_eq!(ring.remove("8"), false);
    }

    #[test]
    fn empty_rings_own_nothing() {
        let ring = HashRing::new(10);
        assert_eq!(ring.get("anything"), None);
        assert_eq!(ring.is_empty(), true);
    }

    #[test]
    fn adding_a_node_twice_is_idempotent() {
        let mut ring = HashRing::with_hash(3, numeric_hash);
        ring.add(["6", "4"]);
        ring.add(["4", "6", "4"]);

        assert_eq!(ring.len(), 6);
        assert_eq!(ring.nodes(), &["6".to_owned(), "4".to_owned()]);
    }

    #[test]
    fn lookups_are_deterministic() {
        let mut first = HashRing::new(50);
        first.add(["alpha", "beta", "gamma"]);
        let mut second = HashRing::new(50);
        second.add(["gamma", "alpha", "beta"]);

        for i in 0..1000 {
            let key = format!("key-{}", i);
            assert_eq!(first.get(&key), second.get(&key));
        }
    }

    #[test]
    fn removing_a_node_only_moves_its_keys() {
        let mut ring = HashRing::new(50);
        ring.add(["N1", "N2", "N3"]);

        let keys: Vec<String> = (0..3000).map(|i| format!("key-{}", i)).collect();
        let before: Vec<String> = keys
            .iter()
            .map(|key| ring.get(key).unwrap().to_owned())
            .collect();

        assert_eq!(ring.remove("N2"), true);

        let mut moved = 0;
        for (key, previous_owner) in keys.iter().zip(before.iter()) {
            let owner = ring.get(key).unwrap();
            if previous_owner == "N2" {
                moved += 1;
                assert_ne!(owner, "N2");
            } else {
                assert_eq!(owner, previous_owner.as_str());
            }
        }

        // With 50 replicas, each node should roughly own a third of the keyspace...
        assert_eq!(moved > 500 && moved < 1500, true);
    }

    #[test]
    fn crc32_matches_the_ieee_checksum() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }
}
