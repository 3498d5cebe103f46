//! Provides a memory constrained LRU cache.
//!
//! Each [Group](crate::group::Group) keeps its locally owned entries in an [LRUCache]. The cache
//! accounts the length of each key plus the [ByteSize] of its value against a fixed budget and
//! drops the least recently used entries once an insertion exceeds it. Both reads and writes
//! count as a "use".
pub use lru_cache::ByteSize;
pub use lru_cache::EvictionCallback;
pub use lru_cache::LRUCache;

mod lru_cache;
