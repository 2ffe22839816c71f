//! hkv-engine - the in-memory storage core: progressive-rehash hash table,
//! order-statistic AVL tree, sorted sets built from the two, a TTL min-heap,
//! a background worker pool for large frees, and the keyspace that ties them
//! together into the `Entry` lifecycle described in spec.md §3-4.
//!
//! This crate is pure data structures plus the pool's worker threads; it
//! never touches a socket. `hkv-server` is the only caller.

pub mod avl;
pub mod hash;
pub mod hmap;
pub mod keyspace;
pub mod pool;
pub mod ttl;
pub mod zset;

pub use keyspace::{glob_match, Keyspace};
pub use pool::ThreadPool;
pub use zset::ZSet;
