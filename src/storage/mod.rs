//! Data storage and persistence
//!
//! The sled-backed block store plus the in-memory pools a node keeps while it
//! talks to peers: pending transactions and blocks still to be fetched.

pub mod block_store;
pub mod memory_pool;

pub use block_store::{BlockStore, TIP_BLOCK_HASH_KEY};
pub use memory_pool::{BlockInTransit, MemoryPool};
