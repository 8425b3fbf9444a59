use crate::core::Transaction;
use std::collections::{HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

// Neither pool holds anything a panicking writer could leave half-updated,
// so a poisoned lock is simply taken over
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Pending transactions: hex txid -> Transaction. Not persisted.
#[derive(Default)]
pub struct MemoryPool {
    inner: RwLock<HashMap<String, Transaction>>,
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool::default()
    }

    pub fn get(&self, txid_hex: &str) -> Option<Transaction> {
        read(&self.inner).get(txid_hex).cloned()
    }

    pub fn add(&self, tx: Transaction) {
        write(&self.inner).insert(tx.get_id_hex(), tx);
    }

    pub fn contains(&self, txid_hex: &str) -> bool {
        read(&self.inner).contains_key(txid_hex)
    }

    pub fn remove(&self, txid_hex: &str) {
        write(&self.inner).remove(txid_hex);
    }

    /// Evicts every transaction in `txs` that is pooled.
    pub fn remove_all(&self, txs: &[Transaction]) {
        let mut pool = write(&self.inner);
        for tx in txs {
            pool.remove(&tx.get_id_hex());
        }
    }

    pub fn len(&self) -> usize {
        read(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.inner).is_empty()
    }

    pub fn get_all(&self) -> Vec<Transaction> {
        read(&self.inner).values().cloned().collect()
    }
}

/// Block hashes announced by a peer and not requested yet, in announcement order.
#[derive(Default)]
pub struct BlockInTransit {
    inner: RwLock<VecDeque<Vec<u8>>>,
}

impl BlockInTransit {
    pub fn new() -> BlockInTransit {
        BlockInTransit::default()
    }

    /// A new announcement supersedes whatever was still pending.
    pub fn replace(&self, hashes: Vec<Vec<u8>>) {
        *write(&self.inner) = hashes.into();
    }

    pub fn pop_front(&self) -> Option<Vec<u8>> {
        write(&self.inner).pop_front()
    }

    pub fn len(&self) -> usize {
        read(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.inner).is_empty()
    }
}
