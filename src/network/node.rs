use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Peers this node gossips with, in the order they became known.
#[derive(Default)]
pub struct Nodes {
    inner: RwLock<Vec<String>>,
}

impl Nodes {
    pub fn new() -> Nodes {
        Nodes::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<String>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<String>> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_node(&self, addr: &str) {
        let mut inner = self.write();
        if !inner.iter().any(|known| known == addr) {
            inner.push(addr.to_string());
        }
    }

    pub fn evict_node(&self, addr: &str) {
        self.write().retain(|known| known != addr);
    }

    pub fn get_nodes(&self) -> Vec<String> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn node_is_known(&self, addr: &str) -> bool {
        self.read().iter().any(|known| known == addr)
    }
}
