use crate::common::{atomic, Atomic, ReadExecutor, WriteExecutor, DEFAULT_STORE_NAME};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Configuration of an [`InMemoryDomStore`](super::InMemoryDomStore).
///
/// - `name`: prefix of the store's transaction identifiers, also used in logs
/// - `tree_change_publishing`: whether the store offers the tree-change
///   capability; a broker only exposes its tree-change service when every
///   store does
#[derive(Clone)]
pub struct InMemoryStoreConfig {
    inner: Arc<InMemoryStoreConfigInner>,
}

impl Default for InMemoryStoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStoreConfig {
    pub fn new() -> InMemoryStoreConfig {
        InMemoryStoreConfig {
            inner: Arc::new(InMemoryStoreConfigInner::new()),
        }
    }

    pub fn named(name: &str) -> InMemoryStoreConfig {
        let config = Self::new();
        config.set_name(name);
        config
    }

    pub fn name(&self) -> String {
        self.inner.name.read_cloned()
    }

    pub fn set_name(&self, name: &str) {
        self.inner.name.swap(name.to_string());
    }

    pub fn tree_change_publishing(&self) -> bool {
        self.inner.tree_change_publishing.load(Ordering::Relaxed)
    }

    pub fn set_tree_change_publishing(&self, enabled: bool) {
        self.inner
            .tree_change_publishing
            .store(enabled, Ordering::Relaxed)
    }
}

struct InMemoryStoreConfigInner {
    name: Atomic<String>,
    tree_change_publishing: AtomicBool,
}

impl InMemoryStoreConfigInner {
    fn new() -> InMemoryStoreConfigInner {
        InMemoryStoreConfigInner {
            name: atomic(DEFAULT_STORE_NAME.to_string()),
            tree_change_publishing: AtomicBool::new(true),
        }
    }
}
