//! Configuration management for the data broker.

use crate::common::{
    atomic, Atomic, ReadExecutor, WriteExecutor, CHAIN_ID_PREFIX, SHARDED_ID_PREFIX,
    TRANSACTION_ID_PREFIX,
};
use crate::data::LogicalDatastoreType;
use crate::errors::{BrokerError, BrokerResult, ErrorKind};
use crate::store::DomStore;
use indexmap::IndexMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Broker configuration: the backend store of each logical datastore,
/// identifier prefixes and commit statistics.
///
/// A configuration is frozen once a broker has been built from it; setters
/// fail afterwards.
#[derive(Clone)]
pub struct BrokerConfig {
    inner: Arc<BrokerConfigInner>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerConfig {
    pub fn new() -> Self {
        BrokerConfig {
            inner: Arc::new(BrokerConfigInner::new()),
        }
    }

    /// Configured stores, in registration order.
    pub fn datastores(&self) -> IndexMap<LogicalDatastoreType, DomStore> {
        self.inner.stores.read_cloned()
    }

    /// Registers the backend store of `datastore`.
    ///
    /// # Errors
    ///
    /// Returns error if the datastore already has a store or the
    /// configuration is frozen.
    pub fn add_datastore(&self, datastore: LogicalDatastoreType, store: DomStore) -> BrokerResult<()> {
        self.inner.check_not_configured("add a datastore")?;
        self.inner.stores.write_with(|stores| {
            if stores.contains_key(&datastore) {
                log::error!("Datastore {} is already configured", datastore);
                return Err(BrokerError::new(
                    &format!("Datastore {} is already configured", datastore),
                    ErrorKind::InvalidState,
                ));
            }
            stores.insert(datastore, store);
            Ok(())
        })
    }

    pub fn transaction_id_prefix(&self) -> String {
        self.inner.transaction_id_prefix.read_cloned()
    }

    pub fn set_transaction_id_prefix(&self, prefix: &str) -> BrokerResult<()> {
        self.inner.set_prefix(&self.inner.transaction_id_prefix, prefix)
    }

    pub fn chain_id_prefix(&self) -> String {
        self.inner.chain_id_prefix.read_cloned()
    }

    pub fn set_chain_id_prefix(&self, prefix: &str) -> BrokerResult<()> {
        self.inner.set_prefix(&self.inner.chain_id_prefix, prefix)
    }

    pub fn sharded_id_prefix(&self) -> String {
        self.inner.sharded_id_prefix.read_cloned()
    }

    pub fn set_sharded_id_prefix(&self, prefix: &str) -> BrokerResult<()> {
        self.inner.set_prefix(&self.inner.sharded_id_prefix, prefix)
    }

    pub fn commit_stats(&self) -> bool {
        self.inner.commit_stats.load(Ordering::Relaxed)
    }

    pub fn set_commit_stats(&self, enabled: bool) -> BrokerResult<()> {
        self.inner.check_not_configured("change commit statistics")?;
        self.inner.commit_stats.store(enabled, Ordering::Relaxed);
        Ok(())
    }

    /// Checks the configuration is usable and freezes it.
    pub(crate) fn initialize(&self) -> BrokerResult<()> {
        if self.inner.stores.read_with(|stores| stores.is_empty()) {
            log::error!("No datastore is configured");
            return Err(BrokerError::new(
                "At least one datastore must be configured",
                ErrorKind::InvalidState,
            ));
        }
        self.inner.configured.store(true, Ordering::Relaxed);
        Ok(())
    }
}

struct BrokerConfigInner {
    configured: AtomicBool,
    stores: Atomic<IndexMap<LogicalDatastoreType, DomStore>>,
    transaction_id_prefix: Atomic<String>,
    chain_id_prefix: Atomic<String>,
    sharded_id_prefix: Atomic<String>,
    commit_stats: AtomicBool,
}

impl BrokerConfigInner {
    fn new() -> Self {
        BrokerConfigInner {
            configured: AtomicBool::new(false),
            stores: atomic(IndexMap::new()),
            transaction_id_prefix: atomic(TRANSACTION_ID_PREFIX.to_string()),
            chain_id_prefix: atomic(CHAIN_ID_PREFIX.to_string()),
            sharded_id_prefix: atomic(SHARDED_ID_PREFIX.to_string()),
            commit_stats: AtomicBool::new(false),
        }
    }

    fn check_not_configured(&self, action: &str) -> BrokerResult<()> {
        if self.configured.load(Ordering::Relaxed) {
            log::error!("Cannot {} after the broker is built", action);
            return Err(BrokerError::new(
                &format!("Cannot {} after the broker is built", action),
                ErrorKind::InvalidState,
            ));
        }
        Ok(())
    }

    fn set_prefix(&self, target: &Atomic<String>, prefix: &str) -> BrokerResult<()> {
        self.check_not_configured("change an identifier prefix")?;
        if prefix.is_empty() {
            log::error!("Identifier prefix cannot be empty");
            return Err(BrokerError::new(
                "Identifier prefix cannot be empty",
                ErrorKind::InvalidState,
            ));
        }
        target.swap(prefix.to_string());
        Ok(())
    }
}
