use crate::broker::DataBroker;
use crate::broker_config::BrokerConfig;
use crate::data::LogicalDatastoreType;
use crate::errors::{BrokerError, BrokerResult};
use crate::store::{DomStore, DomStoreProvider};

/// Builder for a [`DataBroker`].
///
/// Configuration errors are captured as they happen and returned from
/// [`build`](Self::build); after the first error later calls are ignored.
///
/// # Examples
///
/// ```rust
/// use databroker::broker_builder::DataBrokerBuilder;
/// use databroker::data::LogicalDatastoreType;
/// use databroker::store::{InMemoryDomStore, InMemoryStoreConfig};
///
/// let broker = DataBrokerBuilder::new()
///     .datastore(LogicalDatastoreType::Configuration, InMemoryDomStore::new(InMemoryStoreConfig::named("config")))
///     .datastore(LogicalDatastoreType::Operational, InMemoryDomStore::new(InMemoryStoreConfig::named("oper")))
///     .transaction_id_prefix("TX-")
///     .build()
///     .unwrap();
/// assert_eq!(broker.datastores().len(), 2);
/// ```
#[derive(Default)]
pub struct DataBrokerBuilder {
    error: Option<BrokerError>,
    config: BrokerConfig,
}

impl DataBrokerBuilder {
    pub fn new() -> Self {
        DataBrokerBuilder {
            error: None,
            config: BrokerConfig::new(),
        }
    }

    /// Sets the backend store of `datastore`. Each datastore takes one store.
    pub fn datastore<S: DomStoreProvider + 'static>(mut self, datastore: LogicalDatastoreType, store: S) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.add_datastore(datastore, DomStore::new(store)) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Same as [`datastore`](Self::datastore) for a store handle shared with
    /// other owners.
    pub fn dom_store(mut self, datastore: LogicalDatastoreType, store: DomStore) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.add_datastore(datastore, store) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Enables commit statistics, see [`DataBroker::commit_stats`].
    pub fn commit_stats(mut self, enabled: bool) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_commit_stats(enabled) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn transaction_id_prefix(mut self, prefix: &str) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_transaction_id_prefix(prefix) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn chain_id_prefix(mut self, prefix: &str) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_chain_id_prefix(prefix) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn sharded_id_prefix(mut self, prefix: &str) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_sharded_id_prefix(prefix) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Builds the broker.
    ///
    /// # Errors
    ///
    /// Returns the first error captured while configuring, or an
    /// [`InvalidState`](crate::errors::ErrorKind::InvalidState) error when no
    /// datastore was configured.
    pub fn build(self) -> BrokerResult<DataBroker> {
        if let Some(error) = self.error {
            return Err(error);
        }
        DataBroker::new(self.config)
    }
}
