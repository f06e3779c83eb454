use crate::broker::chain::{TransactionChain, TransactionChainListener};
use crate::broker::commit::{CommitCoordinator, CommitStats};
use crate::broker::read_only::ReadOnlyTransaction;
use crate::broker::sharded::ShardedDataTreeProducer;
use crate::broker::transaction_factory::{DatastoreMap, ForwardedTransactionFactory};
use crate::broker::tree_change::DataTreeChangeService;
use crate::broker::write::{ReadWriteTransaction, WriteOnlyTransaction};
use crate::broker_builder::DataBrokerBuilder;
use crate::broker_config::BrokerConfig;
use crate::common::{ListenerRegistration, UNSUPPORTED_DATASTORE_MESSAGE};
use crate::data::{DataPath, DataTreeIdentifier, LogicalDatastoreType, TransactionId};
use crate::errors::{BrokerError, BrokerResult, ErrorKind};
use crate::store::{DataChangeListener, DataChangeScope, DomStore, DomStoreProvider, StoreTransactionChain};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

type Closeable = Box<dyn FnOnce() -> BrokerResult<()> + Send>;

/// The data broker: one transaction API over the backend stores of every
/// configured logical datastore.
///
/// # Purpose
///
/// Composite transactions opened here fan out to one backend transaction
/// per datastore they touch, and submitting one commits all of them through
/// the three-phase commit coordinator, so a write spanning CONFIGURATION
/// and OPERATIONAL lands in both stores or in neither (barring a partial
/// commit, which is reported as such).
///
/// # Characteristics
///
/// - **Cheap to clone**: clones share the same stores and counters
/// - **Thread-safe**: every entry point may be called concurrently;
///   individual write transactions are single-writer
/// - **Non-blocking**: reads and submits return [`BrokerFuture`]s
///
/// # Examples
///
/// ```rust
/// use databroker::broker::{DataReadTransaction, DataWriteTransaction};
/// use databroker::data::{DataPath, LogicalDatastoreType, NormalizedNode};
/// use databroker::store::{InMemoryDomStore, InMemoryStoreConfig};
/// use databroker::DataBroker;
///
/// let broker = DataBroker::builder()
///     .datastore(LogicalDatastoreType::Configuration, InMemoryDomStore::new(InMemoryStoreConfig::new()))
///     .build()
///     .unwrap();
///
/// let path = DataPath::parse("/interfaces/eth0");
/// let tx = broker.new_write_only_transaction().unwrap();
/// tx.put(LogicalDatastoreType::Configuration, &path, NormalizedNode::leaf("up")).unwrap();
/// tx.submit().unwrap().get().unwrap();
///
/// let read = broker.new_read_only_transaction().unwrap();
/// let value = read.read(LogicalDatastoreType::Configuration, &path).unwrap().get().unwrap();
/// assert_eq!(value, Some(NormalizedNode::leaf("up")));
/// ```
///
/// [`BrokerFuture`]: crate::common::BrokerFuture
#[derive(Clone)]
pub struct DataBroker {
    inner: Arc<DataBrokerInner>,
}

struct DataBrokerInner {
    config: BrokerConfig,
    stores: IndexMap<LogicalDatastoreType, DomStore>,
    factory: ForwardedTransactionFactory<dyn DomStoreProvider>,
    coordinator: CommitCoordinator,
    tree_change_service: Option<DataTreeChangeService>,
    chain_counter: AtomicU64,
    sharded_counter: Arc<AtomicU64>,
    closeable: Mutex<Option<Closeable>>,
    closed: AtomicBool,
}

impl DataBroker {
    pub fn builder() -> DataBrokerBuilder {
        DataBrokerBuilder::new()
    }

    pub(crate) fn new(config: BrokerConfig) -> BrokerResult<Self> {
        config.initialize()?;

        let stores = config.datastores();
        let coordinator = CommitCoordinator::new(config.commit_stats());
        let providers: IndexMap<LogicalDatastoreType, Arc<dyn DomStoreProvider>> = stores
            .iter()
            .map(|(datastore, store)| (*datastore, store.provider()))
            .collect();

        let prefix = config.transaction_id_prefix();
        let counter = AtomicU64::new(0);
        let factory = ForwardedTransactionFactory::new(
            DatastoreMap::new(providers),
            Arc::new(coordinator.clone()),
            Box::new(move || TransactionId::with_prefix(&prefix, counter.fetch_add(1, Ordering::SeqCst))),
        );
        let tree_change_service = DataTreeChangeService::new(&stores);

        log::debug!(
            "Data broker started with datastores [{}]",
            itertools::join(stores.iter().map(|(ds, store)| format!("{}={}", ds, store.name())), ", ")
        );

        Ok(DataBroker {
            inner: Arc::new(DataBrokerInner {
                config,
                stores,
                factory,
                coordinator,
                tree_change_service,
                chain_counter: AtomicU64::new(0),
                sharded_counter: Arc::new(AtomicU64::new(0)),
                closeable: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    /// Configured datastores, in registration order.
    pub fn datastores(&self) -> Vec<LogicalDatastoreType> {
        self.inner.stores.keys().copied().collect()
    }

    pub fn new_read_only_transaction(&self) -> BrokerResult<ReadOnlyTransaction> {
        self.inner.factory.new_read_only_transaction()
    }

    pub fn new_write_only_transaction(&self) -> BrokerResult<WriteOnlyTransaction> {
        self.inner.factory.new_write_only_transaction()
    }

    pub fn new_read_write_transaction(&self) -> BrokerResult<ReadWriteTransaction> {
        self.inner.factory.new_read_write_transaction()
    }

    /// Creates a transaction chain backed by one store chain per datastore.
    pub fn create_transaction_chain(
        &self,
        listener: Arc<dyn TransactionChainListener>,
    ) -> BrokerResult<TransactionChain> {
        self.check_not_closed()?;

        let mut backing: IndexMap<LogicalDatastoreType, Arc<dyn StoreTransactionChain>> = IndexMap::new();
        for (datastore, store) in &self.inner.stores {
            match store.create_transaction_chain() {
                Ok(chain) => {
                    backing.insert(*datastore, chain);
                }
                Err(e) => {
                    log::warn!("Failed to create a transaction chain on {}: {}", datastore, e);
                    for created in backing.values() {
                        created.close();
                    }
                    return Err(e);
                }
            }
        }

        let id = self.inner.chain_counter.fetch_add(1, Ordering::SeqCst);
        log::debug!("Transaction chain {} created with backing chains on {} datastore(s)", id, backing.len());
        Ok(TransactionChain::new(
            id,
            &self.inner.config.chain_id_prefix(),
            backing,
            self.inner.coordinator.clone(),
            listener,
        ))
    }

    /// Creates a producer with exclusive write access to `subtrees`.
    pub fn create_producer(&self, subtrees: Vec<DataTreeIdentifier>) -> BrokerResult<ShardedDataTreeProducer> {
        self.check_not_closed()?;
        ShardedDataTreeProducer::new(
            subtrees,
            &self.inner.stores,
            self.inner.coordinator.clone(),
            self.inner.sharded_counter.clone(),
            &self.inner.config.sharded_id_prefix(),
        )
    }

    pub fn register_change_listener(
        &self,
        store: LogicalDatastoreType,
        path: &DataPath,
        listener: DataChangeListener,
        scope: DataChangeScope,
    ) -> BrokerResult<ListenerRegistration> {
        self.check_not_closed()?;
        let backend = self.inner.stores.get(&store).ok_or_else(|| {
            BrokerError::new(UNSUPPORTED_DATASTORE_MESSAGE, ErrorKind::UnsupportedDatastore)
        })?;
        backend.register_change_listener(path, listener, scope)
    }

    /// Tree change notification, present only when every store supports it.
    pub fn tree_change_service(&self) -> Option<&DataTreeChangeService> {
        self.inner.tree_change_service.as_ref()
    }

    /// Commit statistics, if enabled in the configuration.
    pub fn commit_stats(&self) -> Option<CommitStats> {
        self.inner.coordinator.commit_stats()
    }

    /// Sets a hook run once when the broker closes.
    pub fn set_closeable<F>(&self, closeable: F)
    where
        F: FnOnce() -> BrokerResult<()> + Send + 'static,
    {
        *self.inner.closeable.lock() = Some(Box::new(closeable));
    }

    /// Closes the broker. New transactions fail with
    /// [`BrokerClosed`](ErrorKind::BrokerClosed); transactions already
    /// submitted still complete. Idempotent.
    pub fn close(&self) {
        if self
            .inner
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        self.inner.factory.close();
        let closeable = self.inner.closeable.lock().take();
        if let Some(closeable) = closeable {
            if let Err(e) = closeable() {
                log::debug!("Error closing instance: {}", e);
            }
        }
        log::debug!("Data broker closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn check_not_closed(&self) -> BrokerResult<()> {
        if self.is_closed() {
            return Err(BrokerError::new("Data broker is closed", ErrorKind::BrokerClosed));
        }
        Ok(())
    }
}
