use super::chain::InMemoryTransactionChain;
use super::config::InMemoryStoreConfig;
use super::data_tree::{apply_all, find_conflict, Modification};
use super::notify::{CommitEventHandler, StoreCommitEvent};
use super::transaction::{InMemoryWriteTransaction, SnapshotReadTransaction};
use crate::common::{
    atomic, Atomic, BrokerEventBus, ListenerRegistration, ReadExecutor, SubscriberRef,
    WriteExecutor,
};
use crate::data::{DataPath, NormalizedNode, TransactionId};
use crate::errors::{BrokerError, BrokerResult, ErrorKind};
use crate::store::{
    DataChangeListener, DataChangeScope, DataTreeChangeListener, DomStoreProvider,
    StoreReadTransaction, StoreReadWriteTransaction, StoreTransactionChain,
    StoreTransactionFactory, StoreWriteTransaction, TreeChangePublisher,
};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Snapshot-isolated in-memory data store.
///
/// # Purpose
///
/// The reference backend of the broker. It keeps one data tree and offers
/// everything a broker needs from a store: snapshot reads, write
/// transactions with three-phase commit cohorts, transaction chains, and
/// change notification.
///
/// # Characteristics
///
/// - **Snapshot reads**: a transaction sees the tree as of its creation,
///   plus its own writes
/// - **Optimistic commits**: a cohort refuses to commit when a path it
///   modified was changed by somebody else since its snapshot
/// - **Rebased apply**: modifications are replayed onto the current tree at
///   commit, so disjoint concurrent transactions both succeed
/// - **Notifications**: every commit is published on the store's event bus
///   after the tree lock is released
///
/// # Examples
///
/// ```rust
/// use databroker::data::{DataPath, NormalizedNode};
/// use databroker::store::{InMemoryDomStore, InMemoryStoreConfig, StoreTransactionFactory};
///
/// let store = InMemoryDomStore::new(InMemoryStoreConfig::named("config"));
/// let tx = store.new_write_only_transaction().unwrap();
/// tx.write(&DataPath::parse("/a"), NormalizedNode::leaf(1)).unwrap();
/// let cohort = tx.ready().unwrap();
/// assert!(cohort.can_commit().get().unwrap());
/// cohort.pre_commit().get().unwrap();
/// cohort.commit().get().unwrap();
/// assert_eq!(store.snapshot().find(&DataPath::parse("/a")), Some(&NormalizedNode::leaf(1)));
/// ```
#[derive(Clone)]
pub struct InMemoryDomStore {
    inner: Arc<StoreCore>,
}

impl InMemoryDomStore {
    pub fn new(config: InMemoryStoreConfig) -> InMemoryDomStore {
        InMemoryDomStore {
            inner: Arc::new(StoreCore::new(config)),
        }
    }

    pub fn config(&self) -> &InMemoryStoreConfig {
        &self.inner.config
    }

    /// The committed tree.
    pub fn snapshot(&self) -> NormalizedNode {
        self.inner.snapshot()
    }

    /// Number of change listeners currently registered.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Closes the store. Further transactions fail; listeners are dropped.
    pub fn close(&self) {
        self.inner.close()
    }
}

impl StoreTransactionFactory for InMemoryDomStore {
    fn new_read_only_transaction(&self) -> BrokerResult<Arc<dyn StoreReadTransaction>> {
        self.inner.check_open()?;
        let id = self.inner.next_transaction_id();
        Ok(Arc::new(SnapshotReadTransaction::new(id, self.inner.snapshot())))
    }

    fn new_write_only_transaction(&self) -> BrokerResult<Arc<dyn StoreWriteTransaction>> {
        Ok(self.inner.new_write_transaction()?)
    }

    fn new_read_write_transaction(&self) -> BrokerResult<Arc<dyn StoreReadWriteTransaction>> {
        Ok(self.inner.new_write_transaction()?)
    }
}

impl DomStoreProvider for InMemoryDomStore {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn create_transaction_chain(&self) -> BrokerResult<Arc<dyn StoreTransactionChain>> {
        self.inner.check_open()?;
        let chain_id = self.inner.chain_counter.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!("Store {} created transaction chain {}", self.inner.name, chain_id);
        Ok(Arc::new(InMemoryTransactionChain::new(chain_id, self.inner.clone())))
    }

    fn register_change_listener(
        &self,
        path: &DataPath,
        listener: DataChangeListener,
        scope: DataChangeScope,
    ) -> BrokerResult<ListenerRegistration> {
        StoreCore::register(
            &self.inner,
            CommitEventHandler::DataChange {
                path: path.clone(),
                scope,
                listener,
            },
        )
    }

    fn tree_change_publisher(&self) -> Option<&dyn TreeChangePublisher> {
        if self.inner.config.tree_change_publishing() {
            Some(self)
        } else {
            None
        }
    }
}

impl TreeChangePublisher for InMemoryDomStore {
    fn register_tree_change_listener(
        &self,
        path: &DataPath,
        listener: DataTreeChangeListener,
    ) -> BrokerResult<ListenerRegistration> {
        StoreCore::register(
            &self.inner,
            CommitEventHandler::TreeChange {
                path: path.clone(),
                listener,
            },
        )
    }
}

pub(crate) struct StoreCore {
    name: String,
    config: InMemoryStoreConfig,
    root: Atomic<NormalizedNode>,
    tx_counter: AtomicU64,
    chain_counter: AtomicU64,
    listener_counter: AtomicU64,
    event_bus: BrokerEventBus<StoreCommitEvent, CommitEventHandler>,
    listeners: DashMap<u64, SubscriberRef>,
    closed: AtomicBool,
}

impl StoreCore {
    fn new(config: InMemoryStoreConfig) -> StoreCore {
        StoreCore {
            name: config.name(),
            config,
            root: atomic(NormalizedNode::container()),
            tx_counter: AtomicU64::new(0),
            chain_counter: AtomicU64::new(0),
            listener_counter: AtomicU64::new(0),
            event_bus: BrokerEventBus::new(),
            listeners: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn next_transaction_id(&self) -> TransactionId {
        let number = self.tx_counter.fetch_add(1, Ordering::Relaxed) + 1;
        TransactionId::new(format!("{}-{}", self.name, number))
    }

    pub(crate) fn snapshot(&self) -> NormalizedNode {
        self.root.read_cloned()
    }

    pub(crate) fn check_open(&self) -> BrokerResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::new(
                &format!("Store {} is closed", self.name),
                ErrorKind::AlreadyClosed,
            ));
        }
        Ok(())
    }

    fn new_write_transaction(self: &Arc<Self>) -> BrokerResult<Arc<InMemoryWriteTransaction>> {
        self.check_open()?;
        let id = self.next_transaction_id();
        Ok(Arc::new(InMemoryWriteTransaction::new(
            id,
            self.clone(),
            self.snapshot(),
            None,
            None,
        )))
    }

    /// Returns the first modified path that changed since `base`.
    pub(crate) fn conflicting_path(
        &self,
        base: &NormalizedNode,
        modifications: &[Modification],
    ) -> BrokerResult<Option<DataPath>> {
        self.check_open()?;
        Ok(self
            .root
            .read_with(|root| find_conflict(base, root, modifications)))
    }

    /// Checks that nothing this transaction touches changed since `base`.
    pub(crate) fn validate(
        &self,
        transaction: &TransactionId,
        base: &NormalizedNode,
        modifications: &[Modification],
    ) -> BrokerResult<()> {
        match self.conflicting_path(base, modifications)? {
            Some(path) => Err(Self::conflict_error(transaction, &path)),
            None => Ok(()),
        }
    }

    /// Validates and applies `modifications` atomically, then notifies
    /// listeners.
    pub(crate) fn apply(
        &self,
        transaction: &TransactionId,
        base: &NormalizedNode,
        modifications: &[Modification],
    ) -> BrokerResult<()> {
        self.check_open()?;
        let event = self.root.write_with(|root| {
            if let Some(path) = find_conflict(base, root, modifications) {
                return Err(Self::conflict_error(transaction, &path));
            }
            let before = root.clone();
            *root = apply_all(root, modifications);
            Ok(StoreCommitEvent {
                before,
                after: root.clone(),
                modified: modifications.iter().map(|m| m.path().clone()).collect(),
            })
        })?;

        log::debug!("Store {} committed transaction {}", self.name, transaction);
        if let Err(e) = self.event_bus.publish(event) {
            log::warn!("Failed to notify listeners of store {}: {}", self.name, e);
        }
        Ok(())
    }

    fn conflict_error(transaction: &TransactionId, path: &DataPath) -> BrokerError {
        BrokerError::new(
            &format!(
                "Optimistic lock failed for transaction {}: {} was modified concurrently",
                transaction, path
            ),
            ErrorKind::BackendError,
        )
    }

    fn register(core: &Arc<StoreCore>, handler: CommitEventHandler) -> BrokerResult<ListenerRegistration> {
        core.check_open()?;
        let description = match &handler {
            CommitEventHandler::DataChange { path, scope, .. } => format!("{}:{} ({:?})", core.name, path, scope),
            CommitEventHandler::TreeChange { path, .. } => format!("{}:{} (tree)", core.name, path),
        };

        let subscriber = core.event_bus.register(handler)?;
        let key = core.listener_counter.fetch_add(1, Ordering::Relaxed);
        core.listeners.insert(key, subscriber);

        let store: Weak<StoreCore> = Arc::downgrade(core);
        Ok(ListenerRegistration::new(&description, move || {
            let Some(store) = store.upgrade() else {
                return Ok(());
            };
            match store.listeners.remove(&key) {
                Some((_, subscriber)) => store.event_bus.deregister(&subscriber),
                None => Ok(()),
            }
        }))
    }

    fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.listeners.clear();
        if let Err(e) = self.event_bus.close() {
            log::warn!("Failed to close event bus of store {}: {}", self.name, e);
        }
        log::debug!("Store {} closed", self.name);
    }
}
