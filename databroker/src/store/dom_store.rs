use crate::common::{BrokerFuture, ListenerRegistration};
use crate::data::{DataPath, NormalizedNode, TransactionId};
use crate::errors::BrokerResult;
use crate::store::{DataChangeListener, DataChangeScope, DataTreeChangeListener};
use std::ops::Deref;
use std::sync::Arc;

/// Common part of every backend transaction.
pub trait StoreTransaction: Send + Sync {
    fn identifier(&self) -> &TransactionId;

    /// Releases the transaction. Idempotent. Closing a write transaction
    /// before it is readied discards its modifications.
    fn close(&self);
}

/// Read side of a backend transaction.
pub trait StoreReadTransaction: StoreTransaction {
    fn read(&self, path: &DataPath) -> BrokerFuture<Option<NormalizedNode>>;

    fn exists(&self, path: &DataPath) -> BrokerFuture<bool>;
}

/// Write side of a backend transaction.
///
/// Modifications are recorded until [`ready`](Self::ready) seals the
/// transaction and hands back the cohort that commits it.
pub trait StoreWriteTransaction: StoreTransaction {
    fn write(&self, path: &DataPath, data: NormalizedNode) -> BrokerResult<()>;

    fn merge(&self, path: &DataPath, data: NormalizedNode) -> BrokerResult<()>;

    fn delete(&self, path: &DataPath) -> BrokerResult<()>;

    fn ready(&self) -> BrokerResult<Arc<dyn ThreePhaseCommitCohort>>;
}

/// A backend transaction that can both read and write. Reads observe the
/// transaction's own modifications.
pub trait StoreReadWriteTransaction: StoreReadTransaction + StoreWriteTransaction {}

impl<T: StoreReadTransaction + StoreWriteTransaction> StoreReadWriteTransaction for T {}

/// Participant of a three-phase commit, one per readied backend transaction.
///
/// The coordinator calls `can_commit`, then `pre_commit`, then `commit`, or
/// `abort` at any point before `commit`. No call is issued before the
/// future of the previous one completed.
pub trait ThreePhaseCommitCohort: Send + Sync {
    /// Votes on the commit. `false` is a refusal, not an error.
    fn can_commit(&self) -> BrokerFuture<bool>;

    fn pre_commit(&self) -> BrokerFuture<()>;

    fn commit(&self) -> BrokerFuture<()>;

    fn abort(&self) -> BrokerFuture<()>;
}

/// Anything that hands out backend transactions: a store or one of its
/// transaction chains.
pub trait StoreTransactionFactory: Send + Sync {
    fn new_read_only_transaction(&self) -> BrokerResult<Arc<dyn StoreReadTransaction>>;

    fn new_write_only_transaction(&self) -> BrokerResult<Arc<dyn StoreWriteTransaction>>;

    fn new_read_write_transaction(&self) -> BrokerResult<Arc<dyn StoreReadWriteTransaction>>;
}

/// A backend transaction chain. Each transaction observes the readied state
/// of its predecessor and commits after it.
pub trait StoreTransactionChain: StoreTransactionFactory {
    fn close(&self);
}

/// Optional capability of a store: subtree-scoped change notification with
/// before/after snapshots.
pub trait TreeChangePublisher: Send + Sync {
    fn register_tree_change_listener(
        &self,
        path: &DataPath,
        listener: DataTreeChangeListener,
    ) -> BrokerResult<ListenerRegistration>;
}

/// Contract every backend store implements to be fronted by a broker.
pub trait DomStoreProvider: StoreTransactionFactory {
    fn name(&self) -> &str;

    fn create_transaction_chain(&self) -> BrokerResult<Arc<dyn StoreTransactionChain>>;

    fn register_change_listener(
        &self,
        path: &DataPath,
        listener: DataChangeListener,
        scope: DataChangeScope,
    ) -> BrokerResult<ListenerRegistration>;

    /// Returns the tree-change capability, if the store has it.
    fn tree_change_publisher(&self) -> Option<&dyn TreeChangePublisher> {
        None
    }
}

/// Cheaply cloneable handle to a backend store.
#[derive(Clone)]
pub struct DomStore {
    inner: Arc<dyn DomStoreProvider>,
}

impl DomStore {
    pub fn new<T: DomStoreProvider + 'static>(inner: T) -> Self {
        DomStore {
            inner: Arc::new(inner),
        }
    }

    pub fn from_arc(inner: Arc<dyn DomStoreProvider>) -> Self {
        DomStore { inner }
    }

    pub fn provider(&self) -> Arc<dyn DomStoreProvider> {
        self.inner.clone()
    }
}

impl Deref for DomStore {
    type Target = Arc<dyn DomStoreProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
