use crate::data::{LogicalDatastoreType, TransactionId};
use crate::errors::BrokerResult;
use crate::store::StoreTransaction;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Creates the backend sub-transaction of one logical datastore.
pub(crate) trait SubTransactionSource<T: ?Sized>: Send + Sync {
    fn create(&self, store: LogicalDatastoreType) -> BrokerResult<Arc<T>>;
}

/// Bookkeeping shared by every composite transaction: its identifier and at
/// most one backend sub-transaction per datastore, created on first use and
/// kept for the lifetime of the composite.
///
/// Sub-transactions are kept in creation order so cohorts are always readied
/// in the order the datastores were first touched.
pub(crate) struct CompositeTransaction<T: ?Sized> {
    id: TransactionId,
    source: Arc<dyn SubTransactionSource<T>>,
    subs: Mutex<IndexMap<LogicalDatastoreType, Arc<T>>>,
}

impl<T: ?Sized + StoreTransaction> CompositeTransaction<T> {
    pub(crate) fn new(id: TransactionId, source: Arc<dyn SubTransactionSource<T>>) -> Self {
        CompositeTransaction {
            id,
            source,
            subs: Mutex::new(IndexMap::new()),
        }
    }

    pub(crate) fn id(&self) -> &TransactionId {
        &self.id
    }

    pub(crate) fn sub_transaction(&self, store: LogicalDatastoreType) -> BrokerResult<Arc<T>> {
        let mut subs = self.subs.lock();
        if let Some(sub) = subs.get(&store) {
            return Ok(sub.clone());
        }

        let sub = self.source.create(store)?;
        log::debug!(
            "Transaction {} opened sub-transaction {} on {}",
            self.id,
            sub.identifier(),
            store
        );
        subs.insert(store, sub.clone());
        Ok(sub)
    }

    /// Sub-transactions opened so far, in creation order.
    pub(crate) fn opened(&self) -> Vec<Arc<T>> {
        self.subs.lock().values().cloned().collect()
    }

    pub(crate) fn close_all(&self) {
        for sub in self.opened() {
            sub.close();
        }
    }
}
