use crate::broker::composite::CompositeTransaction;
use crate::broker::traits::{DataReadTransaction, DataTransaction};
use crate::common::BrokerFuture;
use crate::data::{DataPath, LogicalDatastoreType, NormalizedNode, TransactionId};
use crate::errors::{BrokerError, BrokerResult, ErrorKind};
use crate::store::StoreReadTransaction;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(crate) fn closed_error(id: &TransactionId) -> BrokerError {
    BrokerError::new(
        &format!("Transaction {} is already closed", id),
        ErrorKind::AlreadyClosed,
    )
}

/// Wraps a backend read failure so the caller sees which transaction and
/// path failed.
pub(crate) fn read_failed(id: &TransactionId, path: &DataPath, cause: BrokerError) -> BrokerError {
    BrokerError::new_with_cause(
        &format!("Read of {} in transaction {} failed", path, id),
        ErrorKind::ReadFailed,
        cause,
    )
}

pub(crate) fn forward_read<S: ?Sized + StoreReadTransaction>(
    id: &TransactionId,
    sub: &S,
    path: &DataPath,
) -> BrokerFuture<Option<NormalizedNode>> {
    let id = id.clone();
    let failed_path = path.clone();
    sub.read(path).map_err(move |e| read_failed(&id, &failed_path, e))
}

pub(crate) fn forward_exists<S: ?Sized + StoreReadTransaction>(
    id: &TransactionId,
    sub: &S,
    path: &DataPath,
) -> BrokerFuture<bool> {
    let id = id.clone();
    let failed_path = path.clone();
    sub.exists(path).map_err(move |e| read_failed(&id, &failed_path, e))
}

/// Read-only transaction spanning every datastore of a broker.
///
/// Each datastore is read through its own snapshot, opened on first access.
pub struct ReadOnlyTransaction {
    composite: CompositeTransaction<dyn StoreReadTransaction>,
    closed: AtomicBool,
}

impl ReadOnlyTransaction {
    pub(crate) fn new(composite: CompositeTransaction<dyn StoreReadTransaction>) -> Self {
        ReadOnlyTransaction {
            composite,
            closed: AtomicBool::new(false),
        }
    }

    /// Closes every opened sub-transaction. Idempotent.
    pub fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            log::debug!("Closing read-only transaction {}", self.composite.id());
            self.composite.close_all();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn sub_transaction(&self, store: LogicalDatastoreType) -> BrokerResult<Arc<dyn StoreReadTransaction>> {
        if self.is_closed() {
            return Err(closed_error(self.composite.id()));
        }
        self.composite.sub_transaction(store)
    }
}

impl DataTransaction for ReadOnlyTransaction {
    fn identifier(&self) -> &TransactionId {
        self.composite.id()
    }
}

impl DataReadTransaction for ReadOnlyTransaction {
    fn read(
        &self,
        store: LogicalDatastoreType,
        path: &DataPath,
    ) -> BrokerResult<BrokerFuture<Option<NormalizedNode>>> {
        let sub = self.sub_transaction(store)?;
        Ok(forward_read(self.composite.id(), sub.as_ref(), path))
    }

    fn exists(&self, store: LogicalDatastoreType, path: &DataPath) -> BrokerResult<BrokerFuture<bool>> {
        let sub = self.sub_transaction(store)?;
        Ok(forward_exists(self.composite.id(), sub.as_ref(), path))
    }
}

impl Drop for ReadOnlyTransaction {
    fn drop(&mut self) {
        self.close();
    }
}
