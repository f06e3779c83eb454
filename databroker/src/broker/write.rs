use crate::broker::commit::{ready_and_commit, TransactionCommitter};
use crate::broker::composite::CompositeTransaction;
use crate::broker::read_only::{closed_error, forward_exists, forward_read};
use crate::broker::traits::{DataReadTransaction, DataTransaction, DataWriteTransaction};
use crate::common::BrokerFuture;
use crate::data::{DataPath, LogicalDatastoreType, NormalizedNode, TransactionId};
use crate::errors::BrokerResult;
use crate::store::{StoreReadWriteTransaction, StoreWriteTransaction};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Write transaction forwarding to one backend sub-transaction per
/// datastore.
///
/// The transaction is single-writer. Only `submit` and `cancel` race
/// safely against each other: whichever flips the closed flag first wins.
pub struct ForwardedWriteTransaction<T: ?Sized + StoreWriteTransaction> {
    composite: CompositeTransaction<T>,
    committer: Arc<dyn TransactionCommitter>,
    closed: AtomicBool,
}

/// Write-only composite transaction.
pub type WriteOnlyTransaction = ForwardedWriteTransaction<dyn StoreWriteTransaction>;

/// Read-write composite transaction. Reads see the transaction's own writes.
pub type ReadWriteTransaction = ForwardedWriteTransaction<dyn StoreReadWriteTransaction>;

impl<T: ?Sized + StoreWriteTransaction> ForwardedWriteTransaction<T> {
    pub(crate) fn new(composite: CompositeTransaction<T>, committer: Arc<dyn TransactionCommitter>) -> Self {
        ForwardedWriteTransaction {
            composite,
            committer,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn open_sub_transaction(&self, store: LogicalDatastoreType) -> BrokerResult<Arc<T>> {
        if self.is_closed() {
            return Err(closed_error(self.composite.id()));
        }
        self.composite.sub_transaction(store)
    }

    fn seal(&self) -> bool {
        self.closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl<T: ?Sized + StoreWriteTransaction> DataTransaction for ForwardedWriteTransaction<T> {
    fn identifier(&self) -> &TransactionId {
        self.composite.id()
    }
}

impl<T: ?Sized + StoreWriteTransaction> DataWriteTransaction for ForwardedWriteTransaction<T> {
    fn put(&self, store: LogicalDatastoreType, path: &DataPath, data: NormalizedNode) -> BrokerResult<()> {
        self.open_sub_transaction(store)?.write(path, data)
    }

    fn merge(&self, store: LogicalDatastoreType, path: &DataPath, data: NormalizedNode) -> BrokerResult<()> {
        self.open_sub_transaction(store)?.merge(path, data)
    }

    fn delete(&self, store: LogicalDatastoreType, path: &DataPath) -> BrokerResult<()> {
        self.open_sub_transaction(store)?.delete(path)
    }

    fn submit(&self) -> BrokerResult<BrokerFuture<()>> {
        if !self.seal() {
            return Err(closed_error(self.composite.id()));
        }
        log::debug!("Submitting transaction {}", self.composite.id());
        Ok(ready_and_commit(
            self.composite.id(),
            &self.composite.opened(),
            self.committer.as_ref(),
        ))
    }

    fn cancel(&self) -> bool {
        if !self.seal() {
            return false;
        }
        log::debug!("Cancelling transaction {}", self.composite.id());
        self.composite.close_all();
        true
    }
}

/// Dropping a transaction that was neither submitted nor cancelled discards
/// its modifications.
impl<T: ?Sized + StoreWriteTransaction> Drop for ForwardedWriteTransaction<T> {
    fn drop(&mut self) {
        if self.seal() {
            log::debug!("Transaction {} dropped without submit, discarding", self.composite.id());
            self.composite.close_all();
        }
    }
}

impl DataReadTransaction for ReadWriteTransaction {
    fn read(
        &self,
        store: LogicalDatastoreType,
        path: &DataPath,
    ) -> BrokerResult<BrokerFuture<Option<NormalizedNode>>> {
        let sub = self.open_sub_transaction(store)?;
        Ok(forward_read(self.composite.id(), sub.as_ref(), path))
    }

    fn exists(&self, store: LogicalDatastoreType, path: &DataPath) -> BrokerResult<BrokerFuture<bool>> {
        let sub = self.open_sub_transaction(store)?;
        Ok(forward_exists(self.composite.id(), sub.as_ref(), path))
    }
}
