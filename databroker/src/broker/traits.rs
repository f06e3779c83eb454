use crate::common::BrokerFuture;
use crate::data::{DataPath, LogicalDatastoreType, NormalizedNode, TransactionId};
use crate::errors::BrokerResult;

/// Common part of every broker-level transaction.
pub trait DataTransaction: Send + Sync {
    fn identifier(&self) -> &TransactionId;
}

/// Reads across the logical datastores of a broker.
///
/// Structural failures (closed transaction, unknown datastore) are returned
/// directly. Backend failures surface through the returned future as
/// [`ReadFailed`](crate::errors::ErrorKind::ReadFailed).
pub trait DataReadTransaction: DataTransaction {
    fn read(
        &self,
        store: LogicalDatastoreType,
        path: &DataPath,
    ) -> BrokerResult<BrokerFuture<Option<NormalizedNode>>>;

    fn exists(&self, store: LogicalDatastoreType, path: &DataPath) -> BrokerResult<BrokerFuture<bool>>;
}

/// Writes across the logical datastores of a broker, committed atomically
/// by [`submit`](Self::submit).
pub trait DataWriteTransaction: DataTransaction {
    fn put(&self, store: LogicalDatastoreType, path: &DataPath, data: NormalizedNode) -> BrokerResult<()>;

    fn merge(&self, store: LogicalDatastoreType, path: &DataPath, data: NormalizedNode) -> BrokerResult<()>;

    fn delete(&self, store: LogicalDatastoreType, path: &DataPath) -> BrokerResult<()>;

    /// Seals the transaction and starts the commit. Valid exactly once.
    fn submit(&self) -> BrokerResult<BrokerFuture<()>>;

    /// Discards the transaction. Returns `false` if it was already submitted
    /// or cancelled.
    fn cancel(&self) -> bool;
}

/// A transaction that both reads and writes. Reads observe the
/// transaction's own modifications.
pub trait DataReadWriteTransaction: DataReadTransaction + DataWriteTransaction {}

impl<T: DataReadTransaction + DataWriteTransaction> DataReadWriteTransaction for T {}
