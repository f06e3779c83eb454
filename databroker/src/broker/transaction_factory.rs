use crate::broker::commit::TransactionCommitter;
use crate::broker::composite::{CompositeTransaction, SubTransactionSource};
use crate::broker::read_only::ReadOnlyTransaction;
use crate::broker::write::{ReadWriteTransaction, WriteOnlyTransaction};
use crate::common::UNSUPPORTED_DATASTORE_MESSAGE;
use crate::data::{LogicalDatastoreType, TransactionId};
use crate::errors::{BrokerError, BrokerResult, ErrorKind};
use crate::store::{
    StoreReadTransaction, StoreReadWriteTransaction, StoreTransactionFactory,
    StoreWriteTransaction,
};
use indexmap::IndexMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Backend transaction factories keyed by logical datastore.
///
/// `F` is either a store or a store transaction chain, so the same map
/// feeds plain and chained composites.
pub(crate) struct DatastoreMap<F: ?Sized> {
    factories: IndexMap<LogicalDatastoreType, Arc<F>>,
}

impl<F: ?Sized + StoreTransactionFactory> DatastoreMap<F> {
    pub(crate) fn new(factories: IndexMap<LogicalDatastoreType, Arc<F>>) -> Self {
        DatastoreMap { factories }
    }

    pub(crate) fn get(&self, store: LogicalDatastoreType) -> BrokerResult<&Arc<F>> {
        self.factories.get(&store).ok_or_else(|| {
            log::debug!("No backend configured for datastore {}", store);
            BrokerError::new(UNSUPPORTED_DATASTORE_MESSAGE, ErrorKind::UnsupportedDatastore)
        })
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Arc<F>> {
        self.factories.values()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl<F: ?Sized + StoreTransactionFactory> SubTransactionSource<dyn StoreReadTransaction>
    for DatastoreMap<F>
{
    fn create(&self, store: LogicalDatastoreType) -> BrokerResult<Arc<dyn StoreReadTransaction>> {
        self.get(store)?.new_read_only_transaction()
    }
}

impl<F: ?Sized + StoreTransactionFactory> SubTransactionSource<dyn StoreWriteTransaction>
    for DatastoreMap<F>
{
    fn create(&self, store: LogicalDatastoreType) -> BrokerResult<Arc<dyn StoreWriteTransaction>> {
        self.get(store)?.new_write_only_transaction()
    }
}

impl<F: ?Sized + StoreTransactionFactory> SubTransactionSource<dyn StoreReadWriteTransaction>
    for DatastoreMap<F>
{
    fn create(
        &self,
        store: LogicalDatastoreType,
    ) -> BrokerResult<Arc<dyn StoreReadWriteTransaction>> {
        self.get(store)?.new_read_write_transaction()
    }
}

pub(crate) type IdSource = Box<dyn Fn() -> TransactionId + Send + Sync>;

/// Hands out composite transactions bound to a full datastore map.
///
/// Sub-transactions are opened lazily on first access to a datastore.
/// Submitted write transactions are committed through `committer`.
pub(crate) struct ForwardedTransactionFactory<F: ?Sized> {
    stores: Arc<DatastoreMap<F>>,
    committer: Arc<dyn TransactionCommitter>,
    id_source: IdSource,
    closed: AtomicBool,
}

impl<F: ?Sized + StoreTransactionFactory + 'static> ForwardedTransactionFactory<F> {
    pub(crate) fn new(
        stores: DatastoreMap<F>,
        committer: Arc<dyn TransactionCommitter>,
        id_source: IdSource,
    ) -> Self {
        ForwardedTransactionFactory {
            stores: Arc::new(stores),
            committer,
            id_source,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn stores(&self) -> &DatastoreMap<F> {
        &self.stores
    }

    pub(crate) fn new_read_only_transaction(&self) -> BrokerResult<ReadOnlyTransaction> {
        let id = self.next_id()?;
        log::debug!("Created read-only transaction {}", id);
        Ok(ReadOnlyTransaction::new(
            CompositeTransaction::<dyn StoreReadTransaction>::new(id, self.stores.clone()),
        ))
    }

    pub(crate) fn new_write_only_transaction(&self) -> BrokerResult<WriteOnlyTransaction> {
        let id = self.next_id()?;
        log::debug!("Created write-only transaction {}", id);
        Ok(WriteOnlyTransaction::new(
            CompositeTransaction::<dyn StoreWriteTransaction>::new(id, self.stores.clone()),
            self.committer.clone(),
        ))
    }

    pub(crate) fn new_read_write_transaction(&self) -> BrokerResult<ReadWriteTransaction> {
        let id = self.next_id()?;
        log::debug!("Created read-write transaction {}", id);
        Ok(ReadWriteTransaction::new(
            CompositeTransaction::<dyn StoreReadWriteTransaction>::new(id, self.stores.clone()),
            self.committer.clone(),
        ))
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn next_id(&self) -> BrokerResult<TransactionId> {
        if self.is_closed() {
            return Err(BrokerError::new("Data broker is closed", ErrorKind::BrokerClosed));
        }
        Ok((self.id_source)())
    }
}
