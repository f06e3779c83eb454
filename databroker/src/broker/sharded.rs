use crate::broker::commit::{ready_and_commit, CommitCoordinator};
use crate::broker::read_only::closed_error;
use crate::broker::traits::{DataTransaction, DataWriteTransaction};
use crate::common::{BrokerFuture, UNSUPPORTED_DATASTORE_MESSAGE};
use crate::data::{DataPath, DataTreeIdentifier, LogicalDatastoreType, NormalizedNode, TransactionId};
use crate::errors::{BrokerError, BrokerResult, ErrorKind};
use crate::store::{DomStore, StoreTransaction, StoreTransactionFactory, StoreWriteTransaction};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

struct ProducerState {
    open: Option<TransactionId>,
    closed: bool,
}

/// Writer with exclusive access to a set of disjoint subtrees.
///
/// A producer hands out one [`ShardedWriteTransaction`] at a time. Each
/// modification is routed to the claimed subtree containing its path;
/// paths outside every claim are rejected.
#[derive(Clone)]
pub struct ShardedDataTreeProducer {
    inner: Arc<ProducerInner>,
}

struct ProducerInner {
    claims: Vec<(DataTreeIdentifier, DomStore)>,
    coordinator: CommitCoordinator,
    counter: Arc<AtomicU64>,
    id_prefix: String,
    state: Mutex<ProducerState>,
}

impl ShardedDataTreeProducer {
    pub(crate) fn new(
        subtrees: Vec<DataTreeIdentifier>,
        stores: &IndexMap<LogicalDatastoreType, DomStore>,
        coordinator: CommitCoordinator,
        counter: Arc<AtomicU64>,
        id_prefix: &str,
    ) -> BrokerResult<Self> {
        if subtrees.is_empty() {
            return Err(BrokerError::new(
                "A producer needs at least one subtree",
                ErrorKind::InvalidState,
            ));
        }

        let mut claims: Vec<(DataTreeIdentifier, DomStore)> = Vec::with_capacity(subtrees.len());
        for subtree in subtrees {
            if let Some((claimed, _)) = claims.iter().find(|(claimed, _)| claimed.overlaps(&subtree)) {
                return Err(BrokerError::new(
                    &format!("Subtree {} overlaps with subtree {}", subtree, claimed),
                    ErrorKind::InvalidState,
                ));
            }
            let store = stores.get(&subtree.datastore()).cloned().ok_or_else(|| {
                BrokerError::new(UNSUPPORTED_DATASTORE_MESSAGE, ErrorKind::UnsupportedDatastore)
            })?;
            claims.push((subtree, store));
        }

        Ok(ShardedDataTreeProducer {
            inner: Arc::new(ProducerInner {
                claims,
                coordinator,
                counter,
                id_prefix: id_prefix.to_string(),
                state: Mutex::new(ProducerState {
                    open: None,
                    closed: false,
                }),
            }),
        })
    }

    /// Subtrees claimed by this producer, in claim order.
    pub fn subtrees(&self) -> Vec<DataTreeIdentifier> {
        self.inner.claims.iter().map(|(claim, _)| claim.clone()).collect()
    }

    pub fn create_transaction(&self) -> BrokerResult<ShardedWriteTransaction> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(BrokerError::new("Producer is closed", ErrorKind::AlreadyClosed));
        }
        if let Some(open) = &state.open {
            return Err(BrokerError::new(
                &format!("Transaction {} is still open", open),
                ErrorKind::InvalidState,
            ));
        }

        let id = TransactionId::with_prefix(
            &self.inner.id_prefix,
            self.inner.counter.fetch_add(1, Ordering::SeqCst),
        );
        state.open = Some(id.clone());
        log::debug!("Producer opened sharded transaction {}", id);

        Ok(ShardedWriteTransaction {
            id,
            producer: self.inner.clone(),
            subs: Mutex::new(IndexMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Closes the producer. Fails while a transaction is still open.
    pub fn close(&self) -> BrokerResult<()> {
        let mut state = self.inner.state.lock();
        if let Some(open) = &state.open {
            return Err(BrokerError::new(
                &format!("Producer cannot close, transaction {} is still open", open),
                ErrorKind::InvalidState,
            ));
        }
        state.closed = true;
        Ok(())
    }
}

impl ProducerInner {
    fn transaction_finished(&self, id: &TransactionId) {
        let mut state = self.state.lock();
        if state.open.as_ref() == Some(id) {
            state.open = None;
        }
    }
}

/// Write transaction of a [`ShardedDataTreeProducer`].
///
/// Keeps one backend write transaction per claimed subtree, opened when a
/// path under that subtree is first modified. Submitting commits all of them
/// atomically through the broker's coordinator.
pub struct ShardedWriteTransaction {
    id: TransactionId,
    producer: Arc<ProducerInner>,
    subs: Mutex<IndexMap<usize, Arc<dyn StoreWriteTransaction>>>,
    closed: AtomicBool,
}

impl ShardedWriteTransaction {
    fn lookup(&self, store: LogicalDatastoreType, path: &DataPath) -> BrokerResult<Arc<dyn StoreWriteTransaction>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error(&self.id));
        }

        let target = DataTreeIdentifier::new(store, path.clone());
        let index = self
            .producer
            .claims
            .iter()
            .position(|(claim, _)| claim.contains(&target))
            .ok_or_else(|| {
                BrokerError::new(
                    &format!("Path {} is not accessible from transaction {}", target, self.id),
                    ErrorKind::InaccessiblePath,
                )
            })?;

        let mut subs = self.subs.lock();
        if let Some(sub) = subs.get(&index) {
            return Ok(sub.clone());
        }
        let sub = self.producer.claims[index].1.new_write_only_transaction()?;
        subs.insert(index, sub.clone());
        Ok(sub)
    }

    fn seal(&self) -> bool {
        self.closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn opened(&self) -> Vec<Arc<dyn StoreWriteTransaction>> {
        self.subs.lock().values().cloned().collect()
    }

    fn discard(&self) {
        for sub in self.opened() {
            sub.close();
        }
        self.producer.transaction_finished(&self.id);
    }
}

impl DataTransaction for ShardedWriteTransaction {
    fn identifier(&self) -> &TransactionId {
        &self.id
    }
}

impl DataWriteTransaction for ShardedWriteTransaction {
    fn put(&self, store: LogicalDatastoreType, path: &DataPath, data: NormalizedNode) -> BrokerResult<()> {
        self.lookup(store, path)?.write(path, data)
    }

    fn merge(&self, store: LogicalDatastoreType, path: &DataPath, data: NormalizedNode) -> BrokerResult<()> {
        self.lookup(store, path)?.merge(path, data)
    }

    fn delete(&self, store: LogicalDatastoreType, path: &DataPath) -> BrokerResult<()> {
        self.lookup(store, path)?.delete(path)
    }

    fn submit(&self) -> BrokerResult<BrokerFuture<()>> {
        if !self.seal() {
            return Err(closed_error(&self.id));
        }
        log::debug!("Submitting sharded transaction {}", self.id);
        let result = ready_and_commit(&self.id, &self.opened(), &self.producer.coordinator);
        self.producer.transaction_finished(&self.id);
        Ok(result)
    }

    fn cancel(&self) -> bool {
        if !self.seal() {
            return false;
        }
        log::debug!("Cancelling sharded transaction {}", self.id);
        self.discard();
        true
    }
}

impl Drop for ShardedWriteTransaction {
    fn drop(&mut self) {
        if self.seal() {
            log::debug!("Sharded transaction {} dropped without submit, discarding", self.id);
            self.discard();
        }
    }
}
