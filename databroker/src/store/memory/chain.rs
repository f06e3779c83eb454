use super::store::StoreCore;
use super::transaction::{InMemoryWriteTransaction, SnapshotReadTransaction};
use crate::common::BrokerFuture;
use crate::data::{NormalizedNode, TransactionId};
use crate::errors::{BrokerError, BrokerResult, ErrorKind};
use crate::store::{
    StoreReadTransaction, StoreReadWriteTransaction, StoreTransactionChain,
    StoreTransactionFactory, StoreWriteTransaction,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// The last readied transaction of a chain that has not finished committing.
struct ChainTip {
    sequence: u64,
    tree: NormalizedNode,
    done: BrokerFuture<()>,
}

struct ChainState {
    closed: bool,
    open_write: Option<TransactionId>,
    tip: Option<ChainTip>,
    sequence: u64,
}

/// Transaction chain of the in-memory store.
///
/// Every transaction allocated from the chain is based on the tree of the
/// previously readied one, even before that one commits, and its cohort
/// commits only after the predecessor's cohort completed. Only one write
/// transaction may be open at a time.
pub(crate) struct InMemoryTransactionChain {
    inner: Arc<ChainCore>,
}

pub(crate) struct ChainCore {
    id: u64,
    store: Arc<StoreCore>,
    state: Mutex<ChainState>,
}

impl InMemoryTransactionChain {
    pub(crate) fn new(id: u64, store: Arc<StoreCore>) -> Self {
        InMemoryTransactionChain {
            inner: Arc::new(ChainCore {
                id,
                store,
                state: Mutex::new(ChainState {
                    closed: false,
                    open_write: None,
                    tip: None,
                    sequence: 0,
                }),
            }),
        }
    }

    fn new_write_transaction(&self) -> BrokerResult<Arc<InMemoryWriteTransaction>> {
        let (id, base, predecessor) = self.inner.allocate(true)?;
        Ok(Arc::new(InMemoryWriteTransaction::new(
            id,
            self.inner.store.clone(),
            base,
            predecessor,
            Some(Arc::downgrade(&self.inner)),
        )))
    }
}

impl ChainCore {
    fn allocate(
        &self,
        write: bool,
    ) -> BrokerResult<(TransactionId, NormalizedNode, Option<BrokerFuture<()>>)> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(BrokerError::new(
                &format!("Transaction chain {} of store {} is closed", self.id, self.store.name()),
                ErrorKind::AlreadyClosed,
            ));
        }
        if let Some(open) = &state.open_write {
            return Err(BrokerError::new(
                &format!("Previous transaction {} in chain {} is not ready", open, self.id),
                ErrorKind::InvalidState,
            ));
        }
        self.store.check_open()?;

        let id = self.store.next_transaction_id();
        let (base, predecessor) = match &state.tip {
            Some(tip) => (tip.tree.clone(), Some(tip.done.clone())),
            None => (self.store.snapshot(), None),
        };
        if write {
            state.open_write = Some(id.clone());
        }
        Ok((id, base, predecessor))
    }

    pub(crate) fn transaction_ready(
        self: &Arc<Self>,
        id: &TransactionId,
        tree: NormalizedNode,
        done: BrokerFuture<()>,
    ) {
        let sequence = {
            let mut state = self.state.lock();
            if state.open_write.as_ref() == Some(id) {
                state.open_write = None;
            }
            state.sequence += 1;
            let sequence = state.sequence;
            state.tip = Some(ChainTip {
                sequence,
                tree,
                done: done.clone(),
            });
            sequence
        };

        // once the tip has committed the store itself is the better base
        let chain: Weak<ChainCore> = Arc::downgrade(self);
        done.on_complete(move |_| {
            if let Some(chain) = chain.upgrade() {
                let mut state = chain.state.lock();
                if state.tip.as_ref().map(|tip| tip.sequence) == Some(sequence) {
                    state.tip = None;
                }
            }
        });
    }

    pub(crate) fn transaction_closed(&self, id: &TransactionId) {
        let mut state = self.state.lock();
        if state.open_write.as_ref() == Some(id) {
            state.open_write = None;
        }
    }
}

impl StoreTransactionFactory for InMemoryTransactionChain {
    fn new_read_only_transaction(&self) -> BrokerResult<Arc<dyn StoreReadTransaction>> {
        let (id, base, _) = self.inner.allocate(false)?;
        Ok(Arc::new(SnapshotReadTransaction::new(id, base)))
    }

    fn new_write_only_transaction(&self) -> BrokerResult<Arc<dyn StoreWriteTransaction>> {
        Ok(self.new_write_transaction()?)
    }

    fn new_read_write_transaction(&self) -> BrokerResult<Arc<dyn StoreReadWriteTransaction>> {
        Ok(self.new_write_transaction()?)
    }
}

impl StoreTransactionChain for InMemoryTransactionChain {
    fn close(&self) {
        let mut state = self.inner.state.lock();
        if !state.closed {
            state.closed = true;
            log::debug!("Transaction chain {} of store {} closed", self.inner.id, self.inner.store.name());
        }
    }
}
