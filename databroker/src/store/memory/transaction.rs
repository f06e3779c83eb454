use super::chain::ChainCore;
use super::cohort::InMemoryCohort;
use super::data_tree::Modification;
use super::store::StoreCore;
use crate::common::BrokerFuture;
use crate::data::{DataPath, NormalizedNode, TransactionId};
use crate::errors::{BrokerError, BrokerResult, ErrorKind};
use crate::store::{
    StoreReadTransaction, StoreTransaction, StoreWriteTransaction, ThreePhaseCommitCohort,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

fn closed_error(id: &TransactionId) -> BrokerError {
    BrokerError::new(
        &format!("Transaction {} is closed", id),
        ErrorKind::AlreadyClosed,
    )
}

/// Read-only view of the tree as it was when the transaction was created.
pub(crate) struct SnapshotReadTransaction {
    id: TransactionId,
    snapshot: NormalizedNode,
    closed: AtomicBool,
}

impl SnapshotReadTransaction {
    pub(crate) fn new(id: TransactionId, snapshot: NormalizedNode) -> Self {
        SnapshotReadTransaction {
            id,
            snapshot,
            closed: AtomicBool::new(false),
        }
    }
}

impl StoreTransaction for SnapshotReadTransaction {
    fn identifier(&self) -> &TransactionId {
        &self.id
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl StoreReadTransaction for SnapshotReadTransaction {
    fn read(&self, path: &DataPath) -> BrokerFuture<Option<NormalizedNode>> {
        if self.closed.load(Ordering::Acquire) {
            return BrokerFuture::failed(closed_error(&self.id));
        }
        BrokerFuture::completed(self.snapshot.find(path).cloned())
    }

    fn exists(&self, path: &DataPath) -> BrokerFuture<bool> {
        self.read(path).map(|node| node.is_some())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WritePhase {
    Open,
    Ready,
    Closed,
}

struct WriteState {
    phase: WritePhase,
    working: NormalizedNode,
    modifications: Vec<Modification>,
}

/// Write (and read-write) transaction of the in-memory store.
///
/// Records modifications against a private working tree. `ready` hands the
/// recorded modifications to a cohort and seals the transaction.
pub(crate) struct InMemoryWriteTransaction {
    id: TransactionId,
    store: Arc<StoreCore>,
    base: NormalizedNode,
    predecessor: Option<BrokerFuture<()>>,
    chain: Option<Weak<ChainCore>>,
    state: Mutex<WriteState>,
}

impl InMemoryWriteTransaction {
    pub(crate) fn new(
        id: TransactionId,
        store: Arc<StoreCore>,
        base: NormalizedNode,
        predecessor: Option<BrokerFuture<()>>,
        chain: Option<Weak<ChainCore>>,
    ) -> Self {
        InMemoryWriteTransaction {
            id,
            store,
            state: Mutex::new(WriteState {
                phase: WritePhase::Open,
                working: base.clone(),
                modifications: Vec::new(),
            }),
            base,
            predecessor,
            chain,
        }
    }

    fn modify(&self, modification: Modification) -> BrokerResult<()> {
        let mut state = self.state.lock();
        match state.phase {
            WritePhase::Open => {
                state.working = modification.apply(&state.working);
                state.modifications.push(modification);
                Ok(())
            }
            WritePhase::Ready => Err(BrokerError::new(
                &format!("Transaction {} is already readied", self.id),
                ErrorKind::InvalidState,
            )),
            WritePhase::Closed => Err(closed_error(&self.id)),
        }
    }

    fn chain(&self) -> Option<Arc<ChainCore>> {
        self.chain.as_ref().and_then(Weak::upgrade)
    }
}

impl StoreTransaction for InMemoryWriteTransaction {
    fn identifier(&self) -> &TransactionId {
        &self.id
    }

    fn close(&self) {
        let was_open = {
            let mut state = self.state.lock();
            let was_open = state.phase == WritePhase::Open;
            state.phase = WritePhase::Closed;
            state.modifications.clear();
            was_open
        };
        if was_open {
            if let Some(chain) = self.chain() {
                chain.transaction_closed(&self.id);
            }
        }
    }
}

impl StoreReadTransaction for InMemoryWriteTransaction {
    fn read(&self, path: &DataPath) -> BrokerFuture<Option<NormalizedNode>> {
        let state = self.state.lock();
        if state.phase == WritePhase::Closed {
            return BrokerFuture::failed(closed_error(&self.id));
        }
        BrokerFuture::completed(state.working.find(path).cloned())
    }

    fn exists(&self, path: &DataPath) -> BrokerFuture<bool> {
        self.read(path).map(|node| node.is_some())
    }
}

impl StoreWriteTransaction for InMemoryWriteTransaction {
    fn write(&self, path: &DataPath, data: NormalizedNode) -> BrokerResult<()> {
        self.modify(Modification::Write(path.clone(), data))
    }

    fn merge(&self, path: &DataPath, data: NormalizedNode) -> BrokerResult<()> {
        self.modify(Modification::Merge(path.clone(), data))
    }

    fn delete(&self, path: &DataPath) -> BrokerResult<()> {
        self.modify(Modification::Delete(path.clone()))
    }

    fn ready(&self) -> BrokerResult<Arc<dyn ThreePhaseCommitCohort>> {
        let (modifications, working) = {
            let mut state = self.state.lock();
            match state.phase {
                WritePhase::Open => {
                    state.phase = WritePhase::Ready;
                    (std::mem::take(&mut state.modifications), state.working.clone())
                }
                WritePhase::Ready => {
                    return Err(BrokerError::new(
                        &format!("Transaction {} is already readied", self.id),
                        ErrorKind::InvalidState,
                    ))
                }
                WritePhase::Closed => return Err(closed_error(&self.id)),
            }
        };

        let cohort = InMemoryCohort::new(
            self.id.clone(),
            self.store.clone(),
            self.base.clone(),
            modifications,
            self.predecessor.clone(),
        );
        if let Some(chain) = self.chain() {
            chain.transaction_ready(&self.id, working, cohort.done());
        }
        log::debug!("Store {} readied transaction {}", self.store.name(), self.id);
        Ok(Arc::new(cohort))
    }
}
