use crate::broker::commit::{CommitCoordinator, TransactionCommitter};
use crate::broker::read_only::ReadOnlyTransaction;
use crate::broker::transaction_factory::{DatastoreMap, ForwardedTransactionFactory};
use crate::broker::write::{ReadWriteTransaction, WriteOnlyTransaction};
use crate::common::BrokerFuture;
use crate::data::{LogicalDatastoreType, TransactionId};
use crate::errors::{BrokerError, BrokerResult, ErrorKind};
use crate::store::{StoreTransactionChain, ThreePhaseCommitCohort};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Receives the outcome of the transactions of a [`TransactionChain`].
pub trait TransactionChainListener: Send + Sync {
    fn on_transaction_committed(&self, _chain: &TransactionChain, _transaction: &TransactionId) {}

    /// Called once, for the first transaction of the chain that fails. The
    /// chain refuses new transactions afterwards.
    fn on_chain_failed(&self, chain: &TransactionChain, transaction: &TransactionId, cause: &BrokerError);

    /// Called once the chain is closed and every submitted transaction has
    /// committed.
    fn on_chain_successful(&self, chain: &TransactionChain);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStatus {
    Running,
    Closing,
    Closed,
    Failed,
}

struct ChainState {
    status: ChainStatus,
    outstanding: usize,
    backing_closed: bool,
}

/// Ordered sequence of transactions in which each one observes the
/// submitted state of its predecessor, even before that predecessor has
/// committed.
///
/// The chain holds one backend transaction chain per datastore and builds
/// its composites on top of them. The first failed commit poisons the
/// chain.
#[derive(Clone)]
pub struct TransactionChain {
    inner: Arc<ChainInner>,
}

struct ChainInner {
    id: u64,
    factory: ForwardedTransactionFactory<dyn StoreTransactionChain>,
    listener: Arc<dyn TransactionChainListener>,
    state: Mutex<ChainState>,
}

impl TransactionChain {
    pub(crate) fn new(
        id: u64,
        id_prefix: &str,
        backing: IndexMap<LogicalDatastoreType, Arc<dyn StoreTransactionChain>>,
        coordinator: CommitCoordinator,
        listener: Arc<dyn TransactionChainListener>,
    ) -> Self {
        let prefix = format!("{}{}-", id_prefix, id);
        let counter = AtomicU64::new(0);
        let inner = Arc::new_cyclic(|chain: &Weak<ChainInner>| ChainInner {
            id,
            factory: ForwardedTransactionFactory::new(
                DatastoreMap::new(backing),
                Arc::new(ChainCommitter {
                    chain: chain.clone(),
                    coordinator,
                }),
                Box::new(move || {
                    TransactionId::with_prefix(&prefix, counter.fetch_add(1, Ordering::SeqCst))
                }),
            ),
            listener,
            state: Mutex::new(ChainState {
                status: ChainStatus::Running,
                outstanding: 0,
                backing_closed: false,
            }),
        });
        TransactionChain { inner }
    }

    pub fn identifier(&self) -> u64 {
        self.inner.id
    }

    pub fn status(&self) -> ChainStatus {
        self.inner.state.lock().status
    }

    pub fn new_read_only_transaction(&self) -> BrokerResult<ReadOnlyTransaction> {
        self.check_running()?;
        self.inner.factory.new_read_only_transaction()
    }

    pub fn new_write_only_transaction(&self) -> BrokerResult<WriteOnlyTransaction> {
        self.check_running()?;
        self.inner.factory.new_write_only_transaction()
    }

    pub fn new_read_write_transaction(&self) -> BrokerResult<ReadWriteTransaction> {
        self.check_running()?;
        self.inner.factory.new_read_write_transaction()
    }

    /// Closes the chain and its backend chains. Transactions already
    /// submitted still complete. Idempotent.
    pub fn close(&self) {
        let (close_backing, successful) = {
            let mut state = self.inner.state.lock();
            let successful = match state.status {
                ChainStatus::Running if state.outstanding == 0 => {
                    state.status = ChainStatus::Closed;
                    true
                }
                ChainStatus::Running => {
                    state.status = ChainStatus::Closing;
                    false
                }
                status => {
                    log::debug!("Transaction chain {} is no longer running ({:?})", self.inner.id, status);
                    false
                }
            };
            let close_backing = !state.backing_closed;
            state.backing_closed = true;
            (close_backing, successful)
        };

        if close_backing {
            for backing in self.inner.factory.stores().values() {
                backing.close();
            }
        }
        if successful {
            self.inner.listener.on_chain_successful(self);
        }
    }

    fn check_running(&self) -> BrokerResult<()> {
        match self.inner.state.lock().status {
            ChainStatus::Running => Ok(()),
            ChainStatus::Failed => Err(BrokerError::new(
                &format!("Transaction chain {} has failed", self.inner.id),
                ErrorKind::ChainFailed,
            )),
            ChainStatus::Closing | ChainStatus::Closed => Err(BrokerError::new(
                &format!("Transaction chain {} is closed", self.inner.id),
                ErrorKind::AlreadyClosed,
            )),
        }
    }
}

impl Debug for TransactionChain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionChain")
            .field("id", &self.inner.id)
            .field("status", &self.status())
            .finish()
    }
}

impl ChainInner {
    fn transaction_submitted(&self) {
        self.state.lock().outstanding += 1;
    }

    fn transaction_completed(self: &Arc<Self>, transaction: &TransactionId, outcome: BrokerResult<()>) {
        let chain = TransactionChain { inner: self.clone() };
        match outcome {
            Ok(()) => {
                let successful = {
                    let mut state = self.state.lock();
                    state.outstanding = state.outstanding.saturating_sub(1);
                    if state.status == ChainStatus::Closing && state.outstanding == 0 {
                        state.status = ChainStatus::Closed;
                        true
                    } else {
                        false
                    }
                };
                self.listener.on_transaction_committed(&chain, transaction);
                if successful {
                    self.listener.on_chain_successful(&chain);
                }
            }
            Err(cause) => {
                {
                    let mut state = self.state.lock();
                    state.outstanding = state.outstanding.saturating_sub(1);
                }
                self.transaction_failed(&chain, transaction, &cause);
            }
        }
    }

    fn transaction_failed(&self, chain: &TransactionChain, transaction: &TransactionId, cause: &BrokerError) {
        let first_failure = {
            let mut state = self.state.lock();
            if state.status == ChainStatus::Failed {
                false
            } else {
                state.status = ChainStatus::Failed;
                true
            }
        };
        if first_failure {
            log::warn!("Transaction chain {} failed in transaction {}: {}", self.id, transaction, cause);
            self.listener.on_chain_failed(chain, transaction, cause);
        }
    }
}

/// Commits chained transactions through the broker's coordinator while
/// tracking them on the chain.
struct ChainCommitter {
    chain: Weak<ChainInner>,
    coordinator: CommitCoordinator,
}

impl TransactionCommitter for ChainCommitter {
    fn commit(
        &self,
        id: &TransactionId,
        cohorts: Vec<Arc<dyn ThreePhaseCommitCohort>>,
    ) -> BrokerFuture<()> {
        if let Some(chain) = self.chain.upgrade() {
            chain.transaction_submitted();
        }

        // the chain's state settles before the submitter sees the outcome
        let result = BrokerFuture::new();
        let target = result.clone();
        let chain = self.chain.clone();
        let transaction = id.clone();
        self.coordinator.commit(id, cohorts).on_complete(move |outcome| {
            if let Some(chain) = chain.upgrade() {
                chain.transaction_completed(&transaction, outcome.clone());
            }
            target.complete(outcome);
        });
        result
    }

    fn submit_failed(&self, id: &TransactionId, cause: &BrokerError) {
        if let Some(chain) = self.chain.upgrade() {
            let handle = TransactionChain { inner: chain.clone() };
            chain.transaction_failed(&handle, id, cause);
        }
    }
}
