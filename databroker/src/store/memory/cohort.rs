use super::data_tree::Modification;
use super::store::StoreCore;
use crate::common::BrokerFuture;
use crate::data::{NormalizedNode, TransactionId};
use crate::errors::{BrokerError, BrokerResult, ErrorKind};
use crate::store::ThreePhaseCommitCohort;
use std::sync::Arc;

/// Commit cohort of one readied in-memory transaction.
///
/// Validation is optimistic: every phase up to and including `commit`
/// checks that the subtrees this transaction modified are unchanged since
/// its base snapshot. A chained transaction first waits for its predecessor
/// to finish, and fails if the predecessor did.
pub(crate) struct InMemoryCohort {
    inner: Arc<CohortInner>,
}

struct CohortInner {
    id: TransactionId,
    store: Arc<StoreCore>,
    base: NormalizedNode,
    modifications: Vec<Modification>,
    predecessor: Option<BrokerFuture<()>>,
    done: BrokerFuture<()>,
}

impl InMemoryCohort {
    pub(crate) fn new(
        id: TransactionId,
        store: Arc<StoreCore>,
        base: NormalizedNode,
        modifications: Vec<Modification>,
        predecessor: Option<BrokerFuture<()>>,
    ) -> Self {
        InMemoryCohort {
            inner: Arc::new(CohortInner {
                id,
                store,
                base,
                modifications,
                predecessor,
                done: BrokerFuture::new(),
            }),
        }
    }

    /// Completes when this cohort has committed or been aborted.
    pub(crate) fn done(&self) -> BrokerFuture<()> {
        self.inner.done.clone()
    }
}

impl CohortInner {
    fn vote(&self) -> BrokerResult<bool> {
        match self.store.conflicting_path(&self.base, &self.modifications)? {
            Some(path) => {
                log::debug!("Transaction {} votes no, {} was modified concurrently", self.id, path);
                Ok(false)
            }
            None => Ok(true),
        }
    }
}

impl ThreePhaseCommitCohort for InMemoryCohort {
    fn can_commit(&self) -> BrokerFuture<bool> {
        let predecessor = match &self.inner.predecessor {
            Some(predecessor) => predecessor.clone(),
            None => {
                return match self.inner.vote() {
                    Ok(vote) => BrokerFuture::completed(vote),
                    Err(e) => BrokerFuture::failed(e),
                }
            }
        };

        let result = BrokerFuture::new();
        let target = result.clone();
        let inner = self.inner.clone();
        predecessor.on_complete(move |outcome| match outcome {
            Ok(()) => {
                target.complete(inner.vote());
            }
            Err(e) => {
                target.set_error(BrokerError::new_with_cause(
                    &format!("Previous transaction in chain failed, {} cannot commit", inner.id),
                    ErrorKind::BackendError,
                    e,
                ));
            }
        });
        result
    }

    fn pre_commit(&self) -> BrokerFuture<()> {
        let inner = &self.inner;
        match inner.store.validate(&inner.id, &inner.base, &inner.modifications) {
            Ok(()) => BrokerFuture::completed(()),
            Err(e) => BrokerFuture::failed(e),
        }
    }

    fn commit(&self) -> BrokerFuture<()> {
        let inner = &self.inner;
        match inner.store.apply(&inner.id, &inner.base, &inner.modifications) {
            Ok(()) => {
                inner.done.set(());
                BrokerFuture::completed(())
            }
            Err(e) => {
                inner.done.set_error(e.clone());
                BrokerFuture::failed(e)
            }
        }
    }

    fn abort(&self) -> BrokerFuture<()> {
        let inner = &self.inner;
        log::debug!("Transaction {} aborted", inner.id);
        inner.done.set_error(BrokerError::new(
            &format!("Transaction {} was aborted", inner.id),
            ErrorKind::BackendError,
        ));
        BrokerFuture::completed(())
    }
}
