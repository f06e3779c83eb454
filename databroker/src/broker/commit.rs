use crate::common::BrokerFuture;
use crate::data::TransactionId;
use crate::errors::{BrokerError, BrokerResult, CommitPhase, ErrorKind};
use crate::store::{StoreWriteTransaction, ThreePhaseCommitCohort};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Commits the cohorts of one submitted transaction.
pub trait TransactionCommitter: Send + Sync {
    fn commit(
        &self,
        id: &TransactionId,
        cohorts: Vec<Arc<dyn ThreePhaseCommitCohort>>,
    ) -> BrokerFuture<()>;

    /// Told when a transaction failed before any cohort existed to commit.
    fn submit_failed(&self, _id: &TransactionId, _cause: &BrokerError) {}
}

/// Aborts every cohort. The returned future always succeeds once all
/// aborts have completed; abort failures are only logged.
pub(crate) fn abort_cohorts(
    id: &TransactionId,
    cohorts: &[Arc<dyn ThreePhaseCommitCohort>],
) -> BrokerFuture<()> {
    let aborts: Vec<BrokerFuture<()>> = cohorts.iter().map(|cohort| cohort.abort()).collect();
    let id = id.clone();
    BrokerFuture::join_all(aborts).map(move |results| {
        for error in results.into_iter().filter_map(Result::err) {
            log::warn!("Abort of transaction {} failed: {}", id, error);
        }
    })
}

/// Readies every sub-transaction in order and hands the cohorts to
/// `committer`.
///
/// If one fails to ready, the cohorts readied so far are aborted, it and the
/// remaining sub-transactions are closed, `committer` is told and the
/// result fails in the submit phase.
pub(crate) fn ready_and_commit<T: ?Sized + StoreWriteTransaction>(
    id: &TransactionId,
    subs: &[Arc<T>],
    committer: &dyn TransactionCommitter,
) -> BrokerFuture<()> {
    let mut cohorts: Vec<Arc<dyn ThreePhaseCommitCohort>> = Vec::with_capacity(subs.len());
    for (index, sub) in subs.iter().enumerate() {
        match sub.ready() {
            Ok(cohort) => cohorts.push(cohort),
            Err(e) => {
                log::warn!("Failed to ready transaction {}, aborting: {}", id, e);
                for unready in &subs[index..] {
                    unready.close();
                }
                let error = BrokerError::new_with_cause(
                    &format!("Transaction {} failed to submit", id),
                    ErrorKind::CommitFailed(CommitPhase::Submit),
                    e,
                );
                committer.submit_failed(id, &error);
                return abort_cohorts(id, &cohorts).and_then(move |_| BrokerFuture::failed(error));
            }
        }
    }
    committer.commit(id, cohorts)
}

/// Snapshot of commit statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitStats {
    pub committed: u64,
    pub failed: u64,
    pub shortest: Option<Duration>,
    pub longest: Option<Duration>,
    pub average: Option<Duration>,
}

#[derive(Default)]
struct CommitStatsTracker {
    stats: Mutex<(CommitStats, Duration)>,
}

impl CommitStatsTracker {
    fn record(&self, elapsed: Duration, succeeded: bool) {
        let mut guard = self.stats.lock();
        let (stats, total) = &mut *guard;
        if !succeeded {
            stats.failed += 1;
            return;
        }

        stats.committed += 1;
        *total += elapsed;
        stats.shortest = Some(stats.shortest.map_or(elapsed, |s| s.min(elapsed)));
        stats.longest = Some(stats.longest.map_or(elapsed, |l| l.max(elapsed)));
        stats.average = u32::try_from(stats.committed)
            .ok()
            .map(|count| *total / count);
    }

    fn snapshot(&self) -> CommitStats {
        self.stats.lock().0
    }
}

/// Drives the three-phase commit protocol over the cohorts of a transaction.
///
/// # Protocol
///
/// 1. `can_commit` is asked of each cohort in order. The first refusal or
///    error aborts every cohort and fails the commit in `canCommit`.
/// 2. `pre_commit` runs in order as well, a failure aborts every cohort.
/// 3. `commit` is issued to all cohorts and the results are gathered. A
///    failure here means some stores may already have applied the change.
///    It is reported as a partial commit and nothing is rolled back.
///
/// No step blocks: each one continues from the completion callback of the
/// previous one.
#[derive(Clone)]
pub struct CommitCoordinator {
    inner: Arc<CommitCoordinatorInner>,
}

struct CommitCoordinatorInner {
    stats: Option<CommitStatsTracker>,
}

impl CommitCoordinator {
    pub fn new(track_stats: bool) -> Self {
        CommitCoordinator {
            inner: Arc::new(CommitCoordinatorInner {
                stats: track_stats.then(CommitStatsTracker::default),
            }),
        }
    }

    /// Commit statistics, if tracking is enabled.
    pub fn commit_stats(&self) -> Option<CommitStats> {
        self.inner.stats.as_ref().map(CommitStatsTracker::snapshot)
    }
}

impl TransactionCommitter for CommitCoordinator {
    fn commit(
        &self,
        id: &TransactionId,
        cohorts: Vec<Arc<dyn ThreePhaseCommitCohort>>,
    ) -> BrokerFuture<()> {
        log::debug!("Transaction {} submitted with {} cohort(s)", id, cohorts.len());
        let started = Instant::now();
        let task = Arc::new(CommitTask {
            id: id.clone(),
            cohorts,
            result: BrokerFuture::new(),
        });

        // the caller only sees the outcome once it is counted
        let result = BrokerFuture::new();
        let target = result.clone();
        let inner = self.inner.clone();
        task.result.on_complete(move |outcome: BrokerResult<()>| {
            if let Some(stats) = &inner.stats {
                stats.record(started.elapsed(), outcome.is_ok());
            }
            target.complete(outcome);
        });

        task.can_commit(0);
        result
    }
}

struct CommitTask {
    id: TransactionId,
    cohorts: Vec<Arc<dyn ThreePhaseCommitCohort>>,
    result: BrokerFuture<()>,
}

impl CommitTask {
    fn can_commit(self: Arc<Self>, index: usize) {
        let Some(cohort) = self.cohorts.get(index).cloned() else {
            self.pre_commit(0);
            return;
        };

        let task = self.clone();
        cohort.can_commit().on_complete(move |vote| match vote {
            Ok(true) => task.can_commit(index + 1),
            Ok(false) => {
                let refusal = BrokerError::new(
                    &format!("Cohort {} of transaction {} refused to commit", index, task.id),
                    ErrorKind::BackendError,
                );
                task.abort(CommitPhase::CanCommit, refusal);
            }
            Err(e) => task.abort(CommitPhase::CanCommit, e),
        });
    }

    fn pre_commit(self: Arc<Self>, index: usize) {
        let Some(cohort) = self.cohorts.get(index).cloned() else {
            self.commit();
            return;
        };

        let task = self.clone();
        cohort.pre_commit().on_complete(move |outcome| match outcome {
            Ok(()) => task.pre_commit(index + 1),
            Err(e) => task.abort(CommitPhase::PreCommit, e),
        });
    }

    fn commit(self: Arc<Self>) {
        let commits: Vec<BrokerFuture<()>> = self.cohorts.iter().map(|cohort| cohort.commit()).collect();
        BrokerFuture::join_all(commits).on_complete(move |outcome| {
            let results = outcome.unwrap_or_default();
            let total = results.len();
            let errors: Vec<BrokerError> = results.into_iter().filter_map(Result::err).collect();
            let failed = errors.len();
            match errors.into_iter().next() {
                None => {
                    log::debug!("Transaction {} committed", self.id);
                    self.result.set(());
                }
                Some(first) => {
                    log::error!(
                        "Transaction {} partially committed, {} of {} cohorts failed to commit: {}",
                        self.id,
                        failed,
                        total,
                        first
                    );
                    self.fail(CommitPhase::Commit, first);
                }
            }
        });
    }

    fn abort(self: Arc<Self>, phase: CommitPhase, cause: BrokerError) {
        log::debug!("Transaction {} failed in {}, aborting: {}", self.id, phase, cause);
        let task = self.clone();
        abort_cohorts(&self.id, &self.cohorts).on_complete(move |_| task.fail(phase, cause));
    }

    fn fail(&self, phase: CommitPhase, cause: BrokerError) {
        self.result.set_error(BrokerError::new_with_cause(
            &format!("Transaction {} failed in {}", self.id, phase),
            ErrorKind::CommitFailed(phase),
            cause,
        ));
    }
}
