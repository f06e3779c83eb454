use databroker::broker::{TransactionChain, TransactionChainListener};
use databroker::common::{BrokerFuture, ListenerRegistration};
use databroker::data::{DataPath, LogicalDatastoreType, NormalizedNode, TransactionId};
use databroker::errors::{BrokerError, BrokerResult, ErrorKind};
use databroker::store::{
    DataChangeListener, DataChangeScope, DomStoreProvider, InMemoryDomStore, InMemoryStoreConfig,
    StoreReadTransaction, StoreReadWriteTransaction, StoreTransaction, StoreTransactionChain,
    StoreTransactionFactory, StoreWriteTransaction, ThreePhaseCommitCohort, TreeChangePublisher,
};
use databroker::DataBroker;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub const CONFIGURATION: LogicalDatastoreType = LogicalDatastoreType::Configuration;
pub const OPERATIONAL: LogicalDatastoreType = LogicalDatastoreType::Operational;

/// Runs a test against a fresh context, then tears the context down even
/// when the test returned an error.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    B: Fn() -> BrokerResult<TestContext>,
    T: Fn(TestContext) -> BrokerResult<()>,
    A: Fn(TestContext) -> BrokerResult<()>,
{
    let ctx = match before() {
        Ok(ctx) => ctx,
        Err(e) => panic!("Before run failed: {:?}", e),
    };

    let outcome = test(ctx.clone());
    let cleanup = after(ctx);

    if let Err(e) = outcome {
        panic!("Test failed: {:?}", e);
    }
    if let Err(e) = cleanup {
        panic!("After run failed: {:?}", e);
    }
}

#[derive(Clone)]
pub struct TestContext {
    broker: DataBroker,
    config_store: RecordingStore,
    oper_store: RecordingStore,
}

impl TestContext {
    pub fn broker(&self) -> DataBroker {
        self.broker.clone()
    }

    pub fn config_store(&self) -> RecordingStore {
        self.config_store.clone()
    }

    pub fn oper_store(&self) -> RecordingStore {
        self.oper_store.clone()
    }

    pub fn store(&self, datastore: LogicalDatastoreType) -> RecordingStore {
        match datastore {
            LogicalDatastoreType::Configuration => self.config_store(),
            LogicalDatastoreType::Operational => self.oper_store(),
        }
    }
}

/// A broker over two recording memory stores, with commit statistics on.
pub fn create_test_context() -> BrokerResult<TestContext> {
    let config_store = RecordingStore::new("config");
    let oper_store = RecordingStore::new("oper");
    let broker = DataBroker::builder()
        .datastore(CONFIGURATION, config_store.clone())
        .datastore(OPERATIONAL, oper_store.clone())
        .commit_stats(true)
        .build()?;
    Ok(TestContext {
        broker,
        config_store,
        oper_store,
    })
}

pub fn cleanup(ctx: TestContext) -> BrokerResult<()> {
    ctx.broker().close();
    Ok(())
}

pub fn path(path: &str) -> DataPath {
    DataPath::parse(path)
}

/// Phases a [`RecordingStore`] saw its cohorts go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CohortCall {
    CanCommit,
    PreCommit,
    Commit,
    Abort,
}

struct RecordingState {
    calls: Mutex<Vec<(TransactionId, CohortCall)>>,
    veto: AtomicBool,
    fail_ready: AtomicBool,
    fail_commit: AtomicBool,
    hold: AtomicBool,
    held: Mutex<Vec<(Arc<dyn ThreePhaseCommitCohort>, BrokerFuture<()>)>>,
    write_transactions: AtomicUsize,
}

/// In-memory store wrapper that records every cohort call and can be told
/// to refuse, fail or hold commits.
#[derive(Clone)]
pub struct RecordingStore {
    memory: InMemoryDomStore,
    state: Arc<RecordingState>,
}

impl RecordingStore {
    pub fn new(name: &str) -> Self {
        RecordingStore {
            memory: InMemoryDomStore::new(InMemoryStoreConfig::named(name)),
            state: Arc::new(RecordingState {
                calls: Mutex::new(Vec::new()),
                veto: AtomicBool::new(false),
                fail_ready: AtomicBool::new(false),
                fail_commit: AtomicBool::new(false),
                hold: AtomicBool::new(false),
                held: Mutex::new(Vec::new()),
                write_transactions: AtomicUsize::new(0),
            }),
        }
    }

    pub fn memory(&self) -> &InMemoryDomStore {
        &self.memory
    }

    /// Committed value at `path`.
    pub fn committed(&self, path: &DataPath) -> Option<NormalizedNode> {
        self.memory.snapshot().find(path).cloned()
    }

    pub fn calls(&self) -> Vec<CohortCall> {
        self.state.calls.lock().iter().map(|(_, call)| *call).collect()
    }

    pub fn calls_for(&self, transaction: &TransactionId) -> Vec<CohortCall> {
        self.state
            .calls
            .lock()
            .iter()
            .filter(|(id, _)| id == transaction)
            .map(|(_, call)| *call)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.calls.lock().clear();
    }

    /// Backend write transactions created so far, chained ones included.
    pub fn write_transactions_created(&self) -> usize {
        self.state.write_transactions.load(Ordering::SeqCst)
    }

    pub fn veto_can_commit(&self, veto: bool) {
        self.state.veto.store(veto, Ordering::SeqCst);
    }

    pub fn fail_ready(&self, fail: bool) {
        self.state.fail_ready.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commit(&self, fail: bool) {
        self.state.fail_commit.store(fail, Ordering::SeqCst);
    }

    pub fn hold_commits(&self, hold: bool) {
        self.state.hold.store(hold, Ordering::SeqCst);
    }

    pub fn held_commits(&self) -> usize {
        self.state.held.lock().len()
    }

    /// Lets every held commit through to the memory store.
    pub fn release_commits(&self) {
        let held: Vec<_> = self.state.held.lock().drain(..).collect();
        for (cohort, result) in held {
            cohort.commit().on_complete(move |outcome| {
                result.complete(outcome);
            });
        }
    }

    /// Fails every held commit without letting it reach the memory store.
    pub fn fail_held_commits(&self) {
        let held: Vec<_> = self.state.held.lock().drain(..).collect();
        for (cohort, result) in held {
            let _ = cohort.abort();
            result.set_error(BrokerError::new("Held commit failed on purpose", ErrorKind::BackendError));
        }
    }

    fn wrap<T: ?Sized>(&self, inner: Arc<T>) -> Arc<RecordingTransaction<T>> {
        self.state.write_transactions.fetch_add(1, Ordering::SeqCst);
        Arc::new(RecordingTransaction {
            inner,
            state: self.state.clone(),
        })
    }
}

impl StoreTransactionFactory for RecordingStore {
    fn new_read_only_transaction(&self) -> BrokerResult<Arc<dyn StoreReadTransaction>> {
        self.memory.new_read_only_transaction()
    }

    fn new_write_only_transaction(&self) -> BrokerResult<Arc<dyn StoreWriteTransaction>> {
        Ok(self.wrap(self.memory.new_write_only_transaction()?))
    }

    fn new_read_write_transaction(&self) -> BrokerResult<Arc<dyn StoreReadWriteTransaction>> {
        Ok(self.wrap(self.memory.new_read_write_transaction()?))
    }
}

impl DomStoreProvider for RecordingStore {
    fn name(&self) -> &str {
        self.memory.name()
    }

    fn create_transaction_chain(&self) -> BrokerResult<Arc<dyn StoreTransactionChain>> {
        Ok(Arc::new(RecordingChain {
            inner: self.memory.create_transaction_chain()?,
            store: self.clone(),
        }))
    }

    fn register_change_listener(
        &self,
        path: &DataPath,
        listener: DataChangeListener,
        scope: DataChangeScope,
    ) -> BrokerResult<ListenerRegistration> {
        self.memory.register_change_listener(path, listener, scope)
    }

    fn tree_change_publisher(&self) -> Option<&dyn TreeChangePublisher> {
        self.memory.tree_change_publisher()
    }
}

struct RecordingChain {
    inner: Arc<dyn StoreTransactionChain>,
    store: RecordingStore,
}

impl StoreTransactionFactory for RecordingChain {
    fn new_read_only_transaction(&self) -> BrokerResult<Arc<dyn StoreReadTransaction>> {
        self.inner.new_read_only_transaction()
    }

    fn new_write_only_transaction(&self) -> BrokerResult<Arc<dyn StoreWriteTransaction>> {
        Ok(self.store.wrap(self.inner.new_write_only_transaction()?))
    }

    fn new_read_write_transaction(&self) -> BrokerResult<Arc<dyn StoreReadWriteTransaction>> {
        Ok(self.store.wrap(self.inner.new_read_write_transaction()?))
    }
}

impl StoreTransactionChain for RecordingChain {
    fn close(&self) {
        self.inner.close()
    }
}

struct RecordingTransaction<T: ?Sized> {
    inner: Arc<T>,
    state: Arc<RecordingState>,
}

impl<T: ?Sized + StoreTransaction> StoreTransaction for RecordingTransaction<T> {
    fn identifier(&self) -> &TransactionId {
        self.inner.identifier()
    }

    fn close(&self) {
        self.inner.close()
    }
}

impl<T: ?Sized + StoreReadTransaction> StoreReadTransaction for RecordingTransaction<T> {
    fn read(&self, path: &DataPath) -> BrokerFuture<Option<NormalizedNode>> {
        self.inner.read(path)
    }

    fn exists(&self, path: &DataPath) -> BrokerFuture<bool> {
        self.inner.exists(path)
    }
}

impl<T: ?Sized + StoreWriteTransaction> StoreWriteTransaction for RecordingTransaction<T> {
    fn write(&self, path: &DataPath, data: NormalizedNode) -> BrokerResult<()> {
        self.inner.write(path, data)
    }

    fn merge(&self, path: &DataPath, data: NormalizedNode) -> BrokerResult<()> {
        self.inner.merge(path, data)
    }

    fn delete(&self, path: &DataPath) -> BrokerResult<()> {
        self.inner.delete(path)
    }

    fn ready(&self) -> BrokerResult<Arc<dyn ThreePhaseCommitCohort>> {
        if self.state.fail_ready.load(Ordering::SeqCst) {
            return Err(BrokerError::new(
                &format!("Transaction {} failed to ready on purpose", self.inner.identifier()),
                ErrorKind::BackendError,
            ));
        }
        let cohort = self.inner.ready()?;
        Ok(Arc::new(RecordingCohort {
            transaction: self.inner.identifier().clone(),
            inner: cohort,
            state: self.state.clone(),
        }))
    }
}

struct RecordingCohort {
    transaction: TransactionId,
    inner: Arc<dyn ThreePhaseCommitCohort>,
    state: Arc<RecordingState>,
}

impl RecordingCohort {
    fn record(&self, call: CohortCall) {
        self.state.calls.lock().push((self.transaction.clone(), call));
    }
}

impl ThreePhaseCommitCohort for RecordingCohort {
    fn can_commit(&self) -> BrokerFuture<bool> {
        self.record(CohortCall::CanCommit);
        let vote = self.inner.can_commit();
        if self.state.veto.load(Ordering::SeqCst) {
            return vote.map(|_| false);
        }
        vote
    }

    fn pre_commit(&self) -> BrokerFuture<()> {
        self.record(CohortCall::PreCommit);
        self.inner.pre_commit()
    }

    fn commit(&self) -> BrokerFuture<()> {
        self.record(CohortCall::Commit);
        if self.state.fail_commit.load(Ordering::SeqCst) {
            let _ = self.inner.abort();
            return BrokerFuture::failed(BrokerError::new(
                &format!("Commit of {} failed on purpose", self.transaction),
                ErrorKind::BackendError,
            ));
        }
        if self.state.hold.load(Ordering::SeqCst) {
            let result = BrokerFuture::new();
            self.state.held.lock().push((self.inner.clone(), result.clone()));
            return result;
        }
        self.inner.commit()
    }

    fn abort(&self) -> BrokerFuture<()> {
        self.record(CohortCall::Abort);
        self.inner.abort()
    }
}

/// Chain listener keeping everything it is told.
#[derive(Default)]
pub struct RecordingChainListener {
    committed: Mutex<Vec<TransactionId>>,
    failed: Mutex<Option<(TransactionId, BrokerError)>>,
    failures: AtomicUsize,
    successful: AtomicUsize,
}

impl RecordingChainListener {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingChainListener::default())
    }

    pub fn committed(&self) -> Vec<TransactionId> {
        self.committed.lock().clone()
    }

    pub fn failure(&self) -> Option<(TransactionId, BrokerError)> {
        self.failed.lock().clone()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn success_count(&self) -> usize {
        self.successful.load(Ordering::SeqCst)
    }
}

impl TransactionChainListener for RecordingChainListener {
    fn on_transaction_committed(&self, _chain: &TransactionChain, transaction: &TransactionId) {
        self.committed.lock().push(transaction.clone());
    }

    fn on_chain_failed(&self, _chain: &TransactionChain, transaction: &TransactionId, cause: &BrokerError) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        *self.failed.lock() = Some((transaction.clone(), cause.clone()));
    }

    fn on_chain_successful(&self, _chain: &TransactionChain) {
        self.successful.fetch_add(1, Ordering::SeqCst);
    }
}
