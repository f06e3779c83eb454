use crate::broker::data_broker::DataBroker;
use crate::broker::read_only::{closed_error, ReadOnlyTransaction};
use crate::broker::traits::{DataReadTransaction, DataTransaction, DataWriteTransaction};
use crate::broker::write::ReadWriteTransaction;
use crate::common::{BrokerFuture, PING_PONG_ID_PREFIX};
use crate::data::{DataPath, LogicalDatastoreType, NormalizedNode, TransactionId};
use crate::errors::{BrokerError, BrokerResult, ErrorKind};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackendPhase {
    Open,
    Readied,
    Cancelled,
}

/// One backend read-write transaction shared by every frontend handed out
/// while it was open, plus the submit future all of them observe.
struct PingPongBackend {
    delegate: ReadWriteTransaction,
    result: BrokerFuture<()>,
    phase: Mutex<BackendPhase>,
    frontend: Mutex<Option<TransactionId>>,
}

impl PingPongBackend {
    fn is(&self, other: &Arc<PingPongBackend>) -> bool {
        std::ptr::eq(self, Arc::as_ptr(other))
    }
}

enum Slot {
    Idle,
    Open(Arc<PingPongBackend>),
    InFlight(Arc<PingPongBackend>),
}

/// Write-path optimizer in front of a [`DataBroker`].
///
/// Write transactions requested while a previous one is still open are
/// served by the same backend read-write transaction, so a burst of small
/// writes turns into a single commit. At most one backend transaction is in
/// flight at a time; a request made while one is in flight fails with
/// [`InvalidState`](ErrorKind::InvalidState) instead of queuing.
///
/// Slot transitions:
///
/// - `Idle` to `Open` when a write transaction is requested
/// - `Open` to `InFlight` when any frontend submits
/// - `Open` to `Idle` when a frontend cancels
/// - `InFlight` to `Idle` when the commit completes, before the shared
///   submit future is resolved
#[derive(Clone)]
pub struct PingPongDataBroker {
    inner: Arc<PingPongInner>,
}

struct PingPongInner {
    broker: DataBroker,
    slot: Mutex<Slot>,
    frontend_counter: AtomicU64,
    backends_created: AtomicU64,
}

impl PingPongDataBroker {
    pub fn new(broker: DataBroker) -> Self {
        PingPongDataBroker {
            inner: Arc::new(PingPongInner {
                broker,
                slot: Mutex::new(Slot::Idle),
                frontend_counter: AtomicU64::new(0),
                backends_created: AtomicU64::new(0),
            }),
        }
    }

    /// Reads bypass the optimizer.
    pub fn new_read_only_transaction(&self) -> BrokerResult<ReadOnlyTransaction> {
        self.inner.broker.new_read_only_transaction()
    }

    /// Returns a frontend over the currently open backend transaction,
    /// opening one if the slot is idle.
    pub fn new_write_transaction(&self) -> BrokerResult<PingPongTransaction> {
        let backend = {
            let mut slot = self.inner.slot.lock();
            match &*slot {
                Slot::Open(backend) => backend.clone(),
                Slot::InFlight(backend) => {
                    return Err(BrokerError::new(
                        &format!(
                            "Ping-pong transaction {} is still in flight",
                            backend.delegate.identifier()
                        ),
                        ErrorKind::InvalidState,
                    ));
                }
                Slot::Idle => {
                    let backend = Arc::new(PingPongBackend {
                        delegate: self.inner.broker.new_read_write_transaction()?,
                        result: BrokerFuture::new(),
                        phase: Mutex::new(BackendPhase::Open),
                        frontend: Mutex::new(None),
                    });
                    self.inner.backends_created.fetch_add(1, Ordering::Relaxed);
                    log::debug!("Opened ping-pong backend transaction {}", backend.delegate.identifier());
                    *slot = Slot::Open(backend.clone());
                    backend
                }
            }
        };

        let id = TransactionId::with_prefix(
            PING_PONG_ID_PREFIX,
            self.inner.frontend_counter.fetch_add(1, Ordering::Relaxed),
        );
        *backend.frontend.lock() = Some(id.clone());

        Ok(PingPongTransaction {
            id,
            backend,
            owner: Arc::downgrade(&self.inner),
            closed: AtomicBool::new(false),
        })
    }

    /// Number of backend transactions opened so far.
    pub fn backend_transactions_created(&self) -> u64 {
        self.inner.backends_created.load(Ordering::Relaxed)
    }

    /// Identifier of the most recent frontend of the open or in-flight
    /// backend transaction.
    pub fn current_frontend(&self) -> Option<TransactionId> {
        match &*self.inner.slot.lock() {
            Slot::Idle => None,
            Slot::Open(backend) | Slot::InFlight(backend) => backend.frontend.lock().clone(),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(&*self.inner.slot.lock(), Slot::Idle)
    }
}

impl PingPongInner {
    fn submit(self: &Arc<Self>, backend: &Arc<PingPongBackend>) -> BrokerResult<BrokerFuture<()>> {
        {
            let mut slot = self.slot.lock();
            let mut phase = backend.phase.lock();
            match *phase {
                BackendPhase::Readied => return Ok(backend.result.clone()),
                BackendPhase::Cancelled => return Err(closed_error(backend.delegate.identifier())),
                BackendPhase::Open => {
                    *phase = BackendPhase::Readied;
                    if matches!(&*slot, Slot::Open(current) if backend.is(current)) {
                        *slot = Slot::InFlight(backend.clone());
                    }
                }
            }
        }

        let submitted = match backend.delegate.submit() {
            Ok(submitted) => submitted,
            Err(e) => BrokerFuture::failed(e),
        };

        let owner = Arc::downgrade(self);
        let completed = backend.clone();
        submitted.on_complete(move |outcome| {
            if let Some(owner) = owner.upgrade() {
                owner.clear(&completed);
            }
            completed.result.complete(outcome);
        });
        Ok(backend.result.clone())
    }

    fn cancel(&self, backend: &Arc<PingPongBackend>) -> bool {
        {
            let mut slot = self.slot.lock();
            let mut phase = backend.phase.lock();
            if *phase != BackendPhase::Open {
                return false;
            }
            *phase = BackendPhase::Cancelled;
            if matches!(&*slot, Slot::Open(current) if backend.is(current)) {
                *slot = Slot::Idle;
            }
        }

        log::debug!("Cancelling ping-pong backend transaction {}", backend.delegate.identifier());
        backend.delegate.cancel();
        backend.result.set_error(BrokerError::new(
            &format!("Transaction {} was cancelled", backend.delegate.identifier()),
            ErrorKind::AlreadyClosed,
        ));
        true
    }

    fn clear(&self, backend: &Arc<PingPongBackend>) {
        let mut slot = self.slot.lock();
        if matches!(&*slot, Slot::InFlight(current) if backend.is(current)) {
            *slot = Slot::Idle;
        }
    }
}

/// Frontend handed out by [`PingPongDataBroker`].
///
/// Every frontend of the same backend writes into the same backend
/// transaction. Once any of them submits, the others can no longer write
/// and their `submit` returns the shared future.
pub struct PingPongTransaction {
    id: TransactionId,
    backend: Arc<PingPongBackend>,
    owner: Weak<PingPongInner>,
    closed: AtomicBool,
}

impl PingPongTransaction {
    /// Identifier of the backend transaction this frontend writes into.
    pub fn backend_identifier(&self) -> &TransactionId {
        self.backend.delegate.identifier()
    }

    fn check_open(&self) -> BrokerResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error(&self.id));
        }
        Ok(())
    }

    fn seal(&self) -> bool {
        self.closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn owner(&self) -> BrokerResult<Arc<PingPongInner>> {
        self.owner.upgrade().ok_or_else(|| {
            BrokerError::new(
                &format!("Ping-pong broker of transaction {} is gone", self.id),
                ErrorKind::BrokerClosed,
            )
        })
    }
}

impl DataTransaction for PingPongTransaction {
    fn identifier(&self) -> &TransactionId {
        &self.id
    }
}

impl DataReadTransaction for PingPongTransaction {
    fn read(
        &self,
        store: LogicalDatastoreType,
        path: &DataPath,
    ) -> BrokerResult<BrokerFuture<Option<NormalizedNode>>> {
        self.check_open()?;
        self.backend.delegate.read(store, path)
    }

    fn exists(&self, store: LogicalDatastoreType, path: &DataPath) -> BrokerResult<BrokerFuture<bool>> {
        self.check_open()?;
        self.backend.delegate.exists(store, path)
    }
}

impl DataWriteTransaction for PingPongTransaction {
    fn put(&self, store: LogicalDatastoreType, path: &DataPath, data: NormalizedNode) -> BrokerResult<()> {
        self.check_open()?;
        self.backend.delegate.put(store, path, data)
    }

    fn merge(&self, store: LogicalDatastoreType, path: &DataPath, data: NormalizedNode) -> BrokerResult<()> {
        self.check_open()?;
        self.backend.delegate.merge(store, path, data)
    }

    fn delete(&self, store: LogicalDatastoreType, path: &DataPath) -> BrokerResult<()> {
        self.check_open()?;
        self.backend.delegate.delete(store, path)
    }

    fn submit(&self) -> BrokerResult<BrokerFuture<()>> {
        if !self.seal() {
            return Err(closed_error(&self.id));
        }
        self.owner()?.submit(&self.backend)
    }

    /// Discards the shared backend transaction if it is still open. Returns
    /// `false` once any frontend has submitted it.
    fn cancel(&self) -> bool {
        if !self.seal() {
            return false;
        }
        match self.owner() {
            Ok(owner) => owner.cancel(&self.backend),
            Err(_) => false,
        }
    }
}
