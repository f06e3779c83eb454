use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::common::{atomic, Atomic};

/// The phase of the commit protocol in which a commit failed.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum CommitPhase {
    /// Readying the sub-transactions into cohorts.
    Submit,
    /// Voting phase, nothing has been made durable yet.
    CanCommit,
    /// Cohorts make their change durable but not yet visible.
    PreCommit,
    /// Cohorts make their change visible. Failures here may leave stores
    /// partially committed.
    Commit,
}

impl Display for CommitPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CommitPhase::Submit => write!(f, "submit"),
            CommitPhase::CanCommit => write!(f, "canCommit"),
            CommitPhase::PreCommit => write!(f, "preCommit"),
            CommitPhase::Commit => write!(f, "commit"),
        }
    }
}

/// Error kinds for broker operations
///
/// Structural kinds (`UnsupportedDatastore`, `AlreadyClosed`, `InaccessiblePath`,
/// `ChainFailed`, `BrokerClosed`, `InvalidState`) are returned synchronously by the
/// operation that detected them. `ReadFailed` and `CommitFailed` are only ever
/// delivered through a [`BrokerFuture`](crate::common::BrokerFuture).
///
/// # Examples
///
/// ```rust
/// use databroker::errors::{BrokerError, BrokerResult, ErrorKind};
///
/// fn example() -> BrokerResult<()> {
///     Err(BrokerError::new("Requested logical data store is not available", ErrorKind::UnsupportedDatastore))
/// }
/// assert!(example().is_err());
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    /// The requested logical datastore is not configured in the broker
    UnsupportedDatastore,
    /// The transaction was already submitted, cancelled or closed
    AlreadyClosed,
    /// No claim of a sharded producer covers the requested path
    InaccessiblePath,
    /// The transaction chain has failed and accepts no new transactions
    ChainFailed,
    /// A backend read failed
    ReadFailed,
    /// The commit protocol failed in the given phase
    CommitFailed(CommitPhase),
    /// The broker has been closed
    BrokerClosed,
    /// The operation is not allowed in the current state of its target
    InvalidState,
    /// Error raised by a backend store
    BackendError,
    /// Error in event processing
    EventError,
    /// A blocking wait on a future did not complete in time
    Timeout,
    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::UnsupportedDatastore => write!(f, "Unsupported datastore"),
            ErrorKind::AlreadyClosed => write!(f, "Already closed"),
            ErrorKind::InaccessiblePath => write!(f, "Inaccessible path"),
            ErrorKind::ChainFailed => write!(f, "Chain failed"),
            ErrorKind::ReadFailed => write!(f, "Read failed"),
            ErrorKind::CommitFailed(phase) => write!(f, "Commit failed in {}", phase),
            ErrorKind::BrokerClosed => write!(f, "Broker closed"),
            ErrorKind::InvalidState => write!(f, "Invalid state"),
            ErrorKind::BackendError => write!(f, "Backend error"),
            ErrorKind::EventError => write!(f, "Event error"),
            ErrorKind::Timeout => write!(f, "Timeout"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom broker error type.
///
/// `BrokerError` carries a message, a kind and an optional cause. It is cheap to
/// clone so that one failure can be handed to every observer of a future.
///
/// # Examples
///
/// ```rust
/// use databroker::errors::{BrokerError, ErrorKind, CommitPhase};
///
/// let cause = BrokerError::new("conflicting modification", ErrorKind::BackendError);
/// let err = BrokerError::new_with_cause("Commit of DOM-1 failed", ErrorKind::CommitFailed(CommitPhase::CanCommit), cause);
/// assert_eq!(err.commit_phase(), Some(CommitPhase::CanCommit));
/// ```
#[derive(Clone)]
pub struct BrokerError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<BrokerError>>,
    backtrace: Atomic<Backtrace>,
}

impl BrokerError {
    /// Creates a new `BrokerError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        BrokerError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: atomic(Backtrace::new_unresolved()),
        }
    }

    /// Creates a new `BrokerError` wrapping the error that caused it.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: BrokerError) -> Self {
        BrokerError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: atomic(Backtrace::new_unresolved()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&BrokerError> {
        self.cause.as_deref()
    }

    /// Walks the cause chain down to the error that started it.
    pub fn root_cause(&self) -> &BrokerError {
        let mut current = self;
        while let Some(cause) = current.cause() {
            current = cause;
        }
        current
    }

    /// Returns the commit phase if this is a commit failure.
    pub fn commit_phase(&self) -> Option<CommitPhase> {
        match self.error_kind {
            ErrorKind::CommitFailed(phase) => Some(phase),
            _ => None,
        }
    }
}

impl Display for BrokerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for BrokerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{} ({})\nCaused by: {:?}", self.message, self.error_kind, cause),
            None => {
                let mut backtrace = self.backtrace.write();
                backtrace.resolve();
                write!(f, "{} ({})\n{:?}", self.message, self.error_kind, backtrace)
            }
        }
    }
}

impl Error for BrokerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

impl From<String> for BrokerError {
    fn from(msg: String) -> Self {
        BrokerError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for BrokerError {
    fn from(msg: &str) -> Self {
        BrokerError::new(msg, ErrorKind::InternalError)
    }
}
