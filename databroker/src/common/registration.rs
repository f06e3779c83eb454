use crate::errors::BrokerResult;
use parking_lot::Mutex;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Unregister = Box<dyn FnOnce() -> BrokerResult<()> + Send>;

/// Handle returned by every listener registration in the broker.
///
/// Closing the registration removes the listener. The removal runs at most
/// once no matter how many clones call [`close`](Self::close); failures are
/// logged and swallowed since there is nobody left to report them to.
#[derive(Clone)]
pub struct ListenerRegistration {
    inner: Arc<ListenerRegistrationInner>,
}

struct ListenerRegistrationInner {
    description: String,
    closed: AtomicBool,
    unregister: Mutex<Option<Unregister>>,
}

impl ListenerRegistration {
    pub fn new<F>(description: &str, unregister: F) -> Self
    where
        F: FnOnce() -> BrokerResult<()> + Send + 'static,
    {
        ListenerRegistration {
            inner: Arc::new(ListenerRegistrationInner {
                description: description.to_string(),
                closed: AtomicBool::new(false),
                unregister: Mutex::new(Some(Box::new(unregister))),
            }),
        }
    }

    pub fn description(&self) -> &str {
        &self.inner.description
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        if self
            .inner
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let unregister = self.inner.unregister.lock().take();
        if let Some(unregister) = unregister {
            if let Err(e) = unregister() {
                log::warn!("Failed to unregister listener {}: {}", self.inner.description, e);
            }
        }
    }
}

impl Debug for ListenerRegistration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("description", &self.inner.description)
            .field("closed", &self.is_closed())
            .finish()
    }
}
