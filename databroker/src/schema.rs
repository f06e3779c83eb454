//! Holder of the current schema context.
//!
//! The broker treats the schema context as an opaque value. Components that
//! need it get a [`SchemaService`] handed to them at construction time and
//! either read the current snapshot or listen for replacements.

use crate::common::{atomic, Atomic, BrokerEventBus, ListenerRegistration, ReadExecutor, WriteExecutor};
use crate::errors::BrokerResult;
use basu::error::BasuError;
use basu::event::Event;
use basu::Handle;
use parking_lot::ReentrantMutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Callback invoked with every schema context a listener sees.
pub trait SchemaContextCallback<C>: Send + Sync + Fn(&C) -> BrokerResult<()> {}

impl<C, F> SchemaContextCallback<C> for F where F: Send + Sync + Fn(&C) -> BrokerResult<()> {}

struct ContextListener<C> {
    id: u64,
    callback: Arc<dyn SchemaContextCallback<C>>,
}

impl<C> ContextListener<C> {
    fn deliver(&self, context: &C) {
        if let Err(e) = (self.callback)(context) {
            log::warn!("Schema context listener {} failed: {}", self.id, e);
        }
    }
}

impl<C: Send + Sync + 'static> Handle<C> for ContextListener<C> {
    fn handle(&self, event: &Event<C>) -> Result<(), BasuError> {
        self.deliver(&event.data);
        Ok(())
    }
}

/// Injected holder of the current schema context `C`.
///
/// Clones share the same context and listeners.
///
/// # Examples
///
/// ```rust
/// use databroker::schema::SchemaService;
/// use std::sync::{Arc, Mutex};
///
/// let service = SchemaService::new("v1".to_string());
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
/// let registration = service
///     .register_listener(move |ctx: &String| {
///         sink.lock().unwrap().push(ctx.clone());
///         Ok(())
///     })
///     .unwrap();
///
/// service.update_context("v2".to_string());
/// registration.close();
/// service.update_context("v3".to_string());
///
/// assert_eq!(*seen.lock().unwrap(), vec!["v1", "v2"]);
/// assert_eq!(service.current_context(), "v3");
/// ```
#[derive(Clone)]
pub struct SchemaService<C: Clone + Send + Sync + 'static> {
    inner: Arc<SchemaServiceInner<C>>,
}

struct SchemaServiceInner<C: Clone + Send + Sync + 'static> {
    context: Atomic<C>,
    event_bus: BrokerEventBus<C, ContextListener<C>>,
    listener_counter: AtomicU64,
    // orders registrations against updates so no listener misses one
    update_lock: ReentrantMutex<()>,
}

impl<C: Clone + Send + Sync + 'static> SchemaService<C> {
    pub fn new(initial: C) -> Self {
        SchemaService {
            inner: Arc::new(SchemaServiceInner {
                context: atomic(initial),
                event_bus: BrokerEventBus::new(),
                listener_counter: AtomicU64::new(0),
                update_lock: ReentrantMutex::new(()),
            }),
        }
    }

    /// Snapshot of the current context.
    pub fn current_context(&self) -> C {
        self.inner.context.read_cloned()
    }

    /// Registers a listener. It receives the current context right away and
    /// every replacement after that, until the registration is closed.
    pub fn register_listener(
        &self,
        callback: impl SchemaContextCallback<C> + 'static,
    ) -> BrokerResult<ListenerRegistration> {
        let _guard = self.inner.update_lock.lock();
        let listener = ContextListener {
            id: self.inner.listener_counter.fetch_add(1, Ordering::Relaxed),
            callback: Arc::new(callback),
        };
        let id = listener.id;

        listener.deliver(&self.current_context());
        let subscriber = self.inner.event_bus.register(listener)?;

        let service: Weak<SchemaServiceInner<C>> = Arc::downgrade(&self.inner);
        Ok(ListenerRegistration::new(
            &format!("schema context listener {}", id),
            move || match service.upgrade() {
                Some(service) => service.event_bus.deregister(&subscriber),
                None => Ok(()),
            },
        ))
    }

    /// Replaces the current context and notifies every listener.
    pub fn update_context(&self, context: C) {
        let _guard = self.inner.update_lock.lock();
        self.inner.context.swap(context.clone());
        if let Err(e) = self.inner.event_bus.publish(context) {
            log::warn!("Failed to publish schema context update: {}", e);
        }
    }
}
