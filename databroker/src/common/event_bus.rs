use crate::common::BROKER_EVENT;
use crate::errors::{BrokerError, BrokerResult, ErrorKind};
use basu::error::BasuError;
use basu::event::Event;
use basu::{EventBus, Handle, HandlerId};
use std::marker::PhantomData;
use std::sync::Arc;

/// Publishes events to the listeners registered on it.
///
/// `BrokerEventBus` is a thin typed layer over a `basu` event bus. All events
/// go through a single topic; the listener type `L` decides how each event is
/// filtered and delivered. The in-memory store uses it to fan commit events
/// out to change listeners and the schema service uses it to push context
/// updates.
///
/// Cloning the bus is cheap; clones publish to the same set of listeners.
///
/// # Example
///
/// ```ignore
/// let event_bus: BrokerEventBus<StoreCommitEvent, CommitEventHandler> = BrokerEventBus::new();
/// let subscriber = event_bus.register(handler)?;
/// event_bus.publish(event)?;
/// event_bus.deregister(subscriber)?;
/// ```
#[derive(Clone)]
pub struct BrokerEventBus<E, L> {
    inner: Arc<BrokerEventBusInner<E, L>>,
}

impl<E, L> Default for BrokerEventBus<E, L>
where
    L: Handle<E> + 'static,
    E: Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E, L> BrokerEventBus<E, L>
where
    L: Handle<E> + 'static,
    E: Send + Sync,
{
    pub fn new() -> Self {
        BrokerEventBus {
            inner: Arc::new(BrokerEventBusInner::new()),
        }
    }

    /// Registers a listener and returns the reference needed to remove it.
    pub fn register(&self, listener: L) -> BrokerResult<SubscriberRef> {
        self.inner.register(listener)
    }

    pub fn deregister(&self, subscriber: &SubscriberRef) -> BrokerResult<()> {
        self.inner.deregister(subscriber)
    }

    /// Publishes an event to all registered listeners.
    ///
    /// Returns immediately when nobody is listening. A failing listener makes
    /// the whole publish fail; callers that fan out best-effort log the error.
    pub fn publish(&self, event: E) -> BrokerResult<()> {
        self.inner.publish(event)
    }

    pub fn close(&self) -> BrokerResult<()> {
        self.inner.close()
    }

    pub fn has_listeners(&self) -> bool {
        self.inner.has_listeners()
    }
}

/// Handle to a listener registered on a [`BrokerEventBus`].
#[derive(Clone)]
pub struct SubscriberRef {
    pub(crate) inner: HandlerId,
}

impl SubscriberRef {
    pub fn new(inner: HandlerId) -> Self {
        SubscriberRef { inner }
    }
}

struct BrokerEventBusInner<E, L> {
    event_bus: EventBus<E>,
    phantom_data: PhantomData<L>,
}

impl<E, L> BrokerEventBusInner<E, L>
where
    L: Handle<E> + 'static,
    E: Send + Sync,
{
    fn new() -> Self {
        BrokerEventBusInner {
            event_bus: EventBus::new(),
            phantom_data: PhantomData,
        }
    }

    fn register(&self, listener: L) -> BrokerResult<SubscriberRef> {
        self.event_bus
            .subscribe(BROKER_EVENT, Box::new(listener))
            .map(SubscriberRef::new)
            .map_err(Self::broker_error)
    }

    #[inline]
    fn deregister(&self, subscriber: &SubscriberRef) -> BrokerResult<()> {
        self.event_bus
            .unsubscribe(BROKER_EVENT, &subscriber.inner)
            .map_err(Self::broker_error)
    }

    #[inline]
    fn publish(&self, event: E) -> BrokerResult<()> {
        let handler_count = match self.event_bus.get_handler_count(BROKER_EVENT) {
            Ok(count) => count,
            Err(BasuError::EventTypeNotFOUND) => return Ok(()),
            Err(e) => return Err(Self::broker_error(e)),
        };

        if handler_count == 0 {
            return Ok(());
        }

        let basu_event = Event::new(event);
        self.event_bus
            .publish(BROKER_EVENT, &basu_event)
            .map_err(Self::broker_error)
    }

    #[inline]
    fn close(&self) -> BrokerResult<()> {
        self.event_bus.clear().map_err(Self::broker_error)
    }

    #[inline]
    fn has_listeners(&self) -> bool {
        match self.event_bus.get_handler_count(BROKER_EVENT) {
            Ok(count) => count > 0,
            Err(BasuError::EventTypeNotFOUND) => false,
            Err(e) => {
                log::warn!("Failed to check listeners: {}, defaulting to false", e);
                false
            }
        }
    }

    fn broker_error(e: BasuError) -> BrokerError {
        match e {
            BasuError::EventTypeNotFOUND => BrokerError::new(
                "Event bus error: no listener is registered for broker events",
                ErrorKind::EventError,
            ),
            BasuError::MutexPoisoned => BrokerError::new(
                "Event bus error: internal mutex poisoned",
                ErrorKind::EventError,
            ),
            BasuError::HandlerError(e) => {
                // handlers wrap a BrokerError, keep it as the cause when we can
                match e.downcast::<BrokerError>() {
                    Ok(cause) => BrokerError::new_with_cause(
                        &format!("Event handler error: {}", cause),
                        ErrorKind::EventError,
                        cause,
                    ),
                    Err(other) => BrokerError::new(
                        &format!("Event handler error: {}", other),
                        ErrorKind::EventError,
                    ),
                }
            }
        }
    }
}
