use databroker::errors::{BrokerError, ErrorKind};
use databroker::schema::SchemaService;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, PartialEq)]
struct SchemaContext {
    revision: u32,
    modules: Vec<String>,
}

impl SchemaContext {
    fn new(revision: u32, modules: &[&str]) -> Self {
        SchemaContext {
            revision,
            modules: modules.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// A component that is handed the schema service at construction.
struct ModuleTracker {
    modules: Arc<Mutex<Vec<String>>>,
    _registration: databroker::common::ListenerRegistration,
}

impl ModuleTracker {
    fn new(service: &SchemaService<SchemaContext>) -> Self {
        let modules = Arc::new(Mutex::new(Vec::new()));
        let sink = modules.clone();
        let registration = service
            .register_listener(move |ctx: &SchemaContext| {
                *sink.lock() = ctx.modules.clone();
                Ok(())
            })
            .unwrap();
        ModuleTracker {
            modules,
            _registration: registration,
        }
    }

    fn modules(&self) -> Vec<String> {
        self.modules.lock().clone()
    }
}

#[test]
fn test_component_sees_initial_and_updated_context() {
    let service = SchemaService::new(SchemaContext::new(1, &["interfaces"]));
    let tracker = ModuleTracker::new(&service);
    assert_eq!(tracker.modules(), vec!["interfaces"]);

    service.update_context(SchemaContext::new(2, &["interfaces", "routing"]));
    assert_eq!(tracker.modules(), vec!["interfaces", "routing"]);
    assert_eq!(service.current_context().revision, 2);
}

#[test]
fn test_failing_listener_is_isolated() {
    let service = SchemaService::new(SchemaContext::new(1, &[]));
    let _failing = service
        .register_listener(|_: &SchemaContext| Err(BrokerError::new("rejected", ErrorKind::InternalError)))
        .unwrap();
    let tracker = ModuleTracker::new(&service);

    service.update_context(SchemaContext::new(2, &["a"]));
    assert_eq!(tracker.modules(), vec!["a"]);
}

#[test]
fn test_concurrent_updates_end_consistent() {
    let service = SchemaService::new(SchemaContext::new(0, &[]));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _registration = service
        .register_listener(move |ctx: &SchemaContext| {
            sink.lock().push(ctx.revision);
            Ok(())
        })
        .unwrap();

    let handles: Vec<_> = (1..=4)
        .map(|revision| {
            let service = service.clone();
            thread::spawn(move || service.update_context(SchemaContext::new(revision, &[])))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let seen = seen.lock();
    assert_eq!(seen.len(), 5);
    assert_eq!(seen.last().copied(), Some(service.current_context().revision));
}
