use databroker::broker::DataWriteTransaction;
use databroker::data::{DataTreeIdentifier, LogicalDatastoreType, NormalizedNode};
use databroker::errors::ErrorKind;
use databroker::store::{
    DataChangeEvent, DataChangeListener, DataChangeScope, DataTreeCandidate, DataTreeChangeListener,
    InMemoryDomStore, InMemoryStoreConfig, ModificationType,
};
use databroker::DataBroker;
use databroker_int_test::test_util::{cleanup, create_test_context, path, run_test, CONFIGURATION, OPERATIONAL};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn recorder() -> (Arc<Mutex<Vec<DataChangeEvent>>>, DataChangeListener) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let listener = DataChangeListener::new(move |event| {
        sink.lock().push(event);
        Ok(())
    });
    (events, listener)
}

#[test]
fn test_subtree_listener_notified_once() {
    run_test(
        create_test_context,
        |ctx| {
            let broker = ctx.broker();
            let (events, listener) = recorder();
            let _registration =
                broker.register_change_listener(CONFIGURATION, &path("/a"), listener, DataChangeScope::Subtree)?;

            let tx = broker.new_write_only_transaction()?;
            tx.put(CONFIGURATION, &path("/a/b/c"), NormalizedNode::leaf(1))?;
            tx.put(OPERATIONAL, &path("/a/b/c"), NormalizedNode::leaf(1))?;
            tx.submit()?.get()?;

            awaitility::at_most(Duration::from_secs(1)).until(|| events.lock().len() == 1);
            thread::sleep(Duration::from_millis(50));

            let events = events.lock();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].path(), &path("/a"));
            assert_eq!(events[0].original(), None);
            assert!(events[0].updated().is_some());
            assert_eq!(events[0].changed_paths(), &[path("/a/b/c")]);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_base_listener_ignores_descendant_changes() {
    run_test(
        create_test_context,
        |ctx| {
            let broker = ctx.broker();
            let tx = broker.new_write_only_transaction()?;
            tx.put(CONFIGURATION, &path("/a"), NormalizedNode::container())?;
            tx.submit()?.get()?;

            let (events, listener) = recorder();
            let _registration =
                broker.register_change_listener(CONFIGURATION, &path("/a"), listener, DataChangeScope::Base)?;

            let tx = broker.new_write_only_transaction()?;
            tx.put(CONFIGURATION, &path("/a/b"), NormalizedNode::leaf(1))?;
            tx.submit()?.get()?;
            thread::sleep(Duration::from_millis(50));
            assert!(events.lock().is_empty());

            let tx = broker.new_write_only_transaction()?;
            tx.delete(CONFIGURATION, &path("/a"))?;
            tx.submit()?.get()?;
            awaitility::at_most(Duration::from_secs(1)).until(|| events.lock().len() == 1);
            assert_eq!(events.lock()[0].updated(), None);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_closed_registration_stops_notifications() {
    run_test(
        create_test_context,
        |ctx| {
            let broker = ctx.broker();
            let (events, listener) = recorder();
            let registration =
                broker.register_change_listener(OPERATIONAL, &path("/a"), listener, DataChangeScope::Subtree)?;
            assert_eq!(ctx.oper_store().memory().listener_count(), 1);

            registration.close();
            assert!(registration.is_closed());
            assert_eq!(ctx.oper_store().memory().listener_count(), 0);

            let tx = broker.new_write_only_transaction()?;
            tx.put(OPERATIONAL, &path("/a"), NormalizedNode::leaf(1))?;
            tx.submit()?.get()?;
            thread::sleep(Duration::from_millis(50));
            assert!(events.lock().is_empty());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_tree_change_service_delivers_candidates() {
    run_test(
        create_test_context,
        |ctx| {
            let broker = ctx.broker();
            let service = broker.tree_change_service().cloned().unwrap();

            let candidates: Arc<Mutex<Vec<DataTreeCandidate>>> = Arc::new(Mutex::new(Vec::new()));
            let sink = candidates.clone();
            let _registration = service.register_data_tree_change_listener(
                &DataTreeIdentifier::new(OPERATIONAL, path("/stats")),
                DataTreeChangeListener::new(move |changes| {
                    sink.lock().extend(changes);
                    Ok(())
                }),
            )?;

            let tx = broker.new_write_only_transaction()?;
            tx.put(OPERATIONAL, &path("/stats/rx"), NormalizedNode::leaf(10))?;
            tx.submit()?.get()?;
            let tx = broker.new_write_only_transaction()?;
            tx.delete(OPERATIONAL, &path("/stats"))?;
            tx.submit()?.get()?;

            awaitility::at_most(Duration::from_secs(1)).until(|| candidates.lock().len() == 2);
            let candidates = candidates.lock();
            assert_eq!(candidates[0].root_path(), &path("/stats"));
            assert_eq!(candidates[0].modification_type(), ModificationType::Created);
            assert_eq!(candidates[1].modification_type(), ModificationType::Deleted);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_tree_change_service_needs_every_store() {
    let quiet = InMemoryStoreConfig::named("oper");
    quiet.set_tree_change_publishing(false);

    let broker = DataBroker::builder()
        .datastore(LogicalDatastoreType::Configuration, InMemoryDomStore::new(InMemoryStoreConfig::named("config")))
        .datastore(LogicalDatastoreType::Operational, InMemoryDomStore::new(quiet))
        .build()
        .unwrap();
    assert!(broker.tree_change_service().is_none());

    // data change listeners keep working
    let (_, listener) = recorder();
    assert!(broker
        .register_change_listener(LogicalDatastoreType::Operational, &path("/a"), listener, DataChangeScope::One)
        .is_ok());
}

#[test]
fn test_failing_listener_does_not_fail_commit() {
    run_test(
        create_test_context,
        |ctx| {
            let broker = ctx.broker();
            let _failing = broker.register_change_listener(
                CONFIGURATION,
                &path("/a"),
                DataChangeListener::new(|_| Err(databroker::errors::BrokerError::new("boom", ErrorKind::InternalError))),
                DataChangeScope::Subtree,
            )?;
            let (events, listener) = recorder();
            let _registration =
                broker.register_change_listener(CONFIGURATION, &path("/a"), listener, DataChangeScope::Subtree)?;

            let tx = broker.new_write_only_transaction()?;
            tx.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(1))?;
            tx.submit()?.get()?;

            awaitility::at_most(Duration::from_secs(1)).until(|| events.lock().len() == 1);
            assert_eq!(ctx.config_store().committed(&path("/a")), Some(NormalizedNode::leaf(1)));
            Ok(())
        },
        cleanup,
    )
}
