use databroker::broker::{DataTransaction, DataWriteTransaction};
use databroker::broker_builder::DataBrokerBuilder;
use databroker::data::{DataTreeIdentifier, LogicalDatastoreType, NormalizedNode};
use databroker::errors::{BrokerError, ErrorKind};
use databroker::store::{DataChangeListener, DataChangeScope, DomStore, InMemoryDomStore, InMemoryStoreConfig};
use databroker_int_test::test_util::{
    cleanup, create_test_context, path, run_test, RecordingChainListener, CONFIGURATION, OPERATIONAL,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_datastores_keep_registration_order() {
    run_test(
        create_test_context,
        |ctx| {
            assert_eq!(ctx.broker().datastores(), vec![CONFIGURATION, OPERATIONAL]);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_custom_prefixes() {
    let broker = DataBrokerBuilder::new()
        .datastore(LogicalDatastoreType::Configuration, InMemoryDomStore::new(InMemoryStoreConfig::new()))
        .transaction_id_prefix("TX-")
        .chain_id_prefix("CHAIN-")
        .sharded_id_prefix("SHARD-")
        .build()
        .unwrap();

    assert_eq!(broker.new_write_only_transaction().unwrap().identifier().as_str(), "TX-0");

    let chain = broker.create_transaction_chain(RecordingChainListener::new()).unwrap();
    assert_eq!(chain.new_write_only_transaction().unwrap().identifier().as_str(), "CHAIN-0-0");

    let producer = broker
        .create_producer(vec![DataTreeIdentifier::new(LogicalDatastoreType::Configuration, path("/a"))])
        .unwrap();
    assert_eq!(producer.create_transaction().unwrap().identifier().as_str(), "SHARD-0");
}

#[test]
fn test_shared_store_handle() {
    let store = InMemoryDomStore::new(InMemoryStoreConfig::named("shared"));
    let broker = DataBrokerBuilder::new()
        .dom_store(LogicalDatastoreType::Configuration, DomStore::new(store.clone()))
        .build()
        .unwrap();

    let tx = broker.new_write_only_transaction().unwrap();
    tx.put(LogicalDatastoreType::Configuration, &path("/a"), NormalizedNode::leaf(true)).unwrap();
    tx.submit().unwrap().get().unwrap();
    assert_eq!(store.snapshot().find(&path("/a")), Some(&NormalizedNode::leaf(true)));
}

#[test]
fn test_builder_errors() {
    let err = DataBrokerBuilder::new().build().err().unwrap();
    assert_eq!(err.kind(), &ErrorKind::InvalidState);

    let err = DataBrokerBuilder::new()
        .datastore(LogicalDatastoreType::Configuration, InMemoryDomStore::new(InMemoryStoreConfig::new()))
        .chain_id_prefix("")
        .build()
        .err()
        .unwrap();
    assert_eq!(err.kind(), &ErrorKind::InvalidState);
}

#[test]
fn test_config_is_frozen_after_build() {
    run_test(
        create_test_context,
        |ctx| {
            let config = ctx.broker().config().clone();
            assert!(config.commit_stats());
            assert!(config.set_transaction_id_prefix("X-").is_err());
            assert_eq!(config.transaction_id_prefix(), "DOM-");
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_close_is_idempotent_and_runs_hook_once() {
    run_test(
        create_test_context,
        |ctx| {
            let broker = ctx.broker();
            let closed = Arc::new(AtomicUsize::new(0));
            let counter = closed.clone();
            broker.set_closeable(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(BrokerError::new("hook failed", ErrorKind::BackendError))
            });

            broker.close();
            broker.close();
            assert!(broker.is_closed());
            assert_eq!(closed.load(Ordering::SeqCst), 1);

            let expect_closed = |kind: Option<ErrorKind>| assert_eq!(kind, Some(ErrorKind::BrokerClosed));
            expect_closed(broker.new_read_only_transaction().err().map(|e| e.kind().clone()));
            expect_closed(broker.new_read_write_transaction().err().map(|e| e.kind().clone()));
            expect_closed(
                broker
                    .create_transaction_chain(RecordingChainListener::new())
                    .err()
                    .map(|e| e.kind().clone()),
            );
            expect_closed(
                broker
                    .register_change_listener(
                        CONFIGURATION,
                        &path("/a"),
                        DataChangeListener::new(|_| Ok(())),
                        DataChangeScope::Base,
                    )
                    .err()
                    .map(|e| e.kind().clone()),
            );
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_clones_share_state() {
    run_test(
        create_test_context,
        |ctx| {
            let broker = ctx.broker();
            let clone = broker.clone();
            assert_eq!(broker.new_read_only_transaction()?.identifier().as_str(), "DOM-0");
            assert_eq!(clone.new_read_only_transaction()?.identifier().as_str(), "DOM-1");

            clone.close();
            assert!(broker.is_closed());
            Ok(())
        },
        cleanup,
    )
}
