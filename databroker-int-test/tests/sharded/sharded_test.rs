use databroker::broker::{DataTransaction, DataWriteTransaction};
use databroker::data::{DataTreeIdentifier, NormalizedNode};
use databroker::errors::{CommitPhase, ErrorKind};
use databroker_int_test::test_util::{
    cleanup, create_test_context, path, run_test, CohortCall, CONFIGURATION, OPERATIONAL,
};

fn subtree(datastore: databroker::data::LogicalDatastoreType, at: &str) -> DataTreeIdentifier {
    DataTreeIdentifier::new(datastore, path(at))
}

#[test]
fn test_writes_route_to_claimed_subtree() {
    run_test(
        create_test_context,
        |ctx| {
            let producer = ctx
                .broker()
                .create_producer(vec![subtree(CONFIGURATION, "/a"), subtree(CONFIGURATION, "/b")])?;
            let tx = producer.create_transaction()?;
            assert_eq!(tx.identifier().as_str(), "SHARDED-DOM-0");

            tx.put(CONFIGURATION, &path("/a/x"), NormalizedNode::leaf(1))?;
            tx.put(CONFIGURATION, &path("/b"), NormalizedNode::container())?;

            let err = tx.put(CONFIGURATION, &path("/c"), NormalizedNode::leaf(1)).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InaccessiblePath);
            let err = tx.put(OPERATIONAL, &path("/a/x"), NormalizedNode::leaf(1)).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InaccessiblePath);

            tx.submit()?.get()?;
            assert_eq!(ctx.config_store().committed(&path("/a/x")), Some(NormalizedNode::leaf(1)));
            assert!(ctx.config_store().committed(&path("/b")).is_some());
            assert_eq!(ctx.config_store().committed(&path("/c")), None);
            // one backend transaction per touched claim
            assert_eq!(ctx.config_store().write_transactions_created(), 2);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_producer_commits_across_datastores() {
    run_test(
        create_test_context,
        |ctx| {
            let producer = ctx
                .broker()
                .create_producer(vec![subtree(CONFIGURATION, "/a"), subtree(OPERATIONAL, "/a")])?;
            let tx = producer.create_transaction()?;
            tx.put(CONFIGURATION, &path("/a/x"), NormalizedNode::leaf(1))?;
            tx.put(OPERATIONAL, &path("/a/y"), NormalizedNode::leaf(2))?;
            tx.submit()?.get()?;

            let full = vec![CohortCall::CanCommit, CohortCall::PreCommit, CohortCall::Commit];
            assert_eq!(ctx.config_store().calls(), full);
            assert_eq!(ctx.oper_store().calls(), full);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_refused_shard_aborts_all_shards() {
    run_test(
        create_test_context,
        |ctx| {
            ctx.oper_store().veto_can_commit(true);
            let producer = ctx
                .broker()
                .create_producer(vec![subtree(CONFIGURATION, "/a"), subtree(OPERATIONAL, "/b")])?;
            let tx = producer.create_transaction()?;
            tx.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(1))?;
            tx.put(OPERATIONAL, &path("/b"), NormalizedNode::leaf(2))?;

            let err = tx.submit()?.get().unwrap_err();
            assert_eq!(err.commit_phase(), Some(CommitPhase::CanCommit));
            assert!(ctx.config_store().calls().contains(&CohortCall::Abort));
            assert_eq!(ctx.config_store().committed(&path("/a")), None);

            // the failed transaction no longer blocks the producer
            assert!(producer.create_transaction().is_ok());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_overlapping_claims_are_rejected() {
    run_test(
        create_test_context,
        |ctx| {
            let err = ctx
                .broker()
                .create_producer(vec![subtree(CONFIGURATION, "/a"), subtree(CONFIGURATION, "/a/b")])
                .err()
                .map(|e| e.kind().clone());
            assert_eq!(err, Some(ErrorKind::InvalidState));

            let err = ctx.broker().create_producer(Vec::new()).err().map(|e| e.kind().clone());
            assert_eq!(err, Some(ErrorKind::InvalidState));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_producer_ids_are_shared_across_producers() {
    run_test(
        create_test_context,
        |ctx| {
            let broker = ctx.broker();
            let first = broker.create_producer(vec![subtree(CONFIGURATION, "/a")])?;
            let second = broker.create_producer(vec![subtree(CONFIGURATION, "/b")])?;

            let tx = first.create_transaction()?;
            assert_eq!(tx.identifier().as_str(), "SHARDED-DOM-0");
            let tx = second.create_transaction()?;
            assert_eq!(tx.identifier().as_str(), "SHARDED-DOM-1");
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_producer_lifecycle() {
    run_test(
        create_test_context,
        |ctx| {
            let producer = ctx.broker().create_producer(vec![subtree(CONFIGURATION, "/a")])?;
            assert_eq!(producer.subtrees(), vec![subtree(CONFIGURATION, "/a")]);

            let tx = producer.create_transaction()?;
            assert_eq!(
                producer.create_transaction().err().map(|e| e.kind().clone()),
                Some(ErrorKind::InvalidState)
            );
            assert!(producer.close().is_err());

            tx.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(1))?;
            assert!(tx.cancel());
            assert_eq!(ctx.config_store().committed(&path("/a")), None);

            producer.close()?;
            assert_eq!(
                producer.create_transaction().err().map(|e| e.kind().clone()),
                Some(ErrorKind::AlreadyClosed)
            );
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_dropped_transaction_frees_producer() {
    run_test(
        create_test_context,
        |ctx| {
            let producer = ctx.broker().create_producer(vec![subtree(CONFIGURATION, "/a")])?;
            {
                let abandoned = producer.create_transaction()?;
                abandoned.put(CONFIGURATION, &path("/a/x"), NormalizedNode::leaf(1))?;
            }

            let tx = producer.create_transaction()?;
            tx.put(CONFIGURATION, &path("/a/y"), NormalizedNode::leaf(2))?;
            tx.submit()?.get()?;
            assert_eq!(ctx.config_store().committed(&path("/a/x")), None);
            assert_eq!(ctx.config_store().committed(&path("/a/y")), Some(NormalizedNode::leaf(2)));
            producer.close()?;
            Ok(())
        },
        cleanup,
    )
}
