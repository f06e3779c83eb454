use databroker::broker::{DataTransaction, DataWriteTransaction};
use databroker::data::NormalizedNode;
use databroker::errors::{CommitPhase, ErrorKind};
use databroker_int_test::test_util::{
    cleanup, create_test_context, path, run_test, CohortCall, CONFIGURATION, OPERATIONAL,
};

#[test]
fn test_two_stores_run_every_phase() {
    run_test(
        create_test_context,
        |ctx| {
            let tx = ctx.broker().new_write_only_transaction()?;
            tx.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(1))?;
            tx.put(OPERATIONAL, &path("/b"), NormalizedNode::leaf(2))?;
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
fn test_refusal_on_second_store_aborts_both() {
    run_test(
        create_test_context,
        |ctx| {
            ctx.oper_store().veto_can_commit(true);

            let tx = ctx.broker().new_write_only_transaction()?;
            tx.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(1))?;
            tx.put(OPERATIONAL, &path("/b"), NormalizedNode::leaf(2))?;
            let err = tx.submit()?.get().unwrap_err();

            assert_eq!(err.kind(), &ErrorKind::CommitFailed(CommitPhase::CanCommit));
            assert!(err.message().contains(tx.identifier().as_str()));
            assert_eq!(ctx.config_store().calls(), vec![CohortCall::CanCommit, CohortCall::Abort]);
            assert_eq!(ctx.oper_store().calls(), vec![CohortCall::CanCommit, CohortCall::Abort]);
            assert_eq!(ctx.config_store().committed(&path("/a")), None);
            assert_eq!(ctx.oper_store().committed(&path("/b")), None);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_refusal_on_first_store_skips_second_vote() {
    run_test(
        create_test_context,
        |ctx| {
            ctx.config_store().veto_can_commit(true);

            let tx = ctx.broker().new_write_only_transaction()?;
            tx.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(1))?;
            tx.put(OPERATIONAL, &path("/b"), NormalizedNode::leaf(2))?;
            let err = tx.submit()?.get().unwrap_err();

            assert_eq!(err.commit_phase(), Some(CommitPhase::CanCommit));
            assert_eq!(ctx.config_store().calls(), vec![CohortCall::CanCommit, CohortCall::Abort]);
            assert_eq!(ctx.oper_store().calls(), vec![CohortCall::Abort]);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_partial_commit_is_reported_not_rolled_back() {
    run_test(
        create_test_context,
        |ctx| {
            ctx.oper_store().fail_commit(true);

            let tx = ctx.broker().new_write_only_transaction()?;
            tx.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(1))?;
            tx.put(OPERATIONAL, &path("/b"), NormalizedNode::leaf(2))?;
            let err = tx.submit()?.get().unwrap_err();

            assert_eq!(err.kind(), &ErrorKind::CommitFailed(CommitPhase::Commit));
            assert_eq!(err.root_cause().kind(), &ErrorKind::BackendError);
            assert_eq!(ctx.config_store().committed(&path("/a")), Some(NormalizedNode::leaf(1)));
            assert_eq!(ctx.oper_store().committed(&path("/b")), None);
            assert!(!ctx.config_store().calls().contains(&CohortCall::Abort));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_conflicting_writer_loses() {
    run_test(
        create_test_context,
        |ctx| {
            let broker = ctx.broker();
            let first = broker.new_write_only_transaction()?;
            let second = broker.new_write_only_transaction()?;
            first.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(1))?;
            second.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(2))?;

            first.submit()?.get()?;
            let err = second.submit()?.get().unwrap_err();
            assert_eq!(err.commit_phase(), Some(CommitPhase::CanCommit));
            assert_eq!(ctx.config_store().committed(&path("/a")), Some(NormalizedNode::leaf(1)));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_disjoint_concurrent_writers_both_commit() {
    run_test(
        create_test_context,
        |ctx| {
            let broker = ctx.broker();
            let first = broker.new_write_only_transaction()?;
            let second = broker.new_write_only_transaction()?;
            first.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(1))?;
            second.put(CONFIGURATION, &path("/b"), NormalizedNode::leaf(2))?;

            second.submit()?.get()?;
            first.submit()?.get()?;
            assert_eq!(ctx.config_store().committed(&path("/a")), Some(NormalizedNode::leaf(1)));
            assert_eq!(ctx.config_store().committed(&path("/b")), Some(NormalizedNode::leaf(2)));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_held_commit_completes_after_release() {
    run_test(
        create_test_context,
        |ctx| {
            let store = ctx.config_store();
            store.hold_commits(true);

            let tx = ctx.broker().new_write_only_transaction()?;
            tx.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(1))?;
            let result = tx.submit()?;
            assert!(!result.is_done());
            assert_eq!(store.held_commits(), 1);
            assert_eq!(store.committed(&path("/a")), None);

            store.hold_commits(false);
            store.release_commits();
            result.get()?;
            assert_eq!(store.committed(&path("/a")), Some(NormalizedNode::leaf(1)));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_commit_stats_count_outcomes() {
    run_test(
        create_test_context,
        |ctx| {
            let broker = ctx.broker();
            for value in 0..2 {
                let tx = broker.new_write_only_transaction()?;
                tx.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(value))?;
                tx.submit()?.get()?;
            }

            ctx.config_store().veto_can_commit(true);
            let tx = broker.new_write_only_transaction()?;
            tx.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(3))?;
            assert!(tx.submit()?.get().is_err());

            let stats = broker.commit_stats().unwrap();
            assert_eq!(stats.committed, 2);
            assert_eq!(stats.failed, 1);
            assert!(stats.shortest <= stats.longest);
            Ok(())
        },
        cleanup,
    )
}
