use databroker::broker::{ChainStatus, DataReadTransaction, DataTransaction, DataWriteTransaction};
use databroker::data::NormalizedNode;
use databroker::errors::{CommitPhase, ErrorKind};
use databroker_int_test::test_util::{
    cleanup, create_test_context, path, run_test, RecordingChainListener, CONFIGURATION, OPERATIONAL,
};
use std::thread;

#[test]
fn test_successor_reads_uncommitted_predecessor() {
    run_test(
        create_test_context,
        |ctx| {
            let store = ctx.config_store();
            store.hold_commits(true);

            let listener = RecordingChainListener::new();
            let chain = ctx.broker().create_transaction_chain(listener.clone())?;

            let first = chain.new_write_only_transaction()?;
            first.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(1))?;
            let first_result = first.submit()?;
            assert!(!first_result.is_done());

            let second = chain.new_read_write_transaction()?;
            assert_eq!(
                second.read(CONFIGURATION, &path("/a"))?.get()?,
                Some(NormalizedNode::leaf(1))
            );
            assert_eq!(store.committed(&path("/a")), None);

            second.put(CONFIGURATION, &path("/b"), NormalizedNode::leaf(2))?;
            let second_result = second.submit()?;

            store.hold_commits(false);
            store.release_commits();
            first_result.get()?;
            second_result.get()?;

            assert_eq!(store.committed(&path("/a")), Some(NormalizedNode::leaf(1)));
            assert_eq!(store.committed(&path("/b")), Some(NormalizedNode::leaf(2)));
            assert_eq!(
                listener.committed(),
                vec![first.identifier().clone(), second.identifier().clone()]
            );
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_chain_transaction_ids() {
    run_test(
        create_test_context,
        |ctx| {
            let broker = ctx.broker();
            let first_chain = broker.create_transaction_chain(RecordingChainListener::new())?;
            let second_chain = broker.create_transaction_chain(RecordingChainListener::new())?;
            assert_eq!(first_chain.identifier(), 0);
            assert_eq!(second_chain.identifier(), 1);

            let tx = second_chain.new_read_only_transaction()?;
            assert_eq!(tx.identifier().as_str(), "DOM-CHAIN-1-0");
            let tx = second_chain.new_write_only_transaction()?;
            assert_eq!(tx.identifier().as_str(), "DOM-CHAIN-1-1");
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_failed_commit_poisons_chain() {
    run_test(
        create_test_context,
        |ctx| {
            ctx.oper_store().veto_can_commit(true);
            let listener = RecordingChainListener::new();
            let chain = ctx.broker().create_transaction_chain(listener.clone())?;

            let tx = chain.new_write_only_transaction()?;
            tx.put(OPERATIONAL, &path("/a"), NormalizedNode::leaf(1))?;
            let err = tx.submit()?.get().unwrap_err();
            assert_eq!(err.commit_phase(), Some(CommitPhase::CanCommit));

            assert_eq!(chain.status(), ChainStatus::Failed);
            assert_eq!(listener.failure_count(), 1);
            let (failed, cause) = listener.failure().unwrap();
            assert_eq!(&failed, tx.identifier());
            assert_eq!(cause.commit_phase(), Some(CommitPhase::CanCommit));

            assert_eq!(
                chain.new_write_only_transaction().err().map(|e| e.kind().clone()),
                Some(ErrorKind::ChainFailed)
            );
            chain.close();
            assert_eq!(listener.success_count(), 0);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_close_waits_for_outstanding_commits() {
    run_test(
        create_test_context,
        |ctx| {
            let store = ctx.config_store();
            store.hold_commits(true);
            let listener = RecordingChainListener::new();
            let chain = ctx.broker().create_transaction_chain(listener.clone())?;

            let tx = chain.new_write_only_transaction()?;
            tx.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(1))?;
            let result = tx.submit()?;

            chain.close();
            assert_eq!(chain.status(), ChainStatus::Closing);
            assert_eq!(listener.success_count(), 0);
            assert_eq!(
                chain.new_read_only_transaction().err().map(|e| e.kind().clone()),
                Some(ErrorKind::AlreadyClosed)
            );

            store.hold_commits(false);
            store.release_commits();
            result.get()?;
            assert_eq!(chain.status(), ChainStatus::Closed);
            assert_eq!(listener.success_count(), 1);

            chain.close();
            assert_eq!(listener.success_count(), 1);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_idle_chain_closes_immediately() {
    run_test(
        create_test_context,
        |ctx| {
            let listener = RecordingChainListener::new();
            let chain = ctx.broker().create_transaction_chain(listener.clone())?;
            chain.close();
            assert_eq!(chain.status(), ChainStatus::Closed);
            assert_eq!(listener.success_count(), 1);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_unsubmitted_predecessor_blocks_next_write() {
    run_test(
        create_test_context,
        |ctx| {
            let chain = ctx.broker().create_transaction_chain(RecordingChainListener::new())?;
            let first = chain.new_write_only_transaction()?;
            first.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(1))?;

            let second = chain.new_write_only_transaction()?;
            assert_eq!(
                second.put(CONFIGURATION, &path("/b"), NormalizedNode::leaf(2)).unwrap_err().kind(),
                &ErrorKind::InvalidState
            );

            first.submit()?.get()?;
            let third = chain.new_write_only_transaction()?;
            third.put(CONFIGURATION, &path("/b"), NormalizedNode::leaf(2))?;
            third.submit()?.get()?;
            assert_eq!(ctx.config_store().committed(&path("/b")), Some(NormalizedNode::leaf(2)));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_ready_failure_poisons_chain() {
    run_test(
        create_test_context,
        |ctx| {
            ctx.oper_store().fail_ready(true);
            let listener = RecordingChainListener::new();
            let chain = ctx.broker().create_transaction_chain(listener.clone())?;

            let tx = chain.new_write_only_transaction()?;
            tx.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(1))?;
            tx.put(OPERATIONAL, &path("/a"), NormalizedNode::leaf(1))?;
            let err = tx.submit()?.get().unwrap_err();
            assert_eq!(err.commit_phase(), Some(CommitPhase::Submit));

            assert_eq!(chain.status(), ChainStatus::Failed);
            assert_eq!(listener.failure_count(), 1);
            let (failed, _) = listener.failure().unwrap();
            assert_eq!(&failed, tx.identifier());
            assert_eq!(
                chain.new_write_only_transaction().err().map(|e| e.kind().clone()),
                Some(ErrorKind::ChainFailed)
            );
            assert_eq!(ctx.config_store().committed(&path("/a")), None);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_chain_failed_before_submitter_wakes() {
    run_test(
        create_test_context,
        |ctx| {
            let store = ctx.config_store();
            store.hold_commits(true);
            let listener = RecordingChainListener::new();
            let chain = ctx.broker().create_transaction_chain(listener.clone())?;

            let tx = chain.new_write_only_transaction()?;
            tx.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(1))?;
            let result = tx.submit()?;
            assert_eq!(store.held_commits(), 1);

            let releasing = store.clone();
            let backend = thread::spawn(move || releasing.fail_held_commits());

            let err = result.get().unwrap_err();
            assert_eq!(err.commit_phase(), Some(CommitPhase::Commit));
            assert_eq!(chain.status(), ChainStatus::Failed);
            assert_eq!(listener.failure_count(), 1);
            assert_eq!(
                chain.new_write_only_transaction().err().map(|e| e.kind().clone()),
                Some(ErrorKind::ChainFailed)
            );
            assert_eq!(ctx.broker().commit_stats().map(|s| s.failed), Some(1));

            backend.join().unwrap();
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_dropped_write_frees_chain() {
    run_test(
        create_test_context,
        |ctx| {
            let chain = ctx.broker().create_transaction_chain(RecordingChainListener::new())?;
            {
                let abandoned = chain.new_write_only_transaction()?;
                abandoned.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(1))?;
            }

            let next = chain.new_write_only_transaction()?;
            next.put(CONFIGURATION, &path("/b"), NormalizedNode::leaf(2))?;
            next.submit()?.get()?;
            assert_eq!(ctx.config_store().committed(&path("/a")), None);
            assert_eq!(ctx.config_store().committed(&path("/b")), Some(NormalizedNode::leaf(2)));
            assert_eq!(chain.status(), ChainStatus::Running);
            Ok(())
        },
        cleanup,
    )
}
