use databroker::broker::{DataReadTransaction, DataTransaction, DataWriteTransaction, PingPongDataBroker};
use databroker::data::NormalizedNode;
use databroker::errors::ErrorKind;
use databroker_int_test::test_util::{cleanup, create_test_context, path, run_test, CONFIGURATION, OPERATIONAL};

#[test]
fn test_frontends_share_one_backend() {
    run_test(
        create_test_context,
        |ctx| {
            let ping_pong = PingPongDataBroker::new(ctx.broker());
            let first = ping_pong.new_write_transaction()?;
            let second = ping_pong.new_write_transaction()?;

            assert_eq!(first.identifier().as_str(), "PING-PONG-0");
            assert_eq!(second.identifier().as_str(), "PING-PONG-1");
            assert_eq!(first.backend_identifier(), second.backend_identifier());
            assert_eq!(ping_pong.backend_transactions_created(), 1);

            first.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(1))?;
            second.put(OPERATIONAL, &path("/b"), NormalizedNode::leaf(2))?;
            assert_eq!(
                second.read(CONFIGURATION, &path("/a"))?.get()?,
                Some(NormalizedNode::leaf(1))
            );

            let submitted = second.submit()?;
            submitted.get()?;
            assert_eq!(ctx.config_store().committed(&path("/a")), Some(NormalizedNode::leaf(1)));
            assert_eq!(ctx.oper_store().committed(&path("/b")), Some(NormalizedNode::leaf(2)));

            // the sibling shares the outcome of the readied backend
            first.submit()?.get()?;
            assert_eq!(ctx.config_store().calls().len(), 3);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_slot_clears_after_commit() {
    run_test(
        create_test_context,
        |ctx| {
            let ping_pong = PingPongDataBroker::new(ctx.broker());
            let first = ping_pong.new_write_transaction()?;
            first.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(1))?;
            first.submit()?.get()?;
            assert!(ping_pong.is_idle());
            assert_eq!(ping_pong.current_frontend(), None);

            let next = ping_pong.new_write_transaction()?;
            assert_ne!(next.backend_identifier(), first.backend_identifier());
            assert_eq!(ping_pong.backend_transactions_created(), 2);
            assert_eq!(ping_pong.current_frontend(), Some(next.identifier().clone()));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_in_flight_backend_refuses_new_frontends() {
    run_test(
        create_test_context,
        |ctx| {
            let store = ctx.config_store();
            store.hold_commits(true);

            let ping_pong = PingPongDataBroker::new(ctx.broker());
            let first = ping_pong.new_write_transaction()?;
            first.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(1))?;
            let submitted = first.submit()?;
            assert!(!submitted.is_done());

            assert_eq!(
                ping_pong.new_write_transaction().err().map(|e| e.kind().clone()),
                Some(ErrorKind::InvalidState)
            );

            store.hold_commits(false);
            store.release_commits();
            submitted.get()?;
            assert!(ping_pong.is_idle());
            assert!(ping_pong.new_write_transaction().is_ok());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_sibling_cannot_write_after_submit() {
    run_test(
        create_test_context,
        |ctx| {
            let store = ctx.config_store();
            store.hold_commits(true);

            let ping_pong = PingPongDataBroker::new(ctx.broker());
            let first = ping_pong.new_write_transaction()?;
            let second = ping_pong.new_write_transaction()?;
            first.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(1))?;
            let submitted = first.submit()?;

            assert_eq!(
                second.put(CONFIGURATION, &path("/b"), NormalizedNode::leaf(2)).unwrap_err().kind(),
                &ErrorKind::AlreadyClosed
            );
            assert!(!second.cancel());

            store.hold_commits(false);
            store.release_commits();
            submitted.get()?;
            assert_eq!(store.committed(&path("/b")), None);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_cancel_discards_shared_backend() {
    run_test(
        create_test_context,
        |ctx| {
            let ping_pong = PingPongDataBroker::new(ctx.broker());
            let first = ping_pong.new_write_transaction()?;
            let second = ping_pong.new_write_transaction()?;
            first.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(1))?;

            assert!(first.cancel());
            assert!(!first.cancel());
            assert!(ping_pong.is_idle());
            assert_eq!(
                second.submit().err().map(|e| e.kind().clone()),
                Some(ErrorKind::AlreadyClosed)
            );
            assert_eq!(ctx.config_store().committed(&path("/a")), None);

            let next = ping_pong.new_write_transaction()?;
            next.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(2))?;
            next.submit()?.get()?;
            assert_eq!(ctx.config_store().committed(&path("/a")), Some(NormalizedNode::leaf(2)));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_failed_backend_clears_slot() {
    run_test(
        create_test_context,
        |ctx| {
            ctx.config_store().veto_can_commit(true);

            let ping_pong = PingPongDataBroker::new(ctx.broker());
            let first = ping_pong.new_write_transaction()?;
            first.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(1))?;
            assert!(first.submit()?.get().is_err());
            assert!(ping_pong.is_idle());

            ctx.config_store().veto_can_commit(false);
            let next = ping_pong.new_write_transaction()?;
            next.put(CONFIGURATION, &path("/a"), NormalizedNode::leaf(2))?;
            next.submit()?.get()?;
            Ok(())
        },
        cleanup,
    )
}
