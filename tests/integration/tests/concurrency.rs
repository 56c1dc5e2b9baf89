//! Integration test: concurrent and cancelled settlement runs sharing one
//! orchestrator and one pair of ledger clients.

use std::sync::Arc;
use std::time::Duration;

use ledgerpay_core::{Identity, PaymentNetwork, PaymentRequest, SettlementConfig, SettlementState};
use ledgerpay_integration_tests::{
    payer, proxy, token, FrozenRequestLedger, Harness, ONE_TOKEN,
};
use ledgerpay_settlement::{
    CancellationToken, CollectingSink, InMemoryLedger, NullSink, SettlementError,
    SettlementOrchestrator, SettlementOutcome,
};
use tokio::task::JoinSet;
use tokio::time::Instant;

fn recipient(n: u64) -> Identity {
    Identity::new(format!("0x{:040x}", n))
}

async fn wait_until_in_flight(h: &Harness, request: &PaymentRequest) {
    while !h.orchestrator.is_in_flight(&request.id) {
        tokio::task::yield_now().await;
    }
}

// =========================================================================
// One run per request
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_second_run_for_same_request_is_refused() {
    let h = Arc::new(Harness::new());
    h.ledger.mint(&payer(), &token(), 2 * ONE_TOKEN);
    h.ledger.stall_confirmations(true);
    let request = h.request(ONE_TOKEN);

    let first = {
        let h = h.clone();
        let request = request.clone();
        tokio::spawn(async move { h.orchestrator.settle(&request, &payer(), &NullSink).await })
    };
    wait_until_in_flight(&h, &request).await;

    let sink = CollectingSink::new();
    let second = h.orchestrator.settle(&request, &payer(), &sink).await;
    assert!(matches!(
        second.error(),
        Some(SettlementError::AlreadyInFlight(id)) if *id == request.id
    ));
    assert_eq!(sink.states(), vec![SettlementState::Created, SettlementState::Failed]);

    // The refused run must not release the first run's claim.
    assert!(h.orchestrator.is_in_flight(&request.id));

    // The first run is stuck on its approval and eventually gives up.
    let first = first.await.unwrap();
    assert_eq!(first.error().map(|e| e.kind()), Some("ApprovalError"));
    assert_eq!(h.ledger.approval_calls(), 1);
    assert_eq!(h.ledger.transfer_calls(), 0);
    assert!(!h.orchestrator.is_in_flight(&request.id));
    assert_eq!(h.orchestrator.in_flight_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_request_can_be_retried_after_run_finishes() {
    let h = Harness::new();
    h.ledger.mint(&payer(), &token(), ONE_TOKEN);
    h.ledger.reject_approvals(true);
    let request = h.request(ONE_TOKEN);

    let first = h.orchestrator.settle(&request, &payer(), &NullSink).await;
    assert_eq!(first.error().map(|e| e.kind()), Some("ApprovalError"));

    h.ledger.reject_approvals(false);
    let second = h.orchestrator.settle(&request, &payer(), &NullSink).await;
    assert!(second.is_settled(), "unexpected outcome: {}", second);
}

// =========================================================================
// Independent requests
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_different_requests_settle_concurrently() {
    const RUNS: u64 = 8;
    let h = Arc::new(Harness::new());
    let total = ONE_TOKEN * RUNS as u128;
    h.ledger.mint(&payer(), &token(), total);
    h.ledger.set_allowance(&payer(), &proxy(), &token(), total);

    let mut set = JoinSet::new();
    for n in 1..=RUNS {
        let payee = recipient(n);
        let request = h
            .requests
            .create_request(PaymentRequest::new(
                payee.clone(),
                payer(),
                token(),
                ONE_TOKEN,
                PaymentNetwork::fixed(payee),
            ))
            .unwrap();
        let h = h.clone();
        set.spawn(async move { h.orchestrator.settle(&request, &payer(), &NullSink).await });
    }

    let mut settled = 0;
    while let Some(outcome) = set.join_next().await {
        let outcome = outcome.unwrap();
        assert!(outcome.is_settled(), "unexpected outcome: {}", outcome);
        settled += 1;
    }

    assert_eq!(settled, RUNS);
    assert_eq!(h.ledger.transfer_calls(), RUNS as usize);
    assert_eq!(h.ledger.approval_calls(), 0);
    assert_eq!(h.ledger.balance_of(&payer(), &token()), 0);
    for n in 1..=RUNS {
        assert_eq!(h.ledger.balance_of(&recipient(n), &token()), ONE_TOKEN);
    }
    assert_eq!(h.orchestrator.in_flight_count(), 0);
}

// =========================================================================
// Cancellation
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_during_approval_moves_no_funds() {
    let h = Arc::new(Harness::new());
    h.ledger.mint(&payer(), &token(), ONE_TOKEN);
    h.ledger.stall_confirmations(true);
    let request = h.request(ONE_TOKEN);
    let cancel = CancellationToken::new();
    let sink = Arc::new(CollectingSink::new());

    let run = {
        let h = h.clone();
        let request = request.clone();
        let cancel = cancel.clone();
        let sink = sink.clone();
        tokio::spawn(async move {
            let config = h.orchestrator.config().clone();
            h.orchestrator
                .settle_with(&request, &payer(), &config, sink.as_ref(), &cancel)
                .await
        })
    };

    tokio::time::sleep(Duration::from_secs(3)).await;
    cancel.cancel();
    let outcome = run.await.unwrap();

    match &outcome {
        SettlementOutcome::Failed {
            error, failed_in, ..
        } => {
            assert!(matches!(error, SettlementError::Cancelled { .. }));
            assert_eq!(*failed_in, SettlementState::ApprovalPending);
        }
        other => panic!("expected Failed, got {}", other),
    }
    assert_eq!(h.ledger.transfer_calls(), 0);
    assert_eq!(h.ledger.balance_of(&payer(), &token()), ONE_TOKEN);
    assert_eq!(sink.states().last(), Some(&SettlementState::Failed));
    assert!(!h.orchestrator.is_in_flight(&request.id));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_submission_does_not_abort_confirmation_wait() {
    let h = Arc::new(Harness::new());
    h.ledger.mint(&payer(), &token(), ONE_TOKEN);
    h.ledger.set_allowance(&payer(), &proxy(), &token(), ONE_TOKEN);
    h.ledger.stall_confirmations(true);
    let request = h.request(ONE_TOKEN);
    let cancel = CancellationToken::new();
    let payment_timeout = h.orchestrator.config().payment_timeout();

    let started = Instant::now();
    let run = {
        let h = h.clone();
        let request = request.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let config = h.orchestrator.config().clone();
            h.orchestrator
                .settle_with(&request, &payer(), &config, &NullSink, &cancel)
                .await
        })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();
    let outcome = run.await.unwrap();

    match &outcome {
        SettlementOutcome::Failed {
            error,
            failed_in,
            payment_tx,
        } => {
            assert!(
                matches!(error, SettlementError::Payment { tx_hash: Some(_), .. }),
                "unexpected error: {}",
                error
            );
            assert_eq!(*failed_in, SettlementState::PaymentSubmitted);
            assert!(payment_tx.is_some());
            assert!(error.is_funds_in_flight());
        }
        other => panic!("expected Failed, got {}", other),
    }
    // The wait ran to its own deadline despite the cancel at 1s.
    assert!(started.elapsed() >= payment_timeout);
    assert_eq!(h.ledger.transfer_calls(), 1);
    assert_eq!(h.ledger.balance_of(&payer(), &token()), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_polling_times_out_early() {
    let ledger = Arc::new(InMemoryLedger::new(proxy()));
    ledger.mint(&payer(), &token(), ONE_TOKEN);
    ledger.set_allowance(&payer(), &proxy(), &token(), ONE_TOKEN);
    let requests = Arc::new(FrozenRequestLedger::new(ONE_TOKEN / 4));
    let orchestrator = SettlementOrchestrator::new(ledger.clone(), requests, proxy());
    let request = ledgerpay_integration_tests::fixed_request(ONE_TOKEN);
    let config = SettlementConfig::default().with_poll_deadline(Duration::from_secs(60));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let outcome = orchestrator
        .settle_with(&request, &payer(), &config, &NullSink, &cancel)
        .await;

    match &outcome {
        SettlementOutcome::TimedOut {
            last_balance,
            payment_tx,
        } => {
            assert_eq!(last_balance.amount, ONE_TOKEN / 4);
            // The transfer went out before the cancel and is still reported.
            assert!(payment_tx.is_some());
        }
        other => panic!("expected TimedOut, got {}", other),
    }
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(ledger.transfer_calls(), 1);
}
