//! Integration test: end-to-end settlement across ledgerpay-core and
//! ledgerpay-settlement.

use std::sync::Arc;
use std::time::Duration;

use ledgerpay_core::{Identity, SettlementConfig, SettlementState};
use ledgerpay_integration_tests::{
    fixed_request, payee, payer, proxy, token, FrozenRequestLedger, Harness, ONE_TOKEN,
};
use ledgerpay_settlement::{
    CancellationToken, CollectingSink, InMemoryLedger, LedgerClient, PollOutcome, PollPolicy,
    SettlementOrchestrator, SettlementOutcome, SettlementPoller,
};
use tokio::time::Instant;

// =========================================================================
// Pay path
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_settles_with_approval() {
    let h = Harness::new();
    h.ledger.mint(&payer(), &token(), 3 * ONE_TOKEN);
    let request = h.request(ONE_TOKEN);
    let sink = CollectingSink::new();

    let outcome = h.orchestrator.settle(&request, &payer(), &sink).await;

    assert!(outcome.is_settled(), "unexpected outcome: {}", outcome);
    assert_eq!(
        sink.states(),
        vec![
            SettlementState::Created,
            SettlementState::FundingChecked,
            SettlementState::ApprovalPending,
            SettlementState::Approved,
            SettlementState::PaymentSubmitted,
            SettlementState::PaymentConfirmed,
            SettlementState::Polling,
            SettlementState::Settled,
        ]
    );
    assert_eq!(h.ledger.approval_calls(), 1);
    assert_eq!(h.ledger.transfer_calls(), 1);

    // Funds moved and the allowance was consumed.
    assert_eq!(h.ledger.balance_of(&payer(), &token()), 2 * ONE_TOKEN);
    assert_eq!(h.ledger.balance_of(&payee(), &token()), ONE_TOKEN);
    assert_eq!(h.ledger.allowance_of(&payer(), &proxy(), &token()), 0);

    let transfers = h.ledger.transfers();
    assert_eq!(transfers.len(), 1);
    assert_eq!(outcome.payment_tx(), Some(&transfers[0].hash));
    assert!(!h.orchestrator.is_in_flight(&request.id));
}

#[tokio::test(start_paused = true)]
async fn test_insufficient_funds_submits_nothing() {
    let h = Harness::new();
    h.ledger.mint(&payer(), &token(), ONE_TOKEN / 2);
    let request = h.request(ONE_TOKEN);
    let sink = CollectingSink::new();

    let outcome = h.orchestrator.settle(&request, &payer(), &sink).await;

    assert_eq!(outcome.state(), SettlementState::Failed);
    let error = outcome.error().expect("failure carries an error");
    assert_eq!(error.kind(), "FundingError");
    assert!(error.to_string().contains("insufficient"));
    assert_eq!(h.ledger.approval_calls(), 0);
    assert_eq!(h.ledger.transfer_calls(), 0);
    assert_eq!(h.requests.refresh_calls(), 0);
    assert_eq!(sink.states(), vec![SettlementState::Created, SettlementState::Failed]);
    assert_eq!(h.ledger.balance_of(&payer(), &token()), ONE_TOKEN / 2);
}

#[tokio::test(start_paused = true)]
async fn test_times_out_when_request_ledger_never_updates() {
    let ledger = Arc::new(InMemoryLedger::new(proxy()));
    ledger.mint(&payer(), &token(), ONE_TOKEN);
    ledger.set_allowance(&payer(), &proxy(), &token(), ONE_TOKEN);
    let requests = Arc::new(FrozenRequestLedger::new(0));
    let orchestrator = SettlementOrchestrator::new(ledger.clone(), requests.clone(), proxy());
    let request = fixed_request(ONE_TOKEN);
    let sink = CollectingSink::new();

    let started = Instant::now();
    let outcome = orchestrator.settle(&request, &payer(), &sink).await;
    let elapsed = started.elapsed();

    match &outcome {
        SettlementOutcome::TimedOut {
            last_balance,
            payment_tx,
        } => {
            assert_eq!(last_balance.amount, 0);
            assert!(payment_tx.is_some());
        }
        other => panic!("expected TimedOut, got {}", other),
    }
    assert!(elapsed >= Duration::from_secs(5), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(6), "elapsed {:?}", elapsed);

    // Allowance was already there.
    assert_eq!(ledger.approval_calls(), 0);
    assert_eq!(ledger.transfer_calls(), 1);
    assert!(requests.refreshes() >= 5);
    assert_eq!(
        sink.states(),
        vec![
            SettlementState::Created,
            SettlementState::FundingChecked,
            SettlementState::Approved,
            SettlementState::PaymentSubmitted,
            SettlementState::PaymentConfirmed,
            SettlementState::Polling,
            SettlementState::TimedOut,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_per_run_config_overrides_orchestrator_default() {
    let h = Harness::new();
    let request = h.request(ONE_TOKEN);
    let config = SettlementConfig::default()
        .with_poll_interval(Duration::from_millis(200))
        .with_poll_deadline(Duration::from_secs(1));

    // Nobody pays, so the run is bounded by the per-run deadline.
    let started = Instant::now();
    let outcome = h
        .orchestrator
        .observe(&request, &config, &CollectingSink::new(), &CancellationToken::new())
        .await;

    assert_eq!(outcome.state(), SettlementState::TimedOut);
    assert!(started.elapsed() < Duration::from_millis(1_200));
}

// =========================================================================
// Observe path
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_observe_third_party_payment() {
    let h = Harness::new();
    let request = h.request(ONE_TOKEN);
    let sender = Identity::new("0x2B5AD5c4795c026514f8317c7a215E218DcCD6cF");
    h.ledger.mint(&sender, &token(), ONE_TOKEN);
    h.ledger.set_allowance(&sender, &proxy(), &token(), ONE_TOKEN);

    let ledger = h.ledger.clone();
    let payment = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        ledger
            .submit_transfer(&sender, &payee(), &token(), ONE_TOKEN)
            .await
    });

    let sink = CollectingSink::new();
    let outcome = h
        .orchestrator
        .observe(
            &request,
            h.orchestrator.config(),
            &sink,
            &CancellationToken::new(),
        )
        .await;
    payment.await.unwrap().unwrap();

    assert!(outcome.is_settled());
    assert_eq!(outcome.payment_tx(), None);
    assert_eq!(
        sink.states(),
        vec![
            SettlementState::Created,
            SettlementState::Polling,
            SettlementState::Settled,
        ]
    );
    // Observing never touches the payer side.
    assert_eq!(h.ledger.balance_queries(), 0);
    assert_eq!(h.ledger.approval_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_repoll_after_settlement_returns_immediately() {
    let h = Harness::new();
    h.ledger.mint(&payer(), &token(), ONE_TOKEN);
    let request = h.request(ONE_TOKEN);

    let first = h
        .orchestrator
        .settle(&request, &payer(), &CollectingSink::new())
        .await;
    assert!(first.is_settled());

    let poller = SettlementPoller::new(h.requests.clone());
    let policy = PollPolicy::new(Duration::from_secs(1), Duration::from_secs(5));
    let cancel = CancellationToken::new();
    for _ in 0..2 {
        let started = Instant::now();
        let outcome = poller.poll(&request.id, ONE_TOKEN, &policy, &cancel).await;
        assert!(matches!(outcome, PollOutcome::Settled(ref b) if b.amount == ONE_TOKEN));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    // Re-polling is read-only.
    assert_eq!(h.ledger.transfer_calls(), 1);
    assert_eq!(h.ledger.approval_calls(), 1);
}
