use dashmap::DashSet;
use ledgerpay_core::{
    Identity, PaymentRequest, RequestId, SettlementConfig, SettlementEvent, SettlementState,
    SettlementStateMachine, TxHash,
};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::approval::ApprovalCoordinator;
use crate::error::SettlementError;
use crate::executor::PaymentExecutor;
use crate::funding::FundingVerifier;
use crate::poller::{PollOutcome, PollPolicy, SettlementPoller};
use crate::traits::{LedgerClient, RequestLedgerClient, StatusSink};
use crate::types::{SettlementOutcome, StatusUpdate};

/// End-to-end settlement workflow.
///
/// Sequences funding verification, the optional approval, the transfer and the
/// settlement poll, emitting a [`StatusUpdate`] at every transition. One
/// orchestrator can drive many different requests concurrently; a second
/// concurrent run for the same request is refused.
pub struct SettlementOrchestrator {
    ledger: Arc<dyn LedgerClient>,
    requests: Arc<dyn RequestLedgerClient>,
    /// Settlement contract granted the payer's allowance.
    spender: Identity,
    config: SettlementConfig,
    in_flight: DashSet<RequestId>,
}

impl SettlementOrchestrator {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        requests: Arc<dyn RequestLedgerClient>,
        spender: Identity,
    ) -> Self {
        Self {
            ledger,
            requests,
            spender,
            config: SettlementConfig::default(),
            in_flight: DashSet::new(),
        }
    }

    /// Replace the default per-run configuration.
    pub fn with_config(mut self, config: SettlementConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    pub fn spender(&self) -> &Identity {
        &self.spender
    }

    pub fn is_in_flight(&self, request_id: &RequestId) -> bool {
        self.in_flight.contains(request_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Pay `request` from `payer` with the orchestrator's configuration.
    pub async fn settle(
        &self,
        request: &PaymentRequest,
        payer: &Identity,
        sink: &dyn StatusSink,
    ) -> SettlementOutcome {
        self.settle_with(request, payer, &self.config, sink, &CancellationToken::new())
            .await
    }

    /// Pay `request` from `payer` with per-invocation configuration and a
    /// cancellation token.
    ///
    /// Cancelling before the transfer is submitted ends the run as `Failed`
    /// with [`SettlementError::Cancelled`]. The transfer confirmation wait
    /// ignores cancellation. Cancelling while polling ends the run as
    /// `TimedOut`.
    pub async fn settle_with(
        &self,
        request: &PaymentRequest,
        payer: &Identity,
        config: &SettlementConfig,
        sink: &dyn StatusSink,
        cancel: &CancellationToken,
    ) -> SettlementOutcome {
        let mut run = WorkflowRun::start(request.id, sink);

        let _guard = match InFlightGuard::acquire(&self.in_flight, request.id) {
            Some(guard) => guard,
            None => {
                tracing::warn!(request_id = %request.id, "settlement already in flight");
                return run.fail(SettlementError::AlreadyInFlight(request.id));
            }
        };

        tracing::info!(
            request_id = %request.id,
            payer = %payer,
            expected = request.expected_amount,
            currency = %request.currency,
            "settlement started"
        );

        match self.pay(request, payer, config, cancel, &mut run).await {
            Ok(outcome) => {
                tracing::info!(request_id = %request.id, %outcome, "settlement finished");
                outcome
            }
            Err(error) => run.fail(error),
        }
    }

    /// Observe settlement of a request paid by someone else: poll only, no
    /// transactions.
    pub async fn observe(
        &self,
        request: &PaymentRequest,
        config: &SettlementConfig,
        sink: &dyn StatusSink,
        cancel: &CancellationToken,
    ) -> SettlementOutcome {
        let mut run = WorkflowRun::start(request.id, sink);
        let result = match config.validate() {
            Ok(()) => self.poll_phase(request, config, cancel, &mut run).await,
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(outcome) => outcome,
            Err(error) => run.fail(error),
        }
    }

    async fn pay(
        &self,
        request: &PaymentRequest,
        payer: &Identity,
        config: &SettlementConfig,
        cancel: &CancellationToken,
        run: &mut WorkflowRun<'_>,
    ) -> Result<SettlementOutcome, SettlementError> {
        config.validate()?;
        request.validate()?;

        let verifier = FundingVerifier::new(self.ledger.clone(), self.spender.clone());
        let funding = until_cancelled(cancel, run.state, verifier.verify(request, payer)).await?;
        run.advance(
            SettlementEvent::FundsVerified,
            format!(
                "payer {} holds {} {}",
                payer,
                funding.balance.available(),
                request.currency
            ),
        )?;

        let branch = SettlementStateMachine::funding_event(&funding);
        let detail = if funding.needs_approval() {
            format!("approving {} for {}", self.spender, request.expected_amount)
        } else {
            "allowance already sufficient".to_string()
        };
        run.advance(branch, detail)?;

        if funding.needs_approval() {
            let coordinator = ApprovalCoordinator::new(self.ledger.clone(), self.spender.clone());
            let approval =
                until_cancelled(cancel, run.state, coordinator.approve(request, payer, config))
                    .await?;
            run.advance(
                SettlementEvent::ApprovalConfirmed,
                format!(
                    "approval {} confirmed ({} confirmations)",
                    approval.hash, approval.confirmations
                ),
            )?;
        }

        // Last point at which cancellation is honoured before funds move.
        if cancel.is_cancelled() {
            return Err(SettlementError::Cancelled { state: run.state });
        }
        run.ensure(SettlementEvent::PaymentSubmitted)?;

        let executor = PaymentExecutor::new(self.ledger.clone());
        let handle = executor.submit(request, payer).await?;
        run.payment_tx = Some(handle.hash.clone());
        run.advance(
            SettlementEvent::PaymentSubmitted,
            format!("payment {} submitted", handle.hash),
        )?;

        let confirmed = executor.await_confirmed(&handle, config).await?;
        run.advance(
            SettlementEvent::PaymentConfirmed,
            format!("Payment complete. {}", confirmed.hash),
        )?;

        self.poll_phase(request, config, cancel, run).await
    }

    async fn poll_phase(
        &self,
        request: &PaymentRequest,
        config: &SettlementConfig,
        cancel: &CancellationToken,
        run: &mut WorkflowRun<'_>,
    ) -> Result<SettlementOutcome, SettlementError> {
        let expected = request.expected_amount;
        run.advance(
            SettlementEvent::PollingStarted,
            format!("waiting for {} {}", expected, request.currency),
        )?;

        let poller = SettlementPoller::new(self.requests.clone());
        let policy = PollPolicy::from(config);
        let outcome = {
            let progress = &*run;
            poller
                .poll_with(&request.id, expected, &policy, cancel, |balance| {
                    progress.progress(format!("observed balance {}/{}", balance.amount, expected))
                })
                .await
        };

        let payment_tx = run.payment_tx.clone();
        match outcome {
            PollOutcome::Settled(balance) => {
                run.advance(
                    SettlementEvent::BalanceReached,
                    format!("settled with balance {}", balance.amount),
                )?;
                Ok(SettlementOutcome::Settled {
                    balance,
                    payment_tx,
                })
            }
            PollOutcome::TimedOut(last_balance) => {
                run.advance(
                    SettlementEvent::DeadlineElapsed,
                    format!(
                        "not settled within {:?}, last balance {}",
                        policy.deadline, last_balance.amount
                    ),
                )?;
                Ok(SettlementOutcome::TimedOut {
                    last_balance,
                    payment_tx,
                })
            }
        }
    }
}

/// Per-invocation workflow state. Owns the current state and emits every
/// transition to the caller's sink.
struct WorkflowRun<'a> {
    request_id: RequestId,
    state: SettlementState,
    sink: &'a dyn StatusSink,
    payment_tx: Option<TxHash>,
}

impl<'a> WorkflowRun<'a> {
    fn start(request_id: RequestId, sink: &'a dyn StatusSink) -> Self {
        let run = Self {
            request_id,
            state: SettlementState::Created,
            sink,
            payment_tx: None,
        };
        run.progress("payment request received");
        run
    }

    fn advance(
        &mut self,
        event: SettlementEvent,
        detail: impl Into<String>,
    ) -> Result<(), SettlementError> {
        self.state = SettlementStateMachine::transition(self.state, event)?;
        self.progress(detail);
        Ok(())
    }

    /// Fail with an invalid-transition error unless `event` is allowed now.
    fn ensure(&self, event: SettlementEvent) -> Result<(), SettlementError> {
        SettlementStateMachine::transition(self.state, event)?;
        Ok(())
    }

    fn progress(&self, detail: impl Into<String>) {
        self.sink
            .emit(StatusUpdate::new(self.request_id, self.state, detail));
    }

    fn fail(mut self, error: SettlementError) -> SettlementOutcome {
        let failed_in = self.state;
        tracing::error!(
            request_id = %self.request_id,
            state = %failed_in,
            kind = error.kind(),
            error = %error,
            "settlement failed"
        );
        if error.is_funds_in_flight() {
            tracing::error!(
                request_id = %self.request_id,
                tx_hash = ?error.tx_hash(),
                "transfer may be in flight, manual reconciliation required"
            );
        }
        self.state = match SettlementStateMachine::transition(failed_in, SettlementEvent::Failure) {
            Ok(next) => next,
            Err(e) => {
                tracing::warn!(
                    request_id = %self.request_id,
                    error = %e,
                    "failure after final state"
                );
                SettlementState::Failed
            }
        };
        self.progress(format!("{}: {}", error.kind(), error));
        SettlementOutcome::Failed {
            error,
            failed_in,
            payment_tx: self.payment_tx,
        }
    }
}

/// Marks a request as having a workflow in flight until dropped.
struct InFlightGuard<'a> {
    registry: &'a DashSet<RequestId>,
    request_id: RequestId,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(registry: &'a DashSet<RequestId>, request_id: RequestId) -> Option<Self> {
        registry.insert(request_id).then(|| Self {
            registry,
            request_id,
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.request_id);
    }
}

/// Race `fut` against cancellation.
async fn until_cancelled<T, F>(
    cancel: &CancellationToken,
    state: SettlementState,
    fut: F,
) -> Result<T, SettlementError>
where
    F: Future<Output = Result<T, SettlementError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::info!(%state, "settlement cancelled");
            Err(SettlementError::Cancelled { state })
        }
        result = fut => result,
    }
}
