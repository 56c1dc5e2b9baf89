use ledgerpay_core::{ObservedBalance, RequestId, SettlementConfig};
use std::cmp;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::traits::RequestLedgerClient;

/// Poll cadence and deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub deadline: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&SettlementConfig::default())
    }
}

impl From<&SettlementConfig> for PollPolicy {
    fn from(config: &SettlementConfig) -> Self {
        Self::new(config.poll_interval(), config.poll_deadline())
    }
}

/// How a poll ended. Neither variant is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Settled(ObservedBalance),
    /// Deadline reached or poll cancelled; carries the last balance seen.
    TimedOut(ObservedBalance),
}

impl PollOutcome {
    pub fn balance(&self) -> &ObservedBalance {
        match self {
            Self::Settled(balance) | Self::TimedOut(balance) => balance,
        }
    }
}

/// Refreshes a request's observed balance until it covers the expected
/// amount or the deadline passes.
///
/// Deadlines are measured on the monotonic clock from the start of the poll.
/// Failed refreshes are logged and do not end the poll.
pub struct SettlementPoller {
    requests: Arc<dyn RequestLedgerClient>,
}

impl SettlementPoller {
    pub fn new(requests: Arc<dyn RequestLedgerClient>) -> Self {
        Self { requests }
    }

    pub async fn poll(
        &self,
        request_id: &RequestId,
        expected: u128,
        policy: &PollPolicy,
        cancel: &CancellationToken,
    ) -> PollOutcome {
        self.poll_with(request_id, expected, policy, cancel, |_| {})
            .await
    }

    /// Like [`poll`](Self::poll), calling `on_refresh` after every successful
    /// refresh.
    pub async fn poll_with<F>(
        &self,
        request_id: &RequestId,
        expected: u128,
        policy: &PollPolicy,
        cancel: &CancellationToken,
        mut on_refresh: F,
    ) -> PollOutcome
    where
        F: FnMut(&ObservedBalance),
    {
        let started = Instant::now();
        let deadline = far_instant(started, policy.deadline);
        let mut last = ObservedBalance::zero();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            // A slow refresh may overrun the deadline by at most one interval.
            let refresh_deadline =
                cmp::max(deadline, far_instant(Instant::now(), policy.interval));
            let refresh = tokio::time::timeout_at(
                refresh_deadline,
                self.requests.refresh_observed_balance(request_id),
            );

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(%request_id, attempts, "settlement poll cancelled");
                    return PollOutcome::TimedOut(last);
                }
                result = refresh => result,
            };

            match result {
                Ok(Ok(balance)) => {
                    on_refresh(&balance);
                    last = balance;
                    if balance.meets(expected) {
                        tracing::info!(
                            %request_id,
                            balance = balance.amount,
                            expected,
                            attempts,
                            "settlement observed"
                        );
                        return PollOutcome::Settled(balance);
                    }
                    tracing::debug!(
                        %request_id,
                        balance = balance.amount,
                        expected,
                        "awaiting settlement"
                    );
                }
                Ok(Err(e)) => {
                    tracing::warn!(%request_id, error = %e, "balance refresh failed");
                }
                Err(_) => {
                    tracing::warn!(%request_id, "balance refresh timed out");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    %request_id,
                    last_balance = last.amount,
                    expected,
                    elapsed_ms = now.duration_since(started).as_millis() as u64,
                    "settlement not observed before deadline"
                );
                return PollOutcome::TimedOut(last);
            }

            let wake = cmp::min(far_instant(now, policy.interval), deadline);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(%request_id, attempts, "settlement poll cancelled");
                    return PollOutcome::TimedOut(last);
                }
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }
}

/// `from + after`, clamped to roughly thirty years out.
fn far_instant(from: Instant, after: Duration) -> Instant {
    const FAR: Duration = Duration::from_secs(86_400 * 365 * 30);
    from + after.min(FAR)
}
