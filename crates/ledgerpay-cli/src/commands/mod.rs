pub mod init;
pub mod observe;
pub mod pay;

use ledgerpay_core::{PaymentRequest, SettlementConfig};
use ledgerpay_settlement::{CancellationToken, ChannelSink, SettlementOutcome};
use serde::Serialize;
use tokio::task::JoinHandle;

/// Workflow overrides shared by `pay` and `observe`.
#[derive(clap::Args, Debug, Clone)]
pub struct SettlementOverrides {
    /// Required confirmations for approval and transfer.
    #[arg(long)]
    pub confirmations: Option<u64>,

    /// Pause between balance refreshes, in milliseconds.
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// How long to wait for the funds to be observed, in milliseconds.
    #[arg(long)]
    pub poll_deadline_ms: Option<u64>,

    /// Print the final outcome as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SettlementOverrides {
    pub fn apply(&self, base: &SettlementConfig) -> SettlementConfig {
        let mut config = base.clone();
        if let Some(depth) = self.confirmations {
            config.confirmation_depth = depth;
        }
        if let Some(interval) = self.poll_interval_ms {
            config.poll_interval_ms = interval;
        }
        if let Some(deadline) = self.poll_deadline_ms {
            config.poll_deadline_ms = deadline;
        }
        config
    }
}

/// Print status updates as they arrive. Ends when every sink is dropped.
pub fn spawn_status_printer() -> (ChannelSink, JoinHandle<()>) {
    let (sink, mut rx) = ChannelSink::new();
    let printer = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            println!("  {:<17} {}", update.state.to_string(), update.detail);
        }
    });
    (sink, printer)
}

/// Cancel `token` on ctrl-c.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received ctrl-c, cancelling settlement");
            token.cancel();
        }
    });
}

#[derive(Serialize)]
struct OutcomeReport<'a> {
    request_id: String,
    outcome: String,
    expected_amount: String,
    observed_balance: Option<String>,
    payment_tx: Option<&'a str>,
    error_kind: Option<&'a str>,
    error: Option<String>,
}

/// Print the final outcome. Returns an error when the workflow failed.
pub fn report(
    request: &PaymentRequest,
    outcome: &SettlementOutcome,
    json: bool,
) -> anyhow::Result<()> {
    if json {
        let report = OutcomeReport {
            request_id: request.id.to_string(),
            outcome: outcome.state().to_string(),
            expected_amount: request.expected_amount.to_string(),
            observed_balance: outcome.observed_balance().map(|b| b.amount.to_string()),
            payment_tx: outcome.payment_tx().map(|h| h.as_str()),
            error_kind: outcome.error().map(|e| e.kind()),
            error: outcome.error().map(|e| e.to_string()),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        println!("Outcome:    {}", outcome);
        println!("  Request:  {}", request.id);
        if let Some(tx) = outcome.payment_tx() {
            println!("  Payment:  {}", tx);
        }
        if let Some(balance) = outcome.observed_balance() {
            println!("  Balance:  {} / {}", balance.amount, request.expected_amount);
        }
        if matches!(outcome, SettlementOutcome::TimedOut { .. }) {
            println!("  Settlement still pending; the payment may land later.");
        }
    }

    match outcome.error() {
        Some(error) if error.is_funds_in_flight() => anyhow::bail!(
            "{} (transfer may be in flight, reconcile manually)",
            error
        ),
        Some(error) => anyhow::bail!("{}", error),
        None => Ok(()),
    }
}
