//! `ledgerpay pay`: create a request and settle it end to end against the
//! in-memory ledger.

use chrono::{DateTime, Utc};
use clap::Args;
use ledgerpay_core::{Identity, PaymentNetwork, PaymentRequest};
use ledgerpay_settlement::{
    CancellationToken, InMemoryLedger, InMemoryRequestLedger, SettlementOrchestrator,
};
use std::sync::Arc;

use super::{cancel_on_ctrl_c, report, spawn_status_printer, SettlementOverrides};
use crate::config::LedgerpayConfig;

#[derive(Args, Debug)]
pub struct PayArgs {
    /// Expected amount in the smallest unit of the token.
    #[arg(long)]
    pub amount: u128,

    /// Payer address.
    #[arg(long, default_value = "0x4cC8D6BfF2A7fEf4F2b6DFd6f8C3D8eE6A1c2b3a")]
    pub payer: String,

    /// Payee address. Also the payment address of the request.
    #[arg(long, default_value = "0x7dD1a48BcD9F0e2a6E1c6bB5f1f7A0a7eF3C9d21")]
    pub payee: String,

    /// Starting payer balance. Defaults to twice the amount.
    #[arg(long)]
    pub fund: Option<u128>,

    /// Give the settlement contract a sufficient allowance up front.
    #[arg(long)]
    pub preapproved: bool,

    /// Create a streaming request with this flow rate (units per second).
    #[arg(long)]
    pub stream_rate: Option<u128>,

    /// Free-text reason stored with the request.
    #[arg(long)]
    pub reason: Option<String>,

    /// Due date stored with the request (RFC 3339).
    #[arg(long)]
    pub due_date: Option<DateTime<Utc>>,

    #[command(flatten)]
    pub overrides: SettlementOverrides,
}

pub async fn run(args: &PayArgs, config: &LedgerpayConfig) -> anyhow::Result<()> {
    let currency = config.network.currency()?;
    let proxy = config.network.proxy()?;
    let payer = Identity::parse(&args.payer)?;
    let payee = Identity::parse(&args.payee)?;
    let settlement = args.overrides.apply(&config.settlement);
    settlement.validate()?;

    let ledger = Arc::new(InMemoryLedger::new(proxy.clone()));
    let fund = args.fund.unwrap_or_else(|| args.amount.saturating_mul(2));
    ledger.mint(&payer, &currency, fund);
    if args.preapproved {
        ledger.set_allowance(&payer, &proxy, &currency, args.amount);
    }
    let requests = Arc::new(InMemoryRequestLedger::new(ledger.clone()));

    let network = match args.stream_rate {
        Some(rate) => PaymentNetwork::Stream {
            payment_address: payee.clone(),
            expected_flow_rate: rate,
            expected_start_date: Utc::now(),
        },
        None => PaymentNetwork::fixed(payee.clone()),
    };
    let mut request = PaymentRequest::new(payee, payer.clone(), currency, args.amount, network);
    if let Some(reason) = &args.reason {
        request = request.with_content("reason", serde_json::json!(reason));
    }
    if let Some(due) = args.due_date {
        request = request.with_content("dueDate", serde_json::json!(due.to_rfc3339()));
    }
    let request = requests.create_request(request)?;

    println!("Request created.");
    println!("  ID:       {}", request.id);
    println!("  Amount:   {} {}", request.expected_amount, request.currency);
    println!("  Payer:    {} (balance {})", payer, fund);
    println!("  Pay to:   {}", request.payment_address());
    println!();

    let orchestrator = SettlementOrchestrator::new(ledger.clone(), requests, proxy)
        .with_config(settlement.clone());

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let (sink, printer) = spawn_status_printer();
    let outcome = orchestrator
        .settle_with(&request, &payer, &settlement, &sink, &cancel)
        .await;
    drop(sink);
    printer.await?;

    tracing::debug!(
        payer_balance = ledger.balance_of(&payer, &request.currency),
        transfers = ledger.transfer_calls(),
        approvals = ledger.approval_calls(),
        "ledger state after settlement"
    );

    report(&request, &outcome, args.overrides.json)
}
