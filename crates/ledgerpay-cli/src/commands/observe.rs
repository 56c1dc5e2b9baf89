//! `ledgerpay observe`: watch a request that a third party pays.

use clap::Args;
use ledgerpay_core::{Identity, PaymentNetwork, PaymentRequest};
use ledgerpay_settlement::{
    CancellationToken, InMemoryLedger, InMemoryRequestLedger, LedgerClient,
    SettlementOrchestrator,
};
use std::sync::Arc;

use super::{cancel_on_ctrl_c, report, spawn_status_printer, SettlementOverrides};
use crate::config::LedgerpayConfig;

#[derive(Args, Debug)]
pub struct ObserveArgs {
    /// Expected amount in the smallest unit of the token.
    #[arg(long)]
    pub amount: u128,

    /// Amount the third party pays. Defaults to the full amount; use 0 to
    /// watch an unpaid request time out.
    #[arg(long)]
    pub paid: Option<u128>,

    /// Payee address. Also the payment address of the request.
    #[arg(long, default_value = "0x7dD1a48BcD9F0e2a6E1c6bB5f1f7A0a7eF3C9d21")]
    pub payee: String,

    /// Address of the third party that pays.
    #[arg(long, default_value = "0x2B5AD5c4795c026514f8317c7a215E218DcCD6cF")]
    pub sender: String,

    #[command(flatten)]
    pub overrides: SettlementOverrides,
}

pub async fn run(args: &ObserveArgs, config: &LedgerpayConfig) -> anyhow::Result<()> {
    let currency = config.network.currency()?;
    let proxy = config.network.proxy()?;
    let payee = Identity::parse(&args.payee)?;
    let sender = Identity::parse(&args.sender)?;
    let settlement = args.overrides.apply(&config.settlement);
    settlement.validate()?;

    let ledger = Arc::new(InMemoryLedger::new(proxy.clone()));
    let requests = Arc::new(InMemoryRequestLedger::new(ledger.clone()));

    let request = requests.create_request(PaymentRequest::new(
        payee.clone(),
        sender.clone(),
        currency.clone(),
        args.amount,
        PaymentNetwork::fixed(payee.clone()),
    ))?;
    println!("Request created.");
    println!("  ID:       {}", request.id);
    println!("  Amount:   {} {}", request.expected_amount, request.currency);
    println!();

    let paid = args.paid.unwrap_or(args.amount);
    if paid > 0 {
        ledger.mint(&sender, &currency, paid);
        ledger.set_allowance(&sender, &proxy, &currency, paid);
        let tx = ledger.submit_transfer(&sender, &payee, &currency, paid).await?;
        println!("Third party sent {} in {}", paid, tx.hash);
    }

    let orchestrator =
        SettlementOrchestrator::new(ledger, requests, proxy).with_config(settlement.clone());

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let (sink, printer) = spawn_status_printer();
    let outcome = orchestrator
        .observe(&request, &settlement, &sink, &cancel)
        .await;
    drop(sink);
    printer.await?;

    report(&request, &outcome, args.overrides.json)
}
