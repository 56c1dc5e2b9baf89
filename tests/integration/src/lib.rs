//! Fixtures shared by the cross-crate settlement tests.

use async_trait::async_trait;
use ledgerpay_core::{Currency, Identity, ObservedBalance, PaymentNetwork, PaymentRequest, RequestId};
use ledgerpay_settlement::{
    InMemoryLedger, InMemoryRequestLedger, LedgerError, RequestLedgerClient,
    SettlementOrchestrator,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

pub fn proxy() -> Identity {
    Identity::new("0x399F5EE127ce7432E4921a61b8CF52b0af52cbfE")
}

pub fn payer() -> Identity {
    Identity::new("0x4cC8D6BfF2A7fEf4F2b6DFd6f8C3D8eE6A1c2b3a")
}

pub fn payee() -> Identity {
    Identity::new("0x7dD1a48BcD9F0e2a6E1c6bB5f1f7A0a7eF3C9d21")
}

pub fn token() -> Currency {
    Currency::erc20("0x370DE27fdb7D1Ff1e1BaA7D11c5820a324Cf623C", "sepolia")
}

pub fn fixed_request(amount: u128) -> PaymentRequest {
    PaymentRequest::new(payee(), payer(), token(), amount, PaymentNetwork::fixed(payee()))
}

/// An in-memory ledger, a request ledger watching it and an orchestrator
/// over both.
pub struct Harness {
    pub ledger: Arc<InMemoryLedger>,
    pub requests: Arc<InMemoryRequestLedger>,
    pub orchestrator: SettlementOrchestrator,
}

impl Harness {
    pub fn new() -> Self {
        let ledger = Arc::new(InMemoryLedger::new(proxy()));
        let requests = Arc::new(InMemoryRequestLedger::new(ledger.clone()));
        let orchestrator = SettlementOrchestrator::new(ledger.clone(), requests.clone(), proxy());
        Self {
            ledger,
            requests,
            orchestrator,
        }
    }

    /// Register a fixed-amount request from [`payer`] to [`payee`].
    pub fn request(&self, amount: u128) -> PaymentRequest {
        self.requests
            .create_request(fixed_request(amount))
            .expect("valid request")
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Request ledger whose observed balance never moves.
pub struct FrozenRequestLedger {
    balance: u128,
    refreshes: AtomicUsize,
}

impl FrozenRequestLedger {
    pub fn new(balance: u128) -> Self {
        Self {
            balance,
            refreshes: AtomicUsize::new(0),
        }
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestLedgerClient for FrozenRequestLedger {
    async fn refresh_observed_balance(
        &self,
        request_id: &RequestId,
    ) -> Result<ObservedBalance, LedgerError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(request_id = %request_id, "frozen refresh");
        Ok(ObservedBalance::new(self.balance))
    }
}
