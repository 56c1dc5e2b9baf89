use async_trait::async_trait;
use ledgerpay_core::{
    ConfirmationStatus, Currency, Identity, ObservedBalance, RequestId, TransactionHandle,
};
use std::time::Duration;

use crate::error::LedgerError;
use crate::types::StatusUpdate;

/// Token ledger interface.
///
/// Implementations bridge to a concrete chain client. They are shared by every
/// workflow running in the process, so they must tolerate concurrent callers.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Spendable balance of `owner` in `currency`, in the smallest unit.
    async fn get_balance(&self, owner: &Identity, currency: &Currency)
        -> Result<u128, LedgerError>;

    /// Amount `spender` may move out of `owner`'s `currency` holdings.
    async fn get_allowance(
        &self,
        spender: &Identity,
        owner: &Identity,
        currency: &Currency,
    ) -> Result<u128, LedgerError>;

    /// Submit an allowance-granting transaction signed by `owner`.
    async fn submit_approval(
        &self,
        owner: &Identity,
        spender: &Identity,
        currency: &Currency,
        amount: u128,
    ) -> Result<TransactionHandle, LedgerError>;

    /// Submit a transfer of `amount` from `from` to `to`.
    async fn submit_transfer(
        &self,
        from: &Identity,
        to: &Identity,
        currency: &Currency,
        amount: u128,
    ) -> Result<TransactionHandle, LedgerError>;

    /// Wait until `tx` has at least `min_depth` confirmations, or `deadline`
    /// passes.
    async fn await_confirmations(
        &self,
        tx: &TransactionHandle,
        min_depth: u64,
        deadline: Duration,
    ) -> Result<ConfirmationStatus, LedgerError>;
}

/// Payment-request ledger interface.
#[async_trait]
pub trait RequestLedgerClient: Send + Sync {
    /// Re-read the funds attributed to a request.
    async fn refresh_observed_balance(
        &self,
        request_id: &RequestId,
    ) -> Result<ObservedBalance, LedgerError>;
}

/// Receives workflow status updates.
///
/// `emit` is called inline from the workflow and must not block: buffer or
/// forward the update and return.
pub trait StatusSink: Send + Sync {
    fn emit(&self, update: StatusUpdate);
}
