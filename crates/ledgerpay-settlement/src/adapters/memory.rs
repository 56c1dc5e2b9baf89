use async_trait::async_trait;
use dashmap::DashMap;
use ledgerpay_core::{
    ConfirmationStatus, CoreError, Currency, Identity, ObservedBalance, PaymentRequest, RequestId,
    TransactionHandle, TxHash,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::LedgerError;
use crate::traits::{LedgerClient, RequestLedgerClient};

/// A transfer applied to the in-memory ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    /// Position in the ledger's transfer log, starting at 1.
    pub seq: u64,
    pub hash: TxHash,
    pub from: Identity,
    pub to: Identity,
    pub currency: Currency,
    pub amount: u128,
}

#[derive(Debug, Clone)]
enum TxOutcome {
    Applied,
    Reverted(String),
}

/// In-memory token ledger.
///
/// Transactions are applied as soon as they are submitted and report exactly
/// the requested confirmation depth when awaited. Failure switches let tests
/// reject submissions, revert transfers, stall confirmations or fail reads.
/// Call counters make it usable as a spy.
pub struct InMemoryLedger {
    /// Settlement contract whose allowance token transfers consume.
    proxy: Identity,
    /// (owner, currency) -> balance.
    balances: DashMap<(Identity, Currency), u128>,
    /// (owner, spender, currency) -> allowance.
    allowances: DashMap<(Identity, Identity, Currency), u128>,
    transactions: DashMap<TxHash, TxOutcome>,
    transfers: DashMap<u64, TransferRecord>,
    transfer_seq: AtomicU64,
    nonce: AtomicU64,

    balance_queries: AtomicUsize,
    allowance_queries: AtomicUsize,
    approval_calls: AtomicUsize,
    transfer_calls: AtomicUsize,

    fail_reads: AtomicBool,
    reject_approvals: AtomicBool,
    reject_transfers: AtomicBool,
    revert_transfers: AtomicBool,
    stall_confirmations: AtomicBool,
}

impl InMemoryLedger {
    pub fn new(proxy: Identity) -> Self {
        Self {
            proxy,
            balances: DashMap::new(),
            allowances: DashMap::new(),
            transactions: DashMap::new(),
            transfers: DashMap::new(),
            transfer_seq: AtomicU64::new(0),
            nonce: AtomicU64::new(0),
            balance_queries: AtomicUsize::new(0),
            allowance_queries: AtomicUsize::new(0),
            approval_calls: AtomicUsize::new(0),
            transfer_calls: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            reject_approvals: AtomicBool::new(false),
            reject_transfers: AtomicBool::new(false),
            revert_transfers: AtomicBool::new(false),
            stall_confirmations: AtomicBool::new(false),
        }
    }

    pub fn proxy(&self) -> &Identity {
        &self.proxy
    }

    /// Credit `amount` to `owner` out of thin air.
    pub fn mint(&self, owner: &Identity, currency: &Currency, amount: u128) {
        *self
            .balances
            .entry((owner.clone(), currency.clone()))
            .or_insert(0) += amount;
    }

    pub fn set_allowance(
        &self,
        owner: &Identity,
        spender: &Identity,
        currency: &Currency,
        amount: u128,
    ) {
        self.allowances
            .insert((owner.clone(), spender.clone(), currency.clone()), amount);
    }

    pub fn balance_of(&self, owner: &Identity, currency: &Currency) -> u128 {
        self.balances
            .get(&(owner.clone(), currency.clone()))
            .map(|b| *b)
            .unwrap_or(0)
    }

    pub fn allowance_of(&self, owner: &Identity, spender: &Identity, currency: &Currency) -> u128 {
        self.allowances
            .get(&(owner.clone(), spender.clone(), currency.clone()))
            .map(|a| *a)
            .unwrap_or(0)
    }

    /// Sequence number of the most recent transfer (0 if none).
    pub fn transfer_seq(&self) -> u64 {
        self.transfer_seq.load(Ordering::SeqCst)
    }

    /// Total received by `to` in `currency` through transfers after `seq`.
    pub fn received_since(&self, seq: u64, to: &Identity, currency: &Currency) -> u128 {
        self.transfers
            .iter()
            .filter(|t| t.seq > seq && &t.to == to && &t.currency == currency)
            .map(|t| t.amount)
            .sum()
    }

    /// Transfer log in submission order.
    pub fn transfers(&self) -> Vec<TransferRecord> {
        let mut log: Vec<TransferRecord> = self.transfers.iter().map(|t| t.clone()).collect();
        log.sort_by_key(|t| t.seq);
        log
    }

    pub fn balance_queries(&self) -> usize {
        self.balance_queries.load(Ordering::SeqCst)
    }

    pub fn allowance_queries(&self) -> usize {
        self.allowance_queries.load(Ordering::SeqCst)
    }

    pub fn approval_calls(&self) -> usize {
        self.approval_calls.load(Ordering::SeqCst)
    }

    pub fn transfer_calls(&self) -> usize {
        self.transfer_calls.load(Ordering::SeqCst)
    }

    /// Make balance and allowance reads fail.
    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn reject_approvals(&self, on: bool) {
        self.reject_approvals.store(on, Ordering::SeqCst);
    }

    pub fn reject_transfers(&self, on: bool) {
        self.reject_transfers.store(on, Ordering::SeqCst);
    }

    /// Accept transfers but mark them reverted, leaving balances untouched.
    pub fn revert_transfers(&self, on: bool) {
        self.revert_transfers.store(on, Ordering::SeqCst);
    }

    /// Never reach the confirmation depth; waits run to their deadline.
    pub fn stall_confirmations(&self, on: bool) {
        self.stall_confirmations.store(on, Ordering::SeqCst);
    }

    fn next_hash(&self, kind: &str, from: &Identity, to: &Identity, amount: u128) -> TxHash {
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let preimage = format!("{}:{}:{}:{}:{}", kind, nonce, from, to, amount);
        TxHash::new(format!(
            "0x{}",
            hex::encode(blake3::hash(preimage.as_bytes()).as_bytes())
        ))
    }

    fn check_reads(&self) -> Result<(), LedgerError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(LedgerError::Rpc("node unavailable".into()));
        }
        Ok(())
    }

    /// Debit, credit and consume allowance.
    ///
    /// The payer's allowance and balance entries stay locked from the check
    /// through the debit, always allowance first, so concurrent transfers from
    /// one payer cannot both spend the same funds. The recipient is credited
    /// after both locks are released (`from` may equal `to`).
    fn apply_transfer(
        &self,
        from: &Identity,
        to: &Identity,
        currency: &Currency,
        amount: u128,
    ) -> Result<(), LedgerError> {
        let mut allowance = if currency.requires_allowance() {
            Some(
                self.allowances
                    .entry((from.clone(), self.proxy.clone(), currency.clone()))
                    .or_insert(0),
            )
        } else {
            None
        };
        let mut balance = self
            .balances
            .entry((from.clone(), currency.clone()))
            .or_insert(0);

        if *balance < amount {
            return Err(LedgerError::Rejected(format!(
                "transfer amount exceeds balance ({} < {})",
                *balance, amount
            )));
        }
        if let Some(allowance) = allowance.as_deref() {
            if *allowance < amount {
                return Err(LedgerError::Rejected(format!(
                    "insufficient allowance ({} < {})",
                    allowance, amount
                )));
            }
        }

        *balance -= amount;
        if let Some(allowance) = allowance.as_deref_mut() {
            *allowance -= amount;
        }
        drop(balance);
        drop(allowance);

        self.mint(to, currency, amount);
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn get_balance(
        &self,
        owner: &Identity,
        currency: &Currency,
    ) -> Result<u128, LedgerError> {
        self.balance_queries.fetch_add(1, Ordering::SeqCst);
        self.check_reads()?;
        Ok(self.balance_of(owner, currency))
    }

    async fn get_allowance(
        &self,
        spender: &Identity,
        owner: &Identity,
        currency: &Currency,
    ) -> Result<u128, LedgerError> {
        self.allowance_queries.fetch_add(1, Ordering::SeqCst);
        self.check_reads()?;
        Ok(self.allowance_of(owner, spender, currency))
    }

    async fn submit_approval(
        &self,
        owner: &Identity,
        spender: &Identity,
        currency: &Currency,
        amount: u128,
    ) -> Result<TransactionHandle, LedgerError> {
        self.approval_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_approvals.load(Ordering::SeqCst) {
            return Err(LedgerError::Rejected("approval rejected".into()));
        }
        let hash = self.next_hash("approve", owner, spender, amount);
        self.set_allowance(owner, spender, currency, amount);
        self.transactions.insert(hash.clone(), TxOutcome::Applied);
        tracing::debug!(tx_hash = %hash, owner = %owner, spender = %spender, amount, "in-memory approval");
        Ok(TransactionHandle::new(hash))
    }

    async fn submit_transfer(
        &self,
        from: &Identity,
        to: &Identity,
        currency: &Currency,
        amount: u128,
    ) -> Result<TransactionHandle, LedgerError> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_transfers.load(Ordering::SeqCst) {
            return Err(LedgerError::Rejected("transfer rejected".into()));
        }
        let hash = self.next_hash("transfer", from, to, amount);

        if self.revert_transfers.load(Ordering::SeqCst) {
            self.transactions.insert(
                hash.clone(),
                TxOutcome::Reverted("execution reverted".into()),
            );
            return Ok(TransactionHandle::new(hash));
        }

        self.apply_transfer(from, to, currency, amount)?;
        let seq = self.transfer_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.transfers.insert(
            seq,
            TransferRecord {
                seq,
                hash: hash.clone(),
                from: from.clone(),
                to: to.clone(),
                currency: currency.clone(),
                amount,
            },
        );
        self.transactions.insert(hash.clone(), TxOutcome::Applied);
        tracing::debug!(tx_hash = %hash, from = %from, to = %to, amount, "in-memory transfer");
        Ok(TransactionHandle::new(hash))
    }

    async fn await_confirmations(
        &self,
        tx: &TransactionHandle,
        min_depth: u64,
        deadline: Duration,
    ) -> Result<ConfirmationStatus, LedgerError> {
        let outcome = self
            .transactions
            .get(&tx.hash)
            .map(|o| o.clone())
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {}", tx.hash)))?;

        if self.stall_confirmations.load(Ordering::SeqCst) {
            tokio::time::sleep(deadline).await;
            return Ok(ConfirmationStatus::TimedOut {
                confirmations: tx.confirmations,
            });
        }

        Ok(match outcome {
            TxOutcome::Applied => ConfirmationStatus::Confirmed {
                confirmations: min_depth,
            },
            TxOutcome::Reverted(reason) => ConfirmationStatus::Reverted { reason },
        })
    }
}

struct StoredRequest {
    request: PaymentRequest,
    /// Ledger transfer sequence when the request was created.
    since_seq: u64,
}

/// In-memory request ledger backed by an [`InMemoryLedger`].
///
/// A request's observed balance is the sum of transfers to its payment
/// address, in its currency, made after the request was created.
pub struct InMemoryRequestLedger {
    ledger: Arc<InMemoryLedger>,
    requests: DashMap<RequestId, StoredRequest>,
    refresh_calls: AtomicUsize,
}

impl InMemoryRequestLedger {
    pub fn new(ledger: Arc<InMemoryLedger>) -> Self {
        Self {
            ledger,
            requests: DashMap::new(),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    /// Validate and store a request. Returns the stored copy.
    pub fn create_request(&self, request: PaymentRequest) -> Result<PaymentRequest, CoreError> {
        request.validate()?;
        let since_seq = self.ledger.transfer_seq();
        tracing::info!(
            request_id = %request.id,
            payee = %request.payee,
            expected = request.expected_amount,
            currency = %request.currency,
            "payment request created"
        );
        self.requests.insert(
            request.id,
            StoredRequest {
                request: request.clone(),
                since_seq,
            },
        );
        Ok(request)
    }

    pub fn get_request(&self, request_id: &RequestId) -> Option<PaymentRequest> {
        self.requests.get(request_id).map(|r| r.request.clone())
    }

    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestLedgerClient for InMemoryRequestLedger {
    async fn refresh_observed_balance(
        &self,
        request_id: &RequestId,
    ) -> Result<ObservedBalance, LedgerError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let stored = self
            .requests
            .get(request_id)
            .ok_or_else(|| LedgerError::NotFound(format!("request {}", request_id)))?;
        let received = self.ledger.received_since(
            stored.since_seq,
            stored.request.payment_address(),
            &stored.request.currency,
        );
        Ok(ObservedBalance::new(received))
    }
}
