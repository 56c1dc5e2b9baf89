use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::CoreError;

/// A ledger account address (payer, payee, spender contract, recipient).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    /// The all-zero address, used as the "no fee recipient" placeholder.
    pub const ZERO: &'static str = "0x0000000000000000000000000000000000000000";

    /// Create an identity from an address string.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The all-zero address.
    pub fn zero() -> Self {
        Self(Self::ZERO.to_string())
    }

    /// Parse and validate an address. Rejects empty input.
    pub fn parse(address: &str) -> Result<Self, CoreError> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidIdentity("empty address".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the all-zero address (case-insensitive).
    pub fn is_zero(&self) -> bool {
        self.0.eq_ignore_ascii_case(Self::ZERO)
    }

    fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of asset a request is denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurrencyKind {
    /// ERC-20 style token; payments go through an allowance.
    Erc20,
    /// ERC-777 style token (streamed payments); also allowance-gated.
    Erc777,
    /// The network's native coin; no allowance involved.
    Native,
}

impl CurrencyKind {
    pub fn code(&self) -> &str {
        match self {
            Self::Erc20 => "ERC20",
            Self::Erc777 => "ERC777",
            Self::Native => "NATIVE",
        }
    }
}

/// Currency descriptor: token kind, contract address and network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency {
    pub kind: CurrencyKind,
    /// Token contract address. Empty for the native coin.
    pub value: String,
    /// Network name (e.g. "sepolia").
    pub network: String,
}

impl Currency {
    pub fn erc20(contract: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            kind: CurrencyKind::Erc20,
            value: contract.into(),
            network: network.into(),
        }
    }

    pub fn erc777(contract: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            kind: CurrencyKind::Erc777,
            value: contract.into(),
            network: network.into(),
        }
    }

    pub fn native(network: impl Into<String>) -> Self {
        Self {
            kind: CurrencyKind::Native,
            value: String::new(),
            network: network.into(),
        }
    }

    /// Whether paying in this currency needs a spending allowance first.
    pub fn requires_allowance(&self) -> bool {
        matches!(self.kind, CurrencyKind::Erc20 | CurrencyKind::Erc777)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.is_empty() {
            write!(f, "{}@{}", self.kind.code(), self.network)
        } else {
            write!(f, "{}:{}@{}", self.kind.code(), self.value, self.network)
        }
    }
}

/// Unique identifier for a payment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Create a new time-ordered request ID (UUID v7).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payment-network parameters attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentNetwork {
    /// One-time payment of the expected amount, with an optional fee leg.
    FixedAmount {
        payment_address: Identity,
        fee_address: Identity,
        fee_amount: u128,
    },
    /// Continuous flow towards the payment address starting at a given time.
    Stream {
        payment_address: Identity,
        /// Tokens per second, in the smallest unit.
        expected_flow_rate: u128,
        expected_start_date: DateTime<Utc>,
    },
}

impl PaymentNetwork {
    /// Fixed payment with no fee.
    pub fn fixed(payment_address: Identity) -> Self {
        Self::FixedAmount {
            payment_address,
            fee_address: Identity::zero(),
            fee_amount: 0,
        }
    }

    /// The request's designated payment recipient.
    pub fn payment_address(&self) -> &Identity {
        match self {
            Self::FixedAmount {
                payment_address, ..
            } => payment_address,
            Self::Stream {
                payment_address, ..
            } => payment_address,
        }
    }
}

/// An off-chain payment request. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub id: RequestId,
    pub payee: Identity,
    pub payer: Identity,
    pub currency: Currency,
    /// Expected amount in the smallest indivisible unit of `currency`.
    pub expected_amount: u128,
    pub payment_network: PaymentNetwork,
    /// Descriptive metadata. Not used by settlement.
    pub content_data: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl PaymentRequest {
    pub fn new(
        payee: Identity,
        payer: Identity,
        currency: Currency,
        expected_amount: u128,
        payment_network: PaymentNetwork,
    ) -> Self {
        Self {
            id: RequestId::new(),
            payee,
            payer,
            currency,
            expected_amount,
            payment_network,
            content_data: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_content(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.content_data.insert(key.into(), value);
        self
    }

    pub fn payment_address(&self) -> &Identity {
        self.payment_network.payment_address()
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.expected_amount == 0 {
            return Err(CoreError::InvalidAmount(
                "expected amount must be greater than zero".into(),
            ));
        }
        if self.payee.is_empty() {
            return Err(CoreError::ValidationError("payee is empty".into()));
        }
        if self.payer.is_empty() {
            return Err(CoreError::ValidationError("payer is empty".into()));
        }
        if self.payment_address().is_empty() {
            return Err(CoreError::ValidationError("payment address is empty".into()));
        }
        if self.currency.requires_allowance() && self.currency.value.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "token currency needs a contract address".into(),
            ));
        }
        if let PaymentNetwork::Stream {
            expected_flow_rate, ..
        } = &self.payment_network
        {
            if *expected_flow_rate == 0 {
                return Err(CoreError::ValidationError(
                    "stream flow rate must be greater than zero".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Running total of funds the request ledger has attributed to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedBalance {
    /// Amount in the request currency's smallest unit.
    pub amount: u128,
    pub observed_at: DateTime<Utc>,
}

impl ObservedBalance {
    pub fn new(amount: u128) -> Self {
        Self {
            amount,
            observed_at: Utc::now(),
        }
    }

    pub fn zero() -> Self {
        Self::new(0)
    }

    /// Whether this balance covers `expected`. Same unit, no scaling.
    pub fn meets(&self, expected: u128) -> bool {
        self.amount >= expected
    }
}

impl fmt::Display for ObservedBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.amount)
    }
}

/// Ledger transaction hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(pub String);

impl TxHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A submitted transaction, as reported by the ledger client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHandle {
    pub hash: TxHash,
    pub confirmations: u64,
}

impl TransactionHandle {
    pub fn new(hash: TxHash) -> Self {
        Self {
            hash,
            confirmations: 0,
        }
    }
}

/// Result of waiting for a transaction to reach a confirmation depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationStatus {
    Confirmed { confirmations: u64 },
    TimedOut { confirmations: u64 },
    Reverted { reason: String },
}

/// Payer balance versus the expected amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceStatus {
    Sufficient { available: u128 },
    Insufficient { available: u128, required: u128 },
}

impl BalanceStatus {
    pub fn evaluate(available: u128, required: u128) -> Self {
        if available >= required {
            Self::Sufficient { available }
        } else {
            Self::Insufficient {
                available,
                required,
            }
        }
    }

    pub fn available(&self) -> u128 {
        match self {
            Self::Sufficient { available } | Self::Insufficient { available, .. } => *available,
        }
    }

    pub fn is_sufficient(&self) -> bool {
        matches!(self, Self::Sufficient { .. })
    }

    /// How much is missing; zero when sufficient.
    pub fn shortfall(&self) -> u128 {
        match self {
            Self::Sufficient { .. } => 0,
            Self::Insufficient {
                available,
                required,
            } => required - available,
        }
    }
}

/// Spender allowance versus the expected amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllowanceStatus {
    Approved,
    NotApproved { current: u128 },
}

impl AllowanceStatus {
    pub fn evaluate(current: u128, required: u128) -> Self {
        if current >= required {
            Self::Approved
        } else {
            Self::NotApproved { current }
        }
    }
}

/// Outcome of the funding checks. Computed fresh on every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingStatus {
    pub balance: BalanceStatus,
    pub allowance: AllowanceStatus,
}

impl FundingStatus {
    pub fn needs_approval(&self) -> bool {
        matches!(self.allowance, AllowanceStatus::NotApproved { .. })
    }
}
