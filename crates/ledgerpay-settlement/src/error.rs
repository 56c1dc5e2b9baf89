use ledgerpay_core::{CoreError, Identity, RequestId, SettlementState, TxHash};

/// Failures reported by ledger and request-ledger clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger rpc error: {0}")]
    Rpc(String),

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Settlement workflow errors.
///
/// `InsufficientFunds`, `Approval` and `Payment` abort the workflow. None of
/// them are retried inside the workflow.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SettlementError {
    #[error("insufficient funds for {payer}: available {available}, required {required} (short by {shortfall})")]
    InsufficientFunds {
        payer: Identity,
        available: u128,
        required: u128,
        shortfall: u128,
    },

    #[error("approval failed: {reason}")]
    Approval {
        reason: String,
        tx_hash: Option<TxHash>,
    },

    #[error("payment failed: {reason}")]
    Payment {
        reason: String,
        tx_hash: Option<TxHash>,
    },

    #[error("ledger query failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("a settlement workflow is already in flight for request {0}")]
    AlreadyInFlight(RequestId),

    #[error("settlement cancelled in state {state}")]
    Cancelled { state: SettlementState },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl SettlementError {
    /// Short taxonomy name, stable for logs and status lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientFunds { .. } => "FundingError",
            Self::Approval { .. } => "ApprovalError",
            Self::Payment { .. } => "PaymentError",
            Self::Ledger(_) => "LedgerError",
            Self::AlreadyInFlight(_) => "AlreadyInFlight",
            Self::Cancelled { .. } => "Cancelled",
            Self::Core(_) => "InvalidInput",
        }
    }

    /// Transaction involved in the failure, if one was submitted.
    pub fn tx_hash(&self) -> Option<&TxHash> {
        match self {
            Self::Approval { tx_hash, .. } | Self::Payment { tx_hash, .. } => tx_hash.as_ref(),
            _ => None,
        }
    }

    /// Whether funds may have left the payer. Needs manual reconciliation.
    pub fn is_funds_in_flight(&self) -> bool {
        matches!(self, Self::Payment { tx_hash: Some(_), .. })
    }
}
