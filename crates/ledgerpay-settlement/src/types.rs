use chrono::{DateTime, Utc};
use ledgerpay_core::{ObservedBalance, RequestId, SettlementState, TxHash};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SettlementError;

/// A transaction that reached the required confirmation depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedTransaction {
    pub hash: TxHash,
    pub confirmations: u64,
}

/// One status emission, sent at every workflow transition and on each
/// balance refresh while polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub request_id: RequestId,
    pub state: SettlementState,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn new(request_id: RequestId, state: SettlementState, detail: impl Into<String>) -> Self {
        Self {
            request_id,
            state,
            detail: detail.into(),
            at: Utc::now(),
        }
    }
}

impl fmt::Display for StatusUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.request_id, self.state, self.detail)
    }
}

/// Terminal result of one workflow invocation.
///
/// `payment_tx` is the transfer hash whenever a transfer was submitted.
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    /// Observed funds met the expected amount.
    Settled {
        balance: ObservedBalance,
        payment_tx: Option<TxHash>,
    },
    /// The poll deadline passed first. Not an error: the payment may still
    /// land and a fresh poll can be issued.
    TimedOut {
        last_balance: ObservedBalance,
        payment_tx: Option<TxHash>,
    },
    /// A fatal error aborted the workflow in state `failed_in`.
    Failed {
        error: SettlementError,
        failed_in: SettlementState,
        payment_tx: Option<TxHash>,
    },
}

impl SettlementOutcome {
    /// The terminal state this outcome corresponds to.
    pub fn state(&self) -> SettlementState {
        match self {
            Self::Settled { .. } => SettlementState::Settled,
            Self::TimedOut { .. } => SettlementState::TimedOut,
            Self::Failed { .. } => SettlementState::Failed,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled { .. })
    }

    pub fn payment_tx(&self) -> Option<&TxHash> {
        match self {
            Self::Settled { payment_tx, .. }
            | Self::TimedOut { payment_tx, .. }
            | Self::Failed { payment_tx, .. } => payment_tx.as_ref(),
        }
    }

    pub fn error(&self) -> Option<&SettlementError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Last balance seen by the poller, if polling ran.
    pub fn observed_balance(&self) -> Option<&ObservedBalance> {
        match self {
            Self::Settled { balance, .. } => Some(balance),
            Self::TimedOut { last_balance, .. } => Some(last_balance),
            Self::Failed { .. } => None,
        }
    }
}

impl fmt::Display for SettlementOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Settled { balance, .. } => write!(f, "Settled (balance {})", balance),
            Self::TimedOut { last_balance, .. } => {
                write!(f, "TimedOut (last balance {})", last_balance)
            }
            Self::Failed {
                error, failed_in, ..
            } => write!(f, "Failed in {} ({}: {})", failed_in, error.kind(), error),
        }
    }
}
