//! Ledgerpay core: payment request model, settlement state machine, and
//! settlement configuration shared by the workflow and its callers.

pub mod error;
pub mod types;
pub mod state_machine;
pub mod config;

pub use config::SettlementConfig;
pub use error::CoreError;
pub use state_machine::{SettlementEvent, SettlementState, SettlementStateMachine};
pub use types::{
    AllowanceStatus, BalanceStatus, ConfirmationStatus, Currency, CurrencyKind, FundingStatus,
    Identity, ObservedBalance, PaymentNetwork, PaymentRequest, RequestId, TransactionHandle,
    TxHash,
};
