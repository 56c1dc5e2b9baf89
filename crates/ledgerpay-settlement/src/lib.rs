//! Ledgerpay Settlement
//!
//! Drives a payment request from "awaiting payment" to "funds observed":
//! funding checks, conditional allowance approval, the transfer itself, and a
//! deadline-bounded poll of the request ledger. Ledger access goes through the
//! [`LedgerClient`] and [`RequestLedgerClient`] traits so any chain client (or
//! the in-memory adapters) can be plugged in.

pub mod error;
pub mod types;
pub mod traits;
pub mod sink;
pub mod funding;
pub mod approval;
pub mod executor;
pub mod poller;
pub mod orchestrator;
pub mod adapters;

mod confirmation;

pub use error::{LedgerError, SettlementError};
pub use types::{ConfirmedTransaction, SettlementOutcome, StatusUpdate};
pub use traits::{LedgerClient, RequestLedgerClient, StatusSink};
pub use sink::{ChannelSink, CollectingSink, NullSink, TracingSink};
pub use funding::FundingVerifier;
pub use approval::ApprovalCoordinator;
pub use executor::PaymentExecutor;
pub use poller::{PollOutcome, PollPolicy, SettlementPoller};
pub use orchestrator::SettlementOrchestrator;
pub use adapters::memory::{InMemoryLedger, InMemoryRequestLedger};

pub use tokio_util::sync::CancellationToken;
