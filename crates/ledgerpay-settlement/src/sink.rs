//! Status sinks.

use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

use ledgerpay_core::SettlementState;

use crate::traits::StatusSink;
use crate::types::StatusUpdate;

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn emit(&self, _update: StatusUpdate) {}
}

/// Forwards updates to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn emit(&self, update: StatusUpdate) {
        tracing::info!(
            request_id = %update.request_id,
            state = %update.state,
            detail = %update.detail,
            "settlement status"
        );
    }
}

/// Pushes updates onto an unbounded channel. Never blocks; updates sent after
/// the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusSink for ChannelSink {
    fn emit(&self, update: StatusUpdate) {
        if self.tx.send(update).is_err() {
            tracing::trace!("status receiver dropped");
        }
    }
}

/// Buffers updates in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    updates: Mutex<Vec<StatusUpdate>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Distinct state sequence, with consecutive repeats (polling progress)
    /// collapsed.
    pub fn states(&self) -> Vec<SettlementState> {
        let mut states: Vec<SettlementState> = Vec::new();
        for update in self.updates() {
            if states.last() != Some(&update.state) {
                states.push(update.state);
            }
        }
        states
    }
}

impl StatusSink for CollectingSink {
    fn emit(&self, update: StatusUpdate) {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(update);
    }
}
