use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CoreError;

/// Tunables for one settlement workflow run.
///
/// Every field has a default, so a partial TOML table is enough. Callers can
/// override any of them per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Confirmations required for approval and transfer transactions.
    #[serde(default = "default_confirmation_depth")]
    pub confirmation_depth: u64,
    /// Deadline for the approval transaction to confirm (seconds).
    #[serde(default = "default_confirmation_timeout_secs")]
    pub approval_timeout_secs: u64,
    /// Deadline for the transfer transaction to confirm (seconds).
    #[serde(default = "default_confirmation_timeout_secs")]
    pub payment_timeout_secs: u64,
    /// Pause between balance refreshes (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Total time allowed for observing settlement (milliseconds).
    #[serde(default = "default_poll_deadline_ms")]
    pub poll_deadline_ms: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            confirmation_depth: default_confirmation_depth(),
            approval_timeout_secs: default_confirmation_timeout_secs(),
            payment_timeout_secs: default_confirmation_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_deadline_ms: default_poll_deadline_ms(),
        }
    }
}

impl SettlementConfig {
    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_secs)
    }

    pub fn payment_timeout(&self) -> Duration {
        Duration::from_secs(self.payment_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_deadline(&self) -> Duration {
        Duration::from_millis(self.poll_deadline_ms)
    }

    pub fn with_confirmation_depth(mut self, depth: u64) -> Self {
        self.confirmation_depth = depth;
        self
    }

    /// Sub-millisecond remainders round up, so a non-zero interval never
    /// becomes zero.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = millis_ceil(interval);
        self
    }

    pub fn with_poll_deadline(mut self, deadline: Duration) -> Self {
        self.poll_deadline_ms = millis_ceil(deadline);
        self
    }

    /// Timeouts are kept in whole seconds; any fraction rounds up.
    pub fn with_confirmation_timeouts(mut self, approval: Duration, payment: Duration) -> Self {
        self.approval_timeout_secs = secs_ceil(approval);
        self.payment_timeout_secs = secs_ceil(payment);
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.confirmation_depth == 0 {
            return Err(CoreError::InvalidConfig(
                "confirmation_depth must be at least 1".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.approval_timeout_secs == 0 || self.payment_timeout_secs == 0 {
            return Err(CoreError::InvalidConfig(
                "confirmation timeouts must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn secs_ceil(d: Duration) -> u64 {
    if d.subsec_nanos() > 0 {
        d.as_secs().saturating_add(1)
    } else {
        d.as_secs()
    }
}

fn millis_ceil(d: Duration) -> u64 {
    let millis = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
    if d.subsec_nanos() % 1_000_000 > 0 {
        millis.saturating_add(1)
    } else {
        millis
    }
}

fn default_confirmation_depth() -> u64 {
    2
}
fn default_confirmation_timeout_secs() -> u64 {
    120
}
fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_poll_deadline_ms() -> u64 {
    5_000
}
