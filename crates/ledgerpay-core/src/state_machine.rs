use std::fmt;

use crate::error::CoreError;
use crate::types::FundingStatus;

/// States of a settlement workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SettlementState {
    /// A payment request handle has been supplied.
    Created,
    /// Balance and allowance have been checked.
    FundingChecked,
    /// An allowance-granting transaction is in flight.
    ApprovalPending,
    /// The spender holds a sufficient allowance.
    Approved,
    /// The transfer transaction has been submitted.
    PaymentSubmitted,
    /// The transfer reached the required confirmation depth.
    PaymentConfirmed,
    /// Waiting for the request ledger to observe the funds.
    Polling,
    /// Observed balance met the expected amount. Final state.
    Settled,
    /// Poll deadline reached before the funds were observed. Final state.
    TimedOut,
    /// A fatal error aborted the workflow. Final state.
    Failed,
}

impl SettlementState {
    /// Whether this is a terminal state.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Settled | Self::TimedOut | Self::Failed)
    }

    /// Whether the transfer has (possibly) left the payer's control.
    pub fn payment_in_flight(&self) -> bool {
        matches!(
            self,
            Self::PaymentSubmitted | Self::PaymentConfirmed | Self::Polling | Self::Settled
        )
    }
}

impl fmt::Display for SettlementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::FundingChecked => write!(f, "FundingChecked"),
            Self::ApprovalPending => write!(f, "ApprovalPending"),
            Self::Approved => write!(f, "Approved"),
            Self::PaymentSubmitted => write!(f, "PaymentSubmitted"),
            Self::PaymentConfirmed => write!(f, "PaymentConfirmed"),
            Self::Polling => write!(f, "Polling"),
            Self::Settled => write!(f, "Settled"),
            Self::TimedOut => write!(f, "TimedOut"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Events that drive settlement state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SettlementEvent {
    /// Payer balance covers the expected amount.
    FundsVerified,
    /// Spender allowance is below the expected amount.
    AllowanceMissing,
    /// Spender allowance already covers the expected amount.
    AllowanceSufficient,
    /// The approval transaction reached the confirmation depth.
    ApprovalConfirmed,
    /// The transfer transaction was accepted by the ledger.
    PaymentSubmitted,
    /// The transfer reached the confirmation depth.
    PaymentConfirmed,
    /// Balance polling has begun.
    PollingStarted,
    /// Observed balance met the expected amount.
    BalanceReached,
    /// Poll deadline elapsed (or polling was cancelled).
    DeadlineElapsed,
    /// A fatal error occurred.
    Failure,
}

/// Settlement workflow transitions.
///
/// Valid transitions:
/// - Created → FundingChecked (FundsVerified)
/// - Created → Polling (PollingStarted, observe-only runs)
/// - FundingChecked → ApprovalPending (AllowanceMissing)
/// - FundingChecked → Approved (AllowanceSufficient)
/// - ApprovalPending → Approved (ApprovalConfirmed)
/// - Approved → PaymentSubmitted (PaymentSubmitted)
/// - PaymentSubmitted → PaymentConfirmed (PaymentConfirmed)
/// - PaymentConfirmed → Polling (PollingStarted)
/// - Polling → Settled (BalanceReached)
/// - Polling → TimedOut (DeadlineElapsed)
/// - any non-final state → Failed (Failure)
pub struct SettlementStateMachine;

impl SettlementStateMachine {
    /// Attempt a state transition. Returns the new state, or an error for
    /// transitions the workflow does not allow.
    pub fn transition(
        current: SettlementState,
        event: SettlementEvent,
    ) -> Result<SettlementState, CoreError> {
        use SettlementEvent as E;
        use SettlementState as S;

        let next = match (current, event) {
            (S::Created, E::FundsVerified) => S::FundingChecked,
            (S::Created, E::PollingStarted) => S::Polling,

            (S::FundingChecked, E::AllowanceMissing) => S::ApprovalPending,
            (S::FundingChecked, E::AllowanceSufficient) => S::Approved,

            (S::ApprovalPending, E::ApprovalConfirmed) => S::Approved,

            (S::Approved, E::PaymentSubmitted) => S::PaymentSubmitted,
            (S::PaymentSubmitted, E::PaymentConfirmed) => S::PaymentConfirmed,
            (S::PaymentConfirmed, E::PollingStarted) => S::Polling,

            (S::Polling, E::BalanceReached) => S::Settled,
            (S::Polling, E::DeadlineElapsed) => S::TimedOut,

            (state, E::Failure) if !state.is_final() => S::Failed,

            _ => {
                return Err(CoreError::InvalidStateTransition {
                    from: current,
                    event,
                })
            }
        };

        tracing::debug!(
            from = %current,
            to = %next,
            event = ?event,
            "settlement state transition"
        );

        Ok(next)
    }

    /// Check if a transition is valid without performing it.
    pub fn can_transition(current: SettlementState, event: SettlementEvent) -> bool {
        Self::transition(current, event).is_ok()
    }

    /// The event that leaves `FundingChecked`, derived from the funding checks.
    pub fn funding_event(status: &FundingStatus) -> SettlementEvent {
        if status.needs_approval() {
            SettlementEvent::AllowanceMissing
        } else {
            SettlementEvent::AllowanceSufficient
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AllowanceStatus, BalanceStatus};

    fn run(events: &[SettlementEvent]) -> Result<SettlementState, CoreError> {
        events
            .iter()
            .try_fold(SettlementState::Created, |state, event| {
                SettlementStateMachine::transition(state, *event)
            })
    }

    #[test]
    fn test_path_with_approval() {
        use SettlementEvent::*;
        let state = run(&[
            FundsVerified,
            AllowanceMissing,
            ApprovalConfirmed,
            PaymentSubmitted,
            PaymentConfirmed,
            PollingStarted,
            BalanceReached,
        ])
        .unwrap();
        assert_eq!(state, SettlementState::Settled);
        assert!(state.is_final());
    }

    #[test]
    fn test_path_with_existing_allowance() {
        use SettlementEvent::*;
        let state = run(&[
            FundsVerified,
            AllowanceSufficient,
            PaymentSubmitted,
            PaymentConfirmed,
            PollingStarted,
            DeadlineElapsed,
        ])
        .unwrap();
        assert_eq!(state, SettlementState::TimedOut);
        assert!(state.is_final());
    }

    #[test]
    fn test_observe_only_path() {
        let state = run(&[SettlementEvent::PollingStarted, SettlementEvent::BalanceReached]).unwrap();
        assert_eq!(state, SettlementState::Settled);
    }

    #[test]
    fn test_failure_from_every_non_final_state() {
        for state in [
            SettlementState::Created,
            SettlementState::FundingChecked,
            SettlementState::ApprovalPending,
            SettlementState::Approved,
            SettlementState::PaymentSubmitted,
            SettlementState::PaymentConfirmed,
            SettlementState::Polling,
        ] {
            let next = SettlementStateMachine::transition(state, SettlementEvent::Failure).unwrap();
            assert_eq!(next, SettlementState::Failed);
        }
    }

    #[test]
    fn test_final_states_reject_everything() {
        for state in [
            SettlementState::Settled,
            SettlementState::TimedOut,
            SettlementState::Failed,
        ] {
            assert!(!SettlementStateMachine::can_transition(state, SettlementEvent::Failure));
            assert!(!SettlementStateMachine::can_transition(
                state,
                SettlementEvent::PollingStarted
            ));
        }
    }

    #[test]
    fn test_cannot_pay_before_funding_checked() {
        let result =
            SettlementStateMachine::transition(SettlementState::Created, SettlementEvent::PaymentSubmitted);
        assert!(matches!(
            result,
            Err(CoreError::InvalidStateTransition {
                from: SettlementState::Created,
                event: SettlementEvent::PaymentSubmitted,
            })
        ));
    }

    #[test]
    fn test_cannot_pay_while_approval_pending() {
        assert!(!SettlementStateMachine::can_transition(
            SettlementState::ApprovalPending,
            SettlementEvent::PaymentSubmitted
        ));
    }

    #[test]
    fn test_cannot_poll_before_payment_confirmed() {
        assert!(!SettlementStateMachine::can_transition(
            SettlementState::PaymentSubmitted,
            SettlementEvent::PollingStarted
        ));
    }

    #[test]
    fn test_funding_event() {
        let sufficient = BalanceStatus::Sufficient { available: 10 };
        let missing = FundingStatus {
            balance: sufficient,
            allowance: AllowanceStatus::NotApproved { current: 0 },
        };
        let present = FundingStatus {
            balance: sufficient,
            allowance: AllowanceStatus::Approved,
        };
        assert_eq!(
            SettlementStateMachine::funding_event(&missing),
            SettlementEvent::AllowanceMissing
        );
        assert_eq!(
            SettlementStateMachine::funding_event(&present),
            SettlementEvent::AllowanceSufficient
        );
    }

    #[test]
    fn test_payment_in_flight() {
        assert!(!SettlementState::Approved.payment_in_flight());
        assert!(SettlementState::PaymentSubmitted.payment_in_flight());
        assert!(SettlementState::Polling.payment_in_flight());
    }

    #[test]
    fn test_display() {
        assert_eq!(SettlementState::ApprovalPending.to_string(), "ApprovalPending");
        assert_eq!(SettlementState::TimedOut.to_string(), "TimedOut");
    }
}
