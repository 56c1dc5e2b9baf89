use ledgerpay_core::{ConfirmationStatus, Identity, PaymentRequest, SettlementConfig};
use std::sync::Arc;

use crate::confirmation::await_depth;
use crate::error::SettlementError;
use crate::traits::LedgerClient;
use crate::types::ConfirmedTransaction;

/// Grants the settlement contract an allowance over the payer's tokens and
/// waits for that grant to confirm.
///
/// Called at most once per workflow run, and only when funding verification
/// reported a missing allowance.
pub struct ApprovalCoordinator {
    ledger: Arc<dyn LedgerClient>,
    spender: Identity,
}

impl ApprovalCoordinator {
    pub fn new(ledger: Arc<dyn LedgerClient>, spender: Identity) -> Self {
        Self { ledger, spender }
    }

    /// Submit one approval for the expected amount and block until it has
    /// `config.confirmation_depth` confirmations or `config.approval_timeout()`
    /// elapses.
    pub async fn approve(
        &self,
        request: &PaymentRequest,
        payer: &Identity,
        config: &SettlementConfig,
    ) -> Result<ConfirmedTransaction, SettlementError> {
        let handle = self
            .ledger
            .submit_approval(
                payer,
                &self.spender,
                &request.currency,
                request.expected_amount,
            )
            .await
            .map_err(|e| SettlementError::Approval {
                reason: format!("submission failed: {}", e),
                tx_hash: None,
            })?;

        tracing::info!(
            request_id = %request.id,
            tx_hash = %handle.hash,
            spender = %self.spender,
            amount = request.expected_amount,
            "approval submitted"
        );

        let depth = config.confirmation_depth;
        let status = await_depth(
            self.ledger.as_ref(),
            &handle,
            depth,
            config.approval_timeout(),
        )
        .await;

        let fail = |reason: String| SettlementError::Approval {
            reason,
            tx_hash: Some(handle.hash.clone()),
        };

        match status {
            Ok(ConfirmationStatus::Confirmed { confirmations }) => {
                tracing::info!(
                    request_id = %request.id,
                    tx_hash = %handle.hash,
                    confirmations,
                    "approval confirmed"
                );
                Ok(ConfirmedTransaction {
                    hash: handle.hash.clone(),
                    confirmations,
                })
            }
            Ok(ConfirmationStatus::TimedOut { confirmations }) => Err(fail(format!(
                "not confirmed within {:?} ({}/{} confirmations)",
                config.approval_timeout(),
                confirmations,
                depth
            ))),
            Ok(ConfirmationStatus::Reverted { reason }) => {
                Err(fail(format!("transaction reverted: {}", reason)))
            }
            Err(e) => Err(fail(format!("confirmation wait failed: {}", e))),
        }
    }
}
