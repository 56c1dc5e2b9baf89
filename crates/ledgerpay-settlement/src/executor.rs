use ledgerpay_core::{
    ConfirmationStatus, Identity, PaymentRequest, SettlementConfig, TransactionHandle,
};
use std::sync::Arc;

use crate::confirmation::await_depth;
use crate::error::SettlementError;
use crate::traits::LedgerClient;
use crate::types::ConfirmedTransaction;

/// Submits the transfer to the request's payment address and waits for it
/// to confirm.
///
/// The transfer is the one irreversible step of the workflow. Nothing here
/// retries it.
pub struct PaymentExecutor {
    ledger: Arc<dyn LedgerClient>,
}

impl PaymentExecutor {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }

    /// Submit the transfer of the expected amount from `payer`.
    pub async fn submit(
        &self,
        request: &PaymentRequest,
        payer: &Identity,
    ) -> Result<TransactionHandle, SettlementError> {
        let recipient = request.payment_address();
        let handle = self
            .ledger
            .submit_transfer(payer, recipient, &request.currency, request.expected_amount)
            .await
            .map_err(|e| SettlementError::Payment {
                reason: format!("submission failed: {}", e),
                tx_hash: None,
            })?;

        tracing::info!(
            request_id = %request.id,
            tx_hash = %handle.hash,
            recipient = %recipient,
            amount = request.expected_amount,
            "payment submitted"
        );
        Ok(handle)
    }

    /// Block until `handle` reaches the configured depth. Timeout and revert
    /// are both fatal and carry the hash for reconciliation.
    pub async fn await_confirmed(
        &self,
        handle: &TransactionHandle,
        config: &SettlementConfig,
    ) -> Result<ConfirmedTransaction, SettlementError> {
        let depth = config.confirmation_depth;
        let status = await_depth(
            self.ledger.as_ref(),
            handle,
            depth,
            config.payment_timeout(),
        )
        .await;

        let fail = |reason: String| {
            tracing::error!(tx_hash = %handle.hash, %reason, "payment not confirmed");
            SettlementError::Payment {
                reason,
                tx_hash: Some(handle.hash.clone()),
            }
        };

        match status {
            Ok(ConfirmationStatus::Confirmed { confirmations }) => {
                tracing::info!(tx_hash = %handle.hash, confirmations, "payment confirmed");
                Ok(ConfirmedTransaction {
                    hash: handle.hash.clone(),
                    confirmations,
                })
            }
            Ok(ConfirmationStatus::TimedOut { confirmations }) => Err(fail(format!(
                "not confirmed within {:?} ({}/{} confirmations)",
                config.payment_timeout(),
                confirmations,
                depth
            ))),
            Ok(ConfirmationStatus::Reverted { reason }) => {
                Err(fail(format!("transaction reverted: {}", reason)))
            }
            Err(e) => Err(fail(format!("confirmation wait failed: {}", e))),
        }
    }

    /// Submit and wait in one call.
    pub async fn execute(
        &self,
        request: &PaymentRequest,
        payer: &Identity,
        config: &SettlementConfig,
    ) -> Result<ConfirmedTransaction, SettlementError> {
        let handle = self.submit(request, payer).await?;
        self.await_confirmed(&handle, config).await
    }
}
