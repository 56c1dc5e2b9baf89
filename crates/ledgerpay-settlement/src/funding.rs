use ledgerpay_core::{AllowanceStatus, BalanceStatus, FundingStatus, Identity, PaymentRequest};
use std::sync::Arc;

use crate::error::SettlementError;
use crate::traits::LedgerClient;

/// Decides whether a payer can proceed: enough balance, and whether the
/// settlement contract already holds enough allowance. Read-only.
pub struct FundingVerifier {
    ledger: Arc<dyn LedgerClient>,
    /// Settlement contract that spends the payer's tokens.
    spender: Identity,
}

impl FundingVerifier {
    pub fn new(ledger: Arc<dyn LedgerClient>, spender: Identity) -> Self {
        Self { ledger, spender }
    }

    /// Compare the payer's spendable balance with the expected amount.
    pub async fn check_balance(
        &self,
        request: &PaymentRequest,
        payer: &Identity,
    ) -> Result<BalanceStatus, SettlementError> {
        let available = self.ledger.get_balance(payer, &request.currency).await?;
        Ok(BalanceStatus::evaluate(available, request.expected_amount))
    }

    /// Compare the spender's allowance with the expected amount. Currencies
    /// without allowances are always `Approved`.
    pub async fn check_allowance(
        &self,
        request: &PaymentRequest,
        payer: &Identity,
    ) -> Result<AllowanceStatus, SettlementError> {
        if !request.currency.requires_allowance() {
            return Ok(AllowanceStatus::Approved);
        }
        let current = self
            .ledger
            .get_allowance(&self.spender, payer, &request.currency)
            .await?;
        Ok(AllowanceStatus::evaluate(current, request.expected_amount))
    }

    /// Run both checks. Insufficient balance is fatal and stops before the
    /// allowance is even queried.
    pub async fn verify(
        &self,
        request: &PaymentRequest,
        payer: &Identity,
    ) -> Result<FundingStatus, SettlementError> {
        let balance = self.check_balance(request, payer).await?;
        if let BalanceStatus::Insufficient {
            available,
            required,
        } = balance
        {
            tracing::warn!(
                request_id = %request.id,
                payer = %payer,
                available,
                required,
                "insufficient funds"
            );
            return Err(SettlementError::InsufficientFunds {
                payer: payer.clone(),
                available,
                required,
                shortfall: balance.shortfall(),
            });
        }

        let allowance = self.check_allowance(request, payer).await?;
        tracing::debug!(
            request_id = %request.id,
            payer = %payer,
            allowance = ?allowance,
            "funding verified"
        );
        Ok(FundingStatus { balance, allowance })
    }
}
