use ledgerpay_core::{ConfirmationStatus, TransactionHandle};
use std::time::Duration;

use crate::error::LedgerError;
use crate::traits::LedgerClient;

/// Wait for `handle` to reach `min_depth`, bounded by `deadline` even if the
/// client overruns it. A client reporting fewer confirmations than asked for
/// is treated as timed out.
pub(crate) async fn await_depth(
    ledger: &dyn LedgerClient,
    handle: &TransactionHandle,
    min_depth: u64,
    deadline: Duration,
) -> Result<ConfirmationStatus, LedgerError> {
    let waited = tokio::time::timeout(
        deadline,
        ledger.await_confirmations(handle, min_depth, deadline),
    )
    .await;

    match waited {
        Err(_) => Ok(ConfirmationStatus::TimedOut {
            confirmations: handle.confirmations,
        }),
        Ok(Ok(ConfirmationStatus::Confirmed { confirmations })) if confirmations < min_depth => {
            Ok(ConfirmationStatus::TimedOut { confirmations })
        }
        Ok(result) => result,
    }
}
