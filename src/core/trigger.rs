//! Due-check trigger: asks the program to re-evaluate dueness and emit events.

use starknet::core::types::Felt;
use std::sync::Arc;

use crate::core::context::KeeperContext;
use crate::core::dispatcher::{fee_ceiling, SubmitLock};
use crate::utils::error::{KeeperError, Result};
use crate::utils::rpc::{LedgerGateway, TerminalStatus};

/// Entrypoint that makes the program emit `DuePayment` for payable obligations.
pub const TRIGGER_ENTRYPOINT: &str = "check_due_payments";

/// Estimates, submits and confirms `check_due_payments()`.
pub struct DueCheckTrigger {
    gateway: Arc<dyn LedgerGateway>,
    contract: Felt,
    fee_margin_percent: u32,
    submit_lock: SubmitLock,
}

impl DueCheckTrigger {
    #[must_use]
    pub fn new(ctx: &KeeperContext) -> Self {
        Self {
            gateway: ctx.gateway.clone(),
            contract: ctx.contract,
            fee_margin_percent: ctx.config.fee_margin_percent,
            submit_lock: ctx.submit_lock.clone(),
        }
    }

    /// Fires the trigger once and waits for the transaction to settle.
    ///
    /// # Errors
    ///
    /// Returns the failing stage's error, or `KeeperError::ConfirmationFailed`
    /// if the transaction reverted or was rejected.
    pub async fn fire(&self) -> Result<Felt> {
        let estimate = self
            .gateway
            .estimate_fee(self.contract, TRIGGER_ENTRYPOINT, &[])
            .await?;
        let tx = {
            let _turn = self.submit_lock.lock().await;
            self.gateway
                .invoke(
                    self.contract,
                    TRIGGER_ENTRYPOINT,
                    &[],
                    fee_ceiling(estimate, self.fee_margin_percent),
                )
                .await?
        };

        match self.gateway.wait_for_confirmation(tx).await? {
            TerminalStatus::Succeeded => {
                tracing::info!(tx = %format!("{tx:#x}"), fee = estimate, "Due check triggered");
                Ok(tx)
            }
            TerminalStatus::Reverted { reason } => Err(KeeperError::ConfirmationFailed(format!(
                "{TRIGGER_ENTRYPOINT} reverted, tx={tx:#x}: {reason}"
            ))),
            TerminalStatus::Rejected => Err(KeeperError::ConfirmationFailed(format!(
                "{TRIGGER_ENTRYPOINT} rejected, tx={tx:#x}"
            ))),
        }
    }
}
