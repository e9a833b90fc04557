//! Payment attempts and their terminal outcomes.

use starknet::core::types::Felt;

use super::obligation::ObligationId;

/// Dispatch stage at which an attempt stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchStage {
    Estimate,
    Submit,
    Confirm,
}

impl DispatchStage {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStage::Estimate => "estimation",
            DispatchStage::Submit => "submission",
            DispatchStage::Confirm => "confirmation",
        }
    }
}

/// Terminal state of a payment attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The payment transaction succeeded on the ledger.
    Confirmed { tx: Felt },
    /// The transaction reached a terminal failure state (reverted/rejected).
    Rejected { tx: Felt, reason: String },
    /// A gateway call failed before a terminal ledger state was observed.
    Failed { stage: DispatchStage, error: String },
    /// The signal was withheld before dispatch (replay suppression).
    Skipped { reason: String },
}

/// One dispatch of one obligation. Lives only for the duration of a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentAttempt {
    pub obligation_id: ObligationId,
    pub estimated_fee: Option<u128>,
    pub fee_ceiling: Option<u128>,
    pub tx: Option<Felt>,
    pub outcome: AttemptOutcome,
}

impl PaymentAttempt {
    /// An attempt that ended at `stage` with `error`.
    pub(crate) fn failed(obligation_id: ObligationId, stage: DispatchStage, error: String) -> Self {
        Self {
            obligation_id,
            estimated_fee: None,
            fee_ceiling: None,
            tx: None,
            outcome: AttemptOutcome::Failed { stage, error },
        }
    }

    pub(crate) fn with_fees(mut self, estimate: u128, ceiling: u128) -> Self {
        self.estimated_fee = Some(estimate);
        self.fee_ceiling = Some(ceiling);
        self
    }

    /// A signal that was never dispatched.
    #[must_use]
    pub fn skipped(obligation_id: ObligationId, reason: impl Into<String>) -> Self {
        Self {
            obligation_id,
            estimated_fee: None,
            fee_ceiling: None,
            tx: None,
            outcome: AttemptOutcome::Skipped {
                reason: reason.into(),
            },
        }
    }

    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Confirmed { .. })
    }

    /// Stage at which the attempt failed, if it failed before confirmation.
    #[must_use]
    pub fn failed_stage(&self) -> Option<DispatchStage> {
        match self.outcome {
            AttemptOutcome::Failed { stage, .. } => Some(stage),
            AttemptOutcome::Rejected { .. } => Some(DispatchStage::Confirm),
            _ => None,
        }
    }
}
