//! Per-obligation payment dispatch: estimate, submit, confirm.
//!
//! Every obligation gets its own [`PaymentAttempt`]. A failure at any stage
//! ends that attempt only; the batch continues and every id handed in comes
//! back out, in input order.
//!
//! Estimation and confirmation run concurrently up to the configured bound.
//! Submission takes the shared [`SubmitLock`]: every invocation is signed by
//! the same account, and two in flight at once would race for one nonce.

use futures::future::join_all;
use starknet::core::types::Felt;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};

use crate::types::{AttemptOutcome, DispatchStage, ObligationId, PaymentAttempt};
use crate::utils::logging::log_attempt;
use crate::utils::rpc::{LedgerGateway, TerminalStatus};

/// Entrypoint that executes one scheduled payment.
pub const PAY_ENTRYPOINT: &str = "make_schedule_payment";

/// Default fee ceiling margin over the estimate, in percent.
pub const DEFAULT_FEE_MARGIN_PERCENT: u32 = 20;

/// `estimate + estimate * margin_percent / 100`, saturating at `u128::MAX`.
///
/// Never below `estimate`.
#[must_use]
pub fn fee_ceiling(estimate: u128, margin_percent: u32) -> u128 {
    let margin = u128::from(margin_percent);
    let extra = (estimate / 100)
        .saturating_mul(margin)
        .saturating_add(estimate % 100 * margin / 100);
    estimate.saturating_add(extra)
}

/// Serializes submissions from every task that signs with the keeper's account.
pub type SubmitLock = Arc<AsyncMutex<()>>;

/// Obligations handed to the dispatcher that have not reached a terminal state.
///
/// Shared with the scheduler so an abandoned tick can report what it left behind.
#[derive(Debug, Default)]
pub struct TickProgress {
    pending: Mutex<BTreeMap<ObligationId, usize>>,
}

impl TickProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn begin(&self, id: ObligationId) {
        if let Ok(mut pending) = self.pending.lock() {
            *pending.entry(id).or_insert(0) += 1;
        }
    }

    fn settle(&self, id: ObligationId) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(count) = pending.get_mut(&id) {
                *count -= 1;
                if *count == 0 {
                    pending.remove(&id);
                }
            }
        }
    }

    /// Ids still in flight.
    #[must_use]
    pub fn unsettled(&self) -> Vec<ObligationId> {
        self.pending
            .lock()
            .map(|pending| pending.keys().copied().collect())
            .unwrap_or_default()
    }
}

/// Executes payments for due obligations.
#[derive(Clone)]
pub struct Dispatcher {
    gateway: Arc<dyn LedgerGateway>,
    contract: Felt,
    fee_margin_percent: u32,
    concurrency: usize,
    submit_lock: SubmitLock,
}

impl Dispatcher {
    #[must_use]
    pub fn new(gateway: Arc<dyn LedgerGateway>, contract: Felt) -> Self {
        Self {
            gateway,
            contract,
            fee_margin_percent: DEFAULT_FEE_MARGIN_PERCENT,
            concurrency: 1,
            submit_lock: SubmitLock::default(),
        }
    }

    /// Shares `lock` with other submitters of the same account.
    #[must_use]
    pub fn with_submit_lock(mut self, lock: SubmitLock) -> Self {
        self.submit_lock = lock;
        self
    }

    #[must_use]
    pub fn with_fee_margin_percent(mut self, percent: u32) -> Self {
        self.fee_margin_percent = percent;
        self
    }

    /// Maximum attempts in flight at once. Values below 1 are treated as 1.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Runs one attempt to a terminal state and logs it.
    #[tracing::instrument(skip_all, fields(obligation_id = %id))]
    pub async fn dispatch(&self, id: ObligationId) -> PaymentAttempt {
        let attempt = self.run(id).await;
        log_attempt(&attempt);
        attempt
    }

    async fn run(&self, id: ObligationId) -> PaymentAttempt {
        let calldata = id.to_calldata();

        let estimate = match self
            .gateway
            .estimate_fee(self.contract, PAY_ENTRYPOINT, &calldata)
            .await
        {
            Ok(fee) => fee,
            Err(e) => return PaymentAttempt::failed(id, DispatchStage::Estimate, e.to_string()),
        };
        let ceiling = fee_ceiling(estimate, self.fee_margin_percent);
        tracing::debug!(estimate, ceiling, "Fee estimated");

        let submitted = {
            let _turn = self.submit_lock.lock().await;
            self.gateway
                .invoke(self.contract, PAY_ENTRYPOINT, &calldata, ceiling)
                .await
        };
        let tx = match submitted {
            Ok(tx) => tx,
            Err(e) => {
                return PaymentAttempt::failed(id, DispatchStage::Submit, e.to_string())
                    .with_fees(estimate, ceiling)
            }
        };
        tracing::debug!(tx = %format!("{tx:#x}"), "Payment submitted");

        let outcome = match self.gateway.wait_for_confirmation(tx).await {
            Ok(TerminalStatus::Succeeded) => AttemptOutcome::Confirmed { tx },
            Ok(TerminalStatus::Reverted { reason }) => AttemptOutcome::Rejected { tx, reason },
            Ok(TerminalStatus::Rejected) => AttemptOutcome::Rejected {
                tx,
                reason: "rejected".to_string(),
            },
            Err(e) => AttemptOutcome::Failed {
                stage: DispatchStage::Confirm,
                error: e.to_string(),
            },
        };
        PaymentAttempt {
            obligation_id: id,
            estimated_fee: Some(estimate),
            fee_ceiling: Some(ceiling),
            tx: Some(tx),
            outcome,
        }
    }

    /// Dispatches every id, returning attempts in input order.
    pub async fn dispatch_all(&self, ids: &[ObligationId]) -> Vec<PaymentAttempt> {
        self.dispatch_tracked(ids, &TickProgress::new()).await
    }

    /// Same as [`Dispatcher::dispatch_all`], recording in-flight ids in `progress`.
    pub async fn dispatch_tracked(
        &self,
        ids: &[ObligationId],
        progress: &TickProgress,
    ) -> Vec<PaymentAttempt> {
        for id in ids {
            progress.begin(*id);
        }

        let semaphore = Semaphore::new(self.concurrency);
        let attempts = ids.iter().map(|id| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await.ok();
                let attempt = self.dispatch(*id).await;
                progress.settle(*id);
                attempt
            }
        });

        join_all(attempts).await
    }
}
