//! Event-scan source: window → paginate → decode.

use async_trait::async_trait;
use starknet::core::types::Felt;
use std::sync::Arc;

use super::DueSource;
use crate::core::context::KeeperContext;
use crate::core::decoder::DueEventDecoder;
use crate::core::dedup::ReplayGuard;
use crate::core::paginator::EventPages;
use crate::core::window::{BlockWindow, WindowSelector};
use crate::types::{DueSignal, PaymentAttempt};
use crate::utils::error::Result;
use crate::utils::rpc::{EventQuery, LedgerGateway};

/// Scans `[head - margin, head]` for `DuePayment` records each tick.
///
/// The window overlaps the previous one, so a record can be returned more
/// than once unless replay suppression is enabled.
pub struct EventScanSource {
    gateway: Arc<dyn LedgerGateway>,
    contract: Felt,
    selector: WindowSelector,
    decoder: DueEventDecoder,
    page_size: u64,
    max_pages: usize,
    guard: Option<ReplayGuard>,
    window: Option<BlockWindow>,
    skipped: Vec<PaymentAttempt>,
}

impl EventScanSource {
    /// Builds the source from the shared context.
    ///
    /// # Errors
    ///
    /// Returns `KeeperError::AbiError` if the ABI lacks a usable `DuePayment` event.
    pub fn new(ctx: &KeeperContext) -> Result<Self> {
        let config = &ctx.config;
        Ok(Self {
            gateway: ctx.gateway.clone(),
            contract: ctx.contract,
            selector: WindowSelector::new(config.block_margin),
            decoder: DueEventDecoder::new(ctx.abi.clone())?,
            page_size: config.page_size,
            max_pages: config.max_pages,
            guard: config.suppress_replays.then(ReplayGuard::new),
            window: None,
            skipped: Vec::new(),
        })
    }

    /// Window scanned by the most recent tick.
    #[must_use]
    pub fn last_window(&self) -> Option<BlockWindow> {
        self.window
    }
}

#[async_trait]
impl DueSource for EventScanSource {
    async fn next_batch(&mut self) -> Result<Vec<DueSignal>> {
        self.skipped.clear();
        let head = self.gateway.get_chain_head().await?;
        let window = self.selector.select(head);
        self.window = Some(window);

        let query = EventQuery {
            address: self.contract,
            window,
            page_size: self.page_size,
            keys: self.decoder.key_filter(),
        };
        let records = EventPages::new(self.gateway.as_ref(), query, self.max_pages)
            .collect_all()
            .await?;
        let report = self.decoder.decode_all(&records);

        tracing::debug!(
            from_block = window.from_block,
            to_block = window.to_block,
            records = records.len(),
            signals = report.signals.len(),
            failures = report.failures.len(),
            "Window scanned"
        );

        let Some(guard) = self.guard.as_mut() else {
            return Ok(report.signals);
        };

        guard.prune(window);
        let (replays, fresh): (Vec<_>, Vec<_>) = report
            .signals
            .into_iter()
            .partition(|signal| guard.is_replay(signal));
        self.skipped = replays
            .iter()
            .map(|signal| {
                let block = signal
                    .block_number()
                    .map_or_else(|| "pending".to_string(), |b| b.to_string());
                PaymentAttempt::skipped(
                    signal.obligation_id,
                    format!("already submitted for the record at block {block}"),
                )
            })
            .collect();
        Ok(fresh)
    }

    fn on_dispatched(&mut self, signal: &DueSignal, attempt: &PaymentAttempt) {
        // Only submitted payments are remembered; earlier failures may be retried.
        if attempt.tx.is_none() {
            return;
        }
        if let (Some(guard), Some(window)) = (self.guard.as_mut(), self.window) {
            guard.remember(signal, window);
        }
    }

    fn take_skipped(&mut self) -> Vec<PaymentAttempt> {
        std::mem::take(&mut self.skipped)
    }

    fn source_name(&self) -> &str {
        "event-scan"
    }
}
