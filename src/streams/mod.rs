//! Sources of due signals.
//!
//! Two strategies find payable obligations: scanning recent blocks for
//! `DuePayment` events, and asking the program directly for the ids it
//! considers payable. [`DueSource`] gives the scheduler one interface for both.

use crate::types::{DueSignal, PaymentAttempt};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Unified interface for due-signal sources.
///
/// A source is owned by a single scheduler task and polled once per tick.
#[async_trait]
pub trait DueSource: Send {
    /// Signals that are due as of this tick.
    ///
    /// An error abandons the tick; the next tick starts afresh.
    async fn next_batch(&mut self) -> Result<Vec<DueSignal>>;

    /// Called once per signal after its attempt reaches a terminal state.
    fn on_dispatched(&mut self, _signal: &DueSignal, _attempt: &PaymentAttempt) {}

    /// Signals the last batch withheld from dispatch, drained on each call.
    fn take_skipped(&mut self) -> Vec<PaymentAttempt> {
        Vec::new()
    }

    /// Get a human-readable name for this source (for logging)
    fn source_name(&self) -> &str;
}

pub mod due_query;
pub mod event_scan;

pub use due_query::DueQuerySource;
pub use event_scan::EventScanSource;
