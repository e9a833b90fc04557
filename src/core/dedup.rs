//! Replay suppression for overlapping scan windows.
//!
//! Consecutive windows share `margin` blocks, so the same `DuePayment` record
//! is observed up to `margin + 1` times. When suppression is enabled the scan
//! remembers records whose payment was submitted and drops them on the next
//! observation. Records are keyed by emitting transaction rather than block,
//! so a record seen first while pending and later in a block stays one key.

use starknet::core::types::Felt;
use std::collections::HashMap;

use crate::core::window::BlockWindow;
use crate::types::{DueSignal, ObligationId, SignalOrigin};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ReplayKey {
    obligation_id: ObligationId,
    transaction_hash: Felt,
    time: Option<u64>,
}

impl ReplayKey {
    fn of(signal: &DueSignal) -> Option<Self> {
        match signal.origin {
            SignalOrigin::Event {
                transaction_hash, ..
            } => Some(Self {
                obligation_id: signal.obligation_id,
                transaction_hash,
                time: signal.time,
            }),
            SignalOrigin::DueQuery => None,
        }
    }
}

/// Remembers dispatched event signals until they fall out of the scan window.
#[derive(Debug, Default)]
pub struct ReplayGuard {
    /// Value is the last block at which the record can still be re-observed.
    seen: HashMap<ReplayKey, u64>,
}

impl ReplayGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if an equivalent signal was already dispatched. Due-query
    /// signals are never replays.
    #[must_use]
    pub fn is_replay(&self, signal: &DueSignal) -> bool {
        ReplayKey::of(signal).is_some_and(|key| self.seen.contains_key(&key))
    }

    /// Records `signal` as dispatched while scanning `window`.
    pub fn remember(&mut self, signal: &DueSignal, window: BlockWindow) {
        if let Some(key) = ReplayKey::of(signal) {
            let block = signal.block_number().unwrap_or(window.to_block);
            self.seen.insert(key, block);
        }
    }

    /// Forgets records older than `window`; they can no longer be observed.
    pub fn prune(&mut self, window: BlockWindow) {
        self.seen.retain(|_, block| *block >= window.from_block);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
