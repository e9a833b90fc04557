//! Raw event records from the ledger and decoded due signals.

use starknet::core::types::Felt;

use super::obligation::ObligationId;

/// An event record as returned by the ledger's event query, undecoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Contract that emitted the event.
    pub from_address: Felt,
    /// Indexed keys; `keys[0]` is the event selector.
    pub keys: Vec<Felt>,
    /// Non-indexed payload.
    pub data: Vec<Felt>,
    /// `None` while the block is still pending.
    pub block_number: Option<u64>,
    pub transaction_hash: Felt,
}

/// One page of an event query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventsPage {
    pub events: Vec<RawEvent>,
    /// Present when more results remain.
    pub continuation_token: Option<String>,
}

/// Where a due signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalOrigin {
    /// A `DuePayment` event observed in a block window.
    Event {
        block_number: Option<u64>,
        transaction_hash: Felt,
    },
    /// An id returned by the program's payable-obligations query.
    DueQuery,
}

/// Indicates that one obligation has become payable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DueSignal {
    pub obligation_id: ObligationId,
    /// Ledger timestamp carried by the event; `None` for the due-query path.
    pub time: Option<u64>,
    pub origin: SignalOrigin,
}

impl DueSignal {
    /// A signal decoded from a `DuePayment` event.
    #[must_use]
    pub fn from_event(obligation_id: ObligationId, time: u64, raw: &RawEvent) -> Self {
        Self {
            obligation_id,
            time: Some(time),
            origin: SignalOrigin::Event {
                block_number: raw.block_number,
                transaction_hash: raw.transaction_hash,
            },
        }
    }

    /// A signal produced by the direct due query.
    #[must_use]
    pub fn queried(obligation_id: ObligationId) -> Self {
        Self {
            obligation_id,
            time: None,
            origin: SignalOrigin::DueQuery,
        }
    }

    /// Block the signal was emitted in, if known.
    #[must_use]
    pub fn block_number(&self) -> Option<u64> {
        match self.origin {
            SignalOrigin::Event { block_number, .. } => block_number,
            SignalOrigin::DueQuery => None,
        }
    }
}
