//! Domain types shared across the keeper pipeline.

pub mod attempt;
pub mod events;
pub mod obligation;

pub use attempt::{AttemptOutcome, DispatchStage, PaymentAttempt};
pub use events::{DueSignal, EventsPage, RawEvent, SignalOrigin};
pub use obligation::{Obligation, ObligationId};
