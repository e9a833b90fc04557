//! `starkloop-keeper` - unattended executor for recurring on-chain payments.
//!
//! Users commit to a recurring payment in the Starkloop program; the program
//! decides when each commitment is due. This crate is the background process
//! that discovers due commitments and executes exactly one payment call for
//! each, tolerating a paginated, overlapping event feed and network calls that
//! fail independently at every stage.
//!
//! # Quick Start
//!
//! ```no_run
//! use starkloop_keeper::{KeeperConfig, KeeperContext, Scheduler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     dotenvy::dotenv().ok();
//!
//!     let config = KeeperConfig::from_env()?;
//!     let ctx = KeeperContext::connect(config).await?;
//!
//!     // Runs until Ctrl+C, then drains in-flight ticks.
//!     Scheduler::new(ctx).run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! Each scheduler tick flows through:
//!
//! 1. **`WindowSelector`** - picks `[head - margin, head]`
//! 2. **`EventPages`** - follows continuation tokens into a finite page sequence
//! 3. **`DueEventDecoder`** - filters by selector and decodes `DuePayment` records via the ABI
//! 4. **`Dispatcher`** - estimate, submit and confirm `make_schedule_payment` per obligation
//! 5. **`LedgerGateway`** - the only component that talks to the network
//!
//! A second task can skip steps 1-3 by asking the program for its payable ids
//! directly, and a third can periodically call `check_due_payments()`.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Public API exports
pub use config::{KeeperConfig, KeeperConfigBuilder, RetryConfig, TaskIntervals};
pub use crate::core::context::KeeperContext;
pub use crate::core::decoder::{DecodeReport, DueEventDecoder};
pub use crate::core::dispatcher::Dispatcher;
pub use crate::core::paginator::EventPages;
pub use crate::core::scheduler::Scheduler;
pub use crate::core::window::{BlockWindow, WindowSelector};
pub use streams::{DueQuerySource, DueSource, EventScanSource};
pub use types::{
    AttemptOutcome, DispatchStage, DueSignal, Obligation, ObligationId, PaymentAttempt,
};
pub use utils::error::{KeeperError, Result};
pub use utils::retry::RetryingGateway;
pub use utils::rpc::{LedgerGateway, StarknetGateway, StarknetGatewayOptions, TerminalStatus};

// Module declarations
pub mod abi;
pub mod config;
pub mod core;
pub mod streams;
pub mod telemetry;
pub mod types;
pub mod utils;
