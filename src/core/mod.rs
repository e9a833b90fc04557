pub mod codec;
pub mod context;
pub mod decoder;
pub mod dedup;
pub mod dispatcher;
pub mod paginator;
pub mod scheduler;
pub mod trigger;
pub mod window;

pub use context::KeeperContext;
pub use decoder::{DecodeReport, DueEventDecoder};
pub use dispatcher::{Dispatcher, TickProgress};
pub use paginator::{EventPages, ScanCursor};
pub use scheduler::{Scheduler, TickSummary};
pub use window::{BlockWindow, WindowSelector};
