//! Tracing subscriber setup for the keeper binary.

/// Telemetry configuration.
#[cfg(feature = "telemetry")]
pub mod config;

/// Global subscriber initialisation.
#[cfg(feature = "telemetry")]
pub mod subscriber;

#[cfg(feature = "telemetry")]
pub use config::TelemetryConfig;

#[cfg(feature = "telemetry")]
pub use subscriber::{init_telemetry, TelemetryGuard};
