//! Starkloop keeper binary.
//!
//! Reads configuration from the environment (and `.env`), connects to the
//! ledger and runs the scheduler until Ctrl+C.

use starkloop_keeper::telemetry::{init_telemetry, TelemetryConfig};
use starkloop_keeper::{KeeperConfig, KeeperContext, Result, Scheduler};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let _telemetry = init_telemetry(TelemetryConfig::from_env());

    let config = KeeperConfig::from_env().inspect_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
    })?;
    tracing::debug!(?config, "Configuration loaded");

    let ctx = KeeperContext::connect(config).await.inspect_err(|e| {
        tracing::error!(error = %e, "Failed to connect to ledger");
    })?;

    Scheduler::new(ctx).run().await
}
