//! Configurable retry logic for transient gateway failures.
//!
//! This module provides:
//! - [`compute_backoff`] - exponential-backoff delay calculator with optional jitter.
//! - [`is_transient`] - classifies a [`KeeperError`] as retryable or not.
//! - [`RetryingGateway`] - decorator that wraps any [`LedgerGateway`] with bounded retries
//!   on its read-only operations.

use crate::config::RetryConfig;
use crate::utils::error::{KeeperError, Result};
use crate::utils::rpc::{EventQuery, LedgerGateway, TerminalStatus};
use crate::types::EventsPage;
use async_trait::async_trait;
use starknet::core::types::Felt;
use std::time::Duration;
use tokio::time::sleep;

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Computes the delay before the next retry.
///
/// `attempt` is 1-indexed: `attempt = 1` is the delay before the first retry.
///
/// Formula: `delay = initial_backoff_ms * backoff_multiplier^(attempt - 1)`,
/// capped at `max_backoff_ms`, then ±25 % jitter if enabled.
#[must_use]
pub fn compute_backoff(cfg: &RetryConfig, attempt: u32) -> Duration {
    let base = cfg.initial_backoff_ms as f64
        * cfg
            .backoff_multiplier
            .powi(attempt.saturating_sub(1) as i32);
    let capped = base.min(cfg.max_backoff_ms as f64);

    let ms = if cfg.jitter {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos();
        // jitter factor in [0.75, 1.25]
        let factor = 0.75 + f64::from(nanos % 1_000_000) / 1_000_000.0 * 0.5;
        capped * factor
    } else {
        capped
    };

    Duration::from_millis(ms as u64)
}

// ─────────────────────────────────────────────────────────────────────────────
// Error classification
// ─────────────────────────────────────────────────────────────────────────────

/// Returns `true` if `err` represents a transient transport failure.
///
/// | Error variant            | Retried | Reason                                    |
/// |--------------------------|---------|-------------------------------------------|
/// | `RpcError`               | ✅      | Node hiccup, HTTP 429 / 503               |
/// | `ConnectionError`        | ✅      | Endpoint unreachable, reset               |
/// | `DecodingError`          | ❌      | Bad data will not self-heal               |
/// | `EstimationFailed` etc.  | ❌      | Per-obligation; re-offered next tick      |
/// | `PaginationOverflow`     | ❌      | Protocol violation                        |
/// | `ConfigError`            | ❌      | Programmer error                          |
/// | `RetryExhausted`         | ❌      | Already exhausted                         |
#[must_use]
pub fn is_transient(err: &KeeperError) -> bool {
    matches!(
        err,
        KeeperError::RpcError(_) | KeeperError::ConnectionError(_)
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// RetryingGateway
// ─────────────────────────────────────────────────────────────────────────────

/// A decorator that wraps any [`LedgerGateway`] with bounded retry logic.
///
/// Only the idempotent reads (`get_chain_head`, `get_events`, `call`) are
/// retried. Fee estimation, submission and confirmation pass straight through:
/// a failure there ends that obligation's attempt for the current tick.
///
/// # Example
///
/// ```no_run
/// use starkloop_keeper::config::RetryConfig;
/// use starkloop_keeper::utils::retry::RetryingGateway;
/// use starkloop_keeper::utils::rpc::{LedgerGateway, StarknetGateway, StarknetGatewayOptions};
/// use starknet::core::types::Felt;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let raw = StarknetGateway::connect(
///     "http://127.0.0.1:5050/rpc",
///     Felt::from_hex("0x1")?,
///     Felt::from_hex("0x2")?,
///     StarknetGatewayOptions::default(),
/// )
/// .await?;
/// let gateway: Arc<dyn LedgerGateway> = Arc::new(RetryingGateway::new(raw, RetryConfig::default()));
/// # Ok(())
/// # }
/// ```
pub struct RetryingGateway<G> {
    inner: G,
    config: RetryConfig,
}

impl<G: LedgerGateway> RetryingGateway<G> {
    /// Wraps `inner` with the given retry `config`.
    pub fn new(inner: G, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Central retry loop: calls `op()` repeatedly until it succeeds, the
    /// error is non-transient, or `max_retries` is reached.
    async fn with_retry<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;

        loop {
            let err = match op().await {
                Ok(val) => return Ok(val),
                Err(err) if !is_transient(&err) => return Err(err),
                Err(err) => err,
            };

            attempt += 1;
            if attempt > self.config.max_retries {
                return Err(KeeperError::RetryExhausted {
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            }

            let delay = compute_backoff(&self.config, attempt);
            tracing::warn!(
                attempt,
                max = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient gateway error, retrying"
            );
            sleep(delay).await;
        }
    }
}

#[async_trait]
impl<G: LedgerGateway> LedgerGateway for RetryingGateway<G> {
    async fn get_chain_head(&self) -> Result<u64> {
        self.with_retry(|| self.inner.get_chain_head()).await
    }

    async fn get_events(
        &self,
        query: &EventQuery,
        continuation_token: Option<String>,
    ) -> Result<EventsPage> {
        self.with_retry(|| self.inner.get_events(query, continuation_token.clone()))
            .await
    }

    async fn call(&self, contract: Felt, entrypoint: &str, calldata: &[Felt]) -> Result<Vec<Felt>> {
        self.with_retry(|| self.inner.call(contract, entrypoint, calldata))
            .await
    }

    async fn estimate_fee(
        &self,
        contract: Felt,
        entrypoint: &str,
        calldata: &[Felt],
    ) -> Result<u128> {
        self.inner.estimate_fee(contract, entrypoint, calldata).await
    }

    async fn invoke(
        &self,
        contract: Felt,
        entrypoint: &str,
        calldata: &[Felt],
        fee_ceiling: u128,
    ) -> Result<Felt> {
        self.inner
            .invoke(contract, entrypoint, calldata, fee_ceiling)
            .await
    }

    async fn wait_for_confirmation(&self, tx: Felt) -> Result<TerminalStatus> {
        self.inner.wait_for_confirmation(tx).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
