//! Configuration management for the keeper.
//!
//! This module provides a builder-based configuration system plus an
//! environment loader, so the binary and embedding code share the same
//! validation rules.

use crate::utils::error::{KeeperError, Result};
use serde::{Deserialize, Serialize};
use starknet::core::types::Felt;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_SCAN_INTERVAL_SECS: u64 = 10;
const DEFAULT_PAGE_SIZE: u64 = 100;
const DEFAULT_BLOCK_MARGIN: u64 = crate::core::window::DEFAULT_BLOCK_MARGIN;
const DEFAULT_MAX_PAGES: usize = crate::core::paginator::DEFAULT_MAX_PAGES;
const DEFAULT_FEE_MARGIN_PERCENT: u32 = crate::core::dispatcher::DEFAULT_FEE_MARGIN_PERCENT;
const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

/// Backoff parameters for retried gateway reads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying).
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Growth factor applied per retry.
    pub backoff_multiplier: f64,
    /// Upper bound on a single delay, in milliseconds.
    pub max_backoff_ms: u64,
    /// Apply ±25 % jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 250,
            backoff_multiplier: 2.0,
            max_backoff_ms: 5_000,
            jitter: true,
        }
    }
}

/// Which repeating tasks the scheduler runs, and how often.
///
/// An interval of zero disables the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskIntervals {
    pub scan_secs: u64,
    pub due_query_secs: u64,
    pub trigger_secs: u64,
}

impl Default for TaskIntervals {
    fn default() -> Self {
        Self {
            scan_secs: DEFAULT_SCAN_INTERVAL_SECS,
            due_query_secs: 0,
            trigger_secs: 0,
        }
    }
}

fn enabled(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl TaskIntervals {
    #[must_use]
    pub fn scan(&self) -> Option<Duration> {
        enabled(self.scan_secs)
    }

    #[must_use]
    pub fn due_query(&self) -> Option<Duration> {
        enabled(self.due_query_secs)
    }

    #[must_use]
    pub fn trigger(&self) -> Option<Duration> {
        enabled(self.trigger_secs)
    }
}

/// Complete keeper configuration.
///
/// Use [`KeeperConfigBuilder`] or [`KeeperConfig::from_env`] to construct it.
#[derive(Clone)]
pub struct KeeperConfig {
    /// Ledger JSON-RPC endpoint.
    pub rpc_url: String,
    /// Address of the signing account.
    pub account_address: Felt,
    /// Signing key. Never printed.
    pub private_key: Felt,
    /// The payment program's contract address.
    pub contract_address: Felt,
    pub intervals: TaskIntervals,
    /// Events requested per page (default: 100)
    pub page_size: u64,
    /// Scan window overlap in blocks (default: 2)
    pub block_margin: u64,
    /// Pages fetched per tick before giving up (default: 64)
    pub max_pages: usize,
    /// Obligations dispatched concurrently within a tick (default: 1)
    pub dispatch_concurrency: usize,
    /// Added to the fee estimate to form the fee ceiling (default: 20)
    pub fee_margin_percent: u32,
    pub confirmation_timeout: Duration,
    pub shutdown_grace: Duration,
    /// Drop signals already dispatched in a previous overlapping window.
    pub suppress_replays: bool,
    /// Overrides the bundled contract ABI.
    pub abi_path: Option<PathBuf>,
    pub retry: RetryConfig,
}

impl fmt::Debug for KeeperConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeeperConfig")
            .field("rpc_url", &crate::utils::logging::sanitize_url(&self.rpc_url))
            .field("account_address", &format_args!("{:#x}", self.account_address))
            .field("private_key", &"<redacted>")
            .field("contract_address", &format_args!("{:#x}", self.contract_address))
            .field("intervals", &self.intervals)
            .field("page_size", &self.page_size)
            .field("block_margin", &self.block_margin)
            .field("max_pages", &self.max_pages)
            .field("dispatch_concurrency", &self.dispatch_concurrency)
            .field("fee_margin_percent", &self.fee_margin_percent)
            .field("confirmation_timeout", &self.confirmation_timeout)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("suppress_replays", &self.suppress_replays)
            .field("abi_path", &self.abi_path)
            .field("retry", &self.retry)
            .finish()
    }
}

impl KeeperConfig {
    /// Loads the configuration from process environment variables.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns `KeeperError::ConfigError` if a required variable is missing or
    /// any value fails to parse or validate.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`KeeperConfig::from_env`] but reads variables through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`KeeperConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut builder = KeeperConfigBuilder::new();
        if let Some(url) = get("RPC_PROVIDER_URL") {
            builder = builder.with_rpc(url);
        }
        if let Some(address) = get("ACCOUNT_ADDRESS") {
            builder = builder.account_address(address);
        }
        if let Some(key) = get("PRIVATE_KEY") {
            builder = builder.private_key(key);
        }
        if let Some(address) = get("CONTRACT_ADDRESS") {
            builder = builder.contract_address(address);
        }

        let mut intervals = TaskIntervals::default();
        if let Some(v) = get("SCAN_INTERVAL_SECS") {
            intervals.scan_secs = parse_var("SCAN_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("DUE_QUERY_INTERVAL_SECS") {
            intervals.due_query_secs = parse_var("DUE_QUERY_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("TRIGGER_INTERVAL_SECS") {
            intervals.trigger_secs = parse_var("TRIGGER_INTERVAL_SECS", &v)?;
        }
        builder = builder.with_intervals(intervals);

        if let Some(v) = get("PAGE_SIZE") {
            builder = builder.with_page_size(parse_var("PAGE_SIZE", &v)?);
        }
        if let Some(v) = get("BLOCK_MARGIN") {
            builder = builder.with_block_margin(parse_var("BLOCK_MARGIN", &v)?);
        }
        if let Some(v) = get("MAX_PAGES") {
            builder = builder.with_max_pages(parse_var("MAX_PAGES", &v)?);
        }
        if let Some(v) = get("DISPATCH_CONCURRENCY") {
            builder = builder.with_dispatch_concurrency(parse_var("DISPATCH_CONCURRENCY", &v)?);
        }
        if let Some(v) = get("FEE_MARGIN_PERCENT") {
            builder = builder.with_fee_margin_percent(parse_var("FEE_MARGIN_PERCENT", &v)?);
        }
        if let Some(v) = get("CONFIRMATION_TIMEOUT_SECS") {
            builder = builder.with_confirmation_timeout(Duration::from_secs(parse_var(
                "CONFIRMATION_TIMEOUT_SECS",
                &v,
            )?));
        }
        if let Some(v) = get("SHUTDOWN_GRACE_SECS") {
            builder = builder
                .with_shutdown_grace(Duration::from_secs(parse_var("SHUTDOWN_GRACE_SECS", &v)?));
        }
        if let Some(v) = get("SUPPRESS_REPLAYS") {
            builder = builder.suppress_replays(parse_flag("SUPPRESS_REPLAYS", &v)?);
        }
        if let Some(v) = get("ABI_PATH") {
            builder = builder.with_abi_path(v);
        }
        if let Some(v) = get("RETRY_MAX_RETRIES") {
            builder = builder.with_retry(RetryConfig {
                max_retries: parse_var("RETRY_MAX_RETRIES", &v)?,
                ..RetryConfig::default()
            });
        }

        builder.build()
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| KeeperError::ConfigError(format!("Invalid {name} '{value}': {e}")))
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(KeeperError::ConfigError(format!(
            "Invalid {name} '{value}': expected true or false"
        ))),
    }
}

fn parse_felt(name: &str, value: &str) -> Result<Felt> {
    let trimmed = value.trim();
    let parsed = if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        Felt::from_hex(trimmed).map_err(|e| e.to_string())
    } else {
        Felt::from_dec_str(trimmed).map_err(|e| e.to_string())
    };
    // The raw value may be a secret; keep it out of the message.
    parsed.map_err(|e| KeeperError::ConfigError(format!("Invalid {name}: {e}")))
}

/// Builder for [`KeeperConfig`].
///
/// # Example
///
/// ```no_run
/// use starkloop_keeper::KeeperConfigBuilder;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = KeeperConfigBuilder::new()
///     .with_rpc("http://127.0.0.1:5050/rpc")
///     .account_address("0x1234")
///     .private_key("0x5678")
///     .contract_address("0x9abc")
///     .with_page_size(50)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct KeeperConfigBuilder {
    rpc_url: Option<String>,
    account_address: Option<String>,
    private_key: Option<Redacted>,
    contract_address: Option<String>,
    intervals: Option<TaskIntervals>,
    page_size: Option<u64>,
    block_margin: Option<u64>,
    max_pages: Option<usize>,
    dispatch_concurrency: Option<usize>,
    fee_margin_percent: Option<u32>,
    confirmation_timeout: Option<Duration>,
    shutdown_grace: Option<Duration>,
    suppress_replays: Option<bool>,
    abi_path: Option<PathBuf>,
    retry: Option<RetryConfig>,
}

struct Redacted(String);

impl fmt::Debug for Redacted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl KeeperConfigBuilder {
    /// Creates a new configuration builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ledger JSON-RPC endpoint URL.
    #[must_use]
    pub fn with_rpc(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    /// Sets the signing account address (hex or decimal).
    #[must_use]
    pub fn account_address(mut self, address: impl Into<String>) -> Self {
        self.account_address = Some(address.into());
        self
    }

    /// Sets the signing key (hex or decimal).
    #[must_use]
    pub fn private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = Some(Redacted(key.into()));
        self
    }

    /// Sets the payment program's contract address (hex or decimal).
    #[must_use]
    pub fn contract_address(mut self, address: impl Into<String>) -> Self {
        self.contract_address = Some(address.into());
        self
    }

    /// Sets the task intervals. A zero interval disables that task.
    #[must_use]
    pub fn with_intervals(mut self, intervals: TaskIntervals) -> Self {
        self.intervals = Some(intervals);
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, size: u64) -> Self {
        self.page_size = Some(size);
        self
    }

    #[must_use]
    pub fn with_block_margin(mut self, margin: u64) -> Self {
        self.block_margin = Some(margin);
        self
    }

    #[must_use]
    pub fn with_max_pages(mut self, pages: usize) -> Self {
        self.max_pages = Some(pages);
        self
    }

    #[must_use]
    pub fn with_dispatch_concurrency(mut self, n: usize) -> Self {
        self.dispatch_concurrency = Some(n);
        self
    }

    #[must_use]
    pub fn with_fee_margin_percent(mut self, percent: u32) -> Self {
        self.fee_margin_percent = Some(percent);
        self
    }

    #[must_use]
    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = Some(grace);
        self
    }

    #[must_use]
    pub fn suppress_replays(mut self, enabled: bool) -> Self {
        self.suppress_replays = Some(enabled);
        self
    }

    #[must_use]
    pub fn with_abi_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.abi_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `KeeperError::ConfigError` if:
    /// - Any required field (RPC URL, account address, private key, contract address) is missing
    /// - An address or key is not a valid field element
    /// - A numeric bound is zero where at least one is needed
    /// - Every task is disabled
    pub fn build(self) -> Result<KeeperConfig> {
        let rpc_url = self
            .rpc_url
            .ok_or_else(|| KeeperError::ConfigError("RPC_PROVIDER_URL is required".to_string()))?;

        let account_address = self
            .account_address
            .ok_or_else(|| KeeperError::ConfigError("ACCOUNT_ADDRESS is required".to_string()))
            .and_then(|v| parse_felt("ACCOUNT_ADDRESS", &v))?;

        let private_key = self
            .private_key
            .ok_or_else(|| KeeperError::ConfigError("PRIVATE_KEY is required".to_string()))
            .and_then(|v| parse_felt("PRIVATE_KEY", &v.0))?;

        let contract_address = self
            .contract_address
            .ok_or_else(|| KeeperError::ConfigError("CONTRACT_ADDRESS is required".to_string()))
            .and_then(|v| parse_felt("CONTRACT_ADDRESS", &v))?;

        let intervals = self.intervals.unwrap_or_default();
        if intervals.scan().is_none()
            && intervals.due_query().is_none()
            && intervals.trigger().is_none()
        {
            return Err(KeeperError::ConfigError(
                "At least one task interval must be non-zero".to_string(),
            ));
        }

        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            return Err(KeeperError::ConfigError("PAGE_SIZE must be > 0".to_string()));
        }

        let max_pages = self.max_pages.unwrap_or(DEFAULT_MAX_PAGES);
        if max_pages == 0 {
            return Err(KeeperError::ConfigError("MAX_PAGES must be > 0".to_string()));
        }

        let dispatch_concurrency = self.dispatch_concurrency.unwrap_or(1);
        if dispatch_concurrency == 0 {
            return Err(KeeperError::ConfigError(
                "DISPATCH_CONCURRENCY must be > 0".to_string(),
            ));
        }

        Ok(KeeperConfig {
            rpc_url,
            account_address,
            private_key,
            contract_address,
            intervals,
            page_size,
            block_margin: self.block_margin.unwrap_or(DEFAULT_BLOCK_MARGIN),
            max_pages,
            dispatch_concurrency,
            fee_margin_percent: self
                .fee_margin_percent
                .unwrap_or(DEFAULT_FEE_MARGIN_PERCENT),
            confirmation_timeout: self
                .confirmation_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS)),
            shutdown_grace: self
                .shutdown_grace
                .unwrap_or(Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS)),
            suppress_replays: self.suppress_replays.unwrap_or(false),
            abi_path: self.abi_path,
            retry: self.retry.unwrap_or_default(),
        })
    }
}
