//! Error types for keeper operations.
//!
//! This module defines a single error enumeration using `thiserror` so every
//! stage of the watcher (configuration, transport, pagination, decoding and
//! dispatch) reports failures through the same type.

use thiserror::Error;

/// Custom error type for keeper operations.
#[derive(Debug, Error)]
pub enum KeeperError {
    /// Errors related to configuration.
    ///
    /// This includes missing environment variables, invalid configuration values,
    /// or failures in parsing configuration data. Always fatal at startup.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Errors interacting with the ledger RPC endpoint.
    ///
    /// This covers network failures, timeouts, HTTP errors and unexpected
    /// responses from the JSON-RPC node.
    #[error("RPC error: {0}")]
    RpcError(String),

    /// Connection error (endpoint unreachable, transport closed).
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The continuation token never ran out within the page budget.
    #[error("Pagination did not terminate after {pages} pages")]
    PaginationOverflow {
        /// Number of pages fetched before giving up.
        pages: usize,
    },

    /// Errors while decoding an event payload or a call result.
    #[error("Decoding error: {0}")]
    DecodingError(String),

    /// A value could not be represented in the ledger's wire format.
    #[error("Encoding error: {0}")]
    EncodingError(String),

    /// The program ABI is malformed or lacks a required item.
    #[error("ABI error: {0}")]
    AbiError(String),

    /// Fee estimation for an invocation failed.
    #[error("Fee estimation failed: {0}")]
    EstimationFailed(String),

    /// The ledger refused the submitted transaction.
    #[error("Submission failed: {0}")]
    SubmissionFailed(String),

    /// Confirmation polling failed or never reached a terminal state.
    #[error("Confirmation failed: {0}")]
    ConfirmationFailed(String),

    /// Errors reading the ABI document from disk.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors parsing JSON documents (ABI, RPC payloads).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// All retry attempts were exhausted on a transient error.
    #[error("Retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// Total number of attempts (initial call + retries).
        attempts: u32,
        /// String representation of the last error.
        last_error: String,
    },
}

/// Type alias for Results using `KeeperError`.
pub type Result<T> = std::result::Result<T, KeeperError>;
