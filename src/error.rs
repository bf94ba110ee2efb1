//! # Error Types
//!
//! Custom error types for Meter Relay using `thiserror`.
//!
//! Each layer of the pipeline has its own error type:
//! - [`SensorError`] for acquisition (recovered locally, the poll is skipped)
//! - [`DeliveryError`] for upload (transient kinds fall back to the ledger)
//! - [`LedgerError`] for durability (fatal, the agent stops)

use thiserror::Error;

/// Failure to acquire a reading from the meter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    /// No complete response within the read timeout
    #[error("meter did not respond within {0} ms")]
    Timeout(u64),

    /// Response arrived but could not be decoded into measurements
    #[error("malformed register data: {0}")]
    Malformed(String),

    /// Meter answered with the "slave device busy" exception
    #[error("meter is busy")]
    DeviceBusy,

    /// Serial port could not be opened or the link failed mid-exchange
    #[error("serial transport error: {0}")]
    Transport(String),
}

/// Failure to deliver one or more readings to the remote endpoint
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Connection failed or the server could not take the request right now
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    /// Request did not complete within the upload timeout
    #[error("request to endpoint timed out")]
    Timeout,

    /// Endpoint understood the request and refused it
    #[error("endpoint rejected payload with status {0}")]
    Rejected(u16),
}

impl DeliveryError {
    /// Whether the same payload may succeed if retried later
    pub fn is_transient(&self) -> bool {
        !matches!(self, DeliveryError::Rejected(_))
    }
}

/// Failure of the durable ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Underlying file operation failed (disk full, permissions, ...)
    #[error("ledger I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),

    /// On-disk state is inconsistent and cannot be trusted
    #[error("ledger state is corrupt: {0}")]
    CorruptState(String),

    /// Another live agent process owns the ledger
    #[error("ledger lock {path} is held by running process {pid}")]
    Locked { path: String, pid: u32 },
}

/// Main error type for Meter Relay
#[derive(Debug, Error)]
pub enum AgentError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Ledger errors (fatal)
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// Log subscriber or file appender could not be installed
    #[error("Logging error: {0}")]
    Logging(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Meter Relay
pub type Result<T> = std::result::Result<T, AgentError>;
