//! Error types for arkvon-core
//!
//! None of these cross the agent boundary. Public entry points swallow them
//! where they originate, log a diagnostic, and hand back `None`.

use thiserror::Error;

/// Top-level error type for arkvon-core
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors resolving agent configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Public ID (data-arkvon) missing")]
    MissingPublicId,

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to parse settings: {0}")]
    Parse(String),

    #[error("Unknown payment type: {0}")]
    UnknownPaymentType(String),
}

/// Errors from a single delivery attempt to the collector
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Public ID or domain missing, delivery disabled")]
    Disabled,

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Collector returned HTTP {status}")]
    BadResponse { status: u16 },

    #[error("Failed to decode collector response: {0}")]
    Decode(String),
}

impl DeliveryError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

/// Errors mapping an external command name
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    Unknown(String),
}

/// Errors from the durable attribution store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cookie storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize stored value: {0}")]
    Serialize(#[from] serde_json::Error),
}
