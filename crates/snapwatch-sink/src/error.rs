//! Error types for sinks.

use thiserror::Error;

/// Errors from forwarding a status document.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The webhook URL failed the well-formedness precondition.
    #[error("invalid webhook URL: {0}")]
    InvalidUrl(String),

    /// Webhook delivery failed.
    #[error("webhook error: {0}")]
    Webhook(String),

    /// MQTT connect, publish, or disconnect failed.
    #[error("MQTT error: {0}")]
    Mqtt(String),

    /// The document could not be serialized.
    #[error("serialization error: {0}")]
    Serialize(String),

    /// Timed out waiting for the broker.
    #[error("timeout: {0}")]
    Timeout(String),
}

/// Result type for sink operations.
pub type Result<T> = std::result::Result<T, SinkError>;
