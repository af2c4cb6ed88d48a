//! Error types for machine integration.

use thiserror::Error;

/// Errors from Snapmaker machine operations.
#[derive(Error, Debug)]
pub enum SnapmakerError {
    /// Transport-level failure talking to the machine.
    #[error("machine unreachable: {0}")]
    Unreachable(String),

    /// The machine explicitly refused a pairing attempt.
    #[error("pairing rejected by device: {0}")]
    RejectedByDevice(String),

    /// A response body could not be decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The token file could not be created, read, or written.
    #[error("token store error: {0}")]
    TokenStore(String),

    /// The discovery probe could not be sent or received.
    #[error("discovery error: {0}")]
    Discovery(String),

    /// No machine replied within the configured number of attempts.
    #[error("no machine found after {0} attempts")]
    DiscoveryExhausted(u32),

    /// An address was not a dotted-quad IPv4 string.
    #[error("invalid machine address: {0:?}")]
    InvalidAddress(String),
}

/// Result type for machine operations.
pub type Result<T> = std::result::Result<T, SnapmakerError>;
