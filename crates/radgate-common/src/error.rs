//! Error types for radgate

use thiserror::Error;

/// Radgate error type
#[derive(Error, Debug)]
pub enum RadError {
    /// Username has no active partition mapping
    #[error("unresolved identity: {0}")]
    UnresolvedIdentity(String),

    /// Presented secret does not match the stored check-item
    #[error("credential mismatch for {0}")]
    CredentialMismatch(String),

    /// Unique session id already has a terminal accounting record
    #[error("duplicate accounting event: {0}")]
    DuplicateAccountingEvent(String),

    /// The tenant's partition store is unreachable
    #[error("partition unavailable: {0}")]
    PartitionUnavailable(String),

    /// Disconnect/reconnect command exhausted its retries
    #[error("NAS command failed: {0}")]
    NasCommandFailure(String),

    /// Malformed or truncated wire data
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for radgate
pub type RadResult<T> = Result<T, RadError>;
