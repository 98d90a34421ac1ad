//! Error types for Tollgate.

use crate::audience::OperationType;
use thiserror::Error;

/// Startup configuration error.
///
/// Each required setting has its own variant so operators can tell which
/// one is absent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Engine address is not set
    #[error("{var} env var is not set", var = crate::config::ENV_ADDRESS)]
    MissingAddress,

    /// Engine auth token is not set
    #[error("{var} env var is not set", var = crate::config::ENV_AUTH_TOKEN)]
    MissingAuthToken,

    /// Engine service name is not set
    #[error("{var} env var is not set", var = crate::config::ENV_SERVICE_NAME)]
    MissingServiceName,

    /// Engine address could not be parsed
    #[error("Invalid engine address: {0}")]
    InvalidAddress(String),

    /// Per-call timeout is not a positive number of milliseconds
    #[error("Invalid {var} value: {0}", var = crate::config::ENV_TIMEOUT_MS)]
    InvalidTimeout(String),
}

/// Tollgate error type.
#[derive(Error, Debug)]
pub enum ShimError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO error (socket operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error (invalid frames, unexpected data)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Engine connection error
    #[error("Engine connection error: {0}")]
    EngineConnection(String),

    /// Engine refused the session handshake
    #[error("Engine rejected session: {0}")]
    SessionRejected(String),

    /// Timeout waiting for the engine response
    #[error("Timeout waiting for engine response after {0}ms")]
    Timeout(u64),

    /// Message could not be encoded before processing
    #[error("Unable to encode {field} for topic '{topic}': {message}")]
    Encode {
        topic: String,
        field: &'static str,
        message: String,
    },

    /// Engine failed to process a payload and strict errors were requested
    #[error("Engine processing failed ({operation_type}) for topic '{topic}': {message}")]
    Process {
        operation_type: OperationType,
        topic: String,
        message: String,
    },

    /// Underlying send or fetch failed
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type for Tollgate operations.
pub type ShimResult<T> = Result<T, ShimError>;
