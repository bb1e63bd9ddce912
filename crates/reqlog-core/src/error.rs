//! Error types for reqlog
//!
//! Logging calls never fail. Errors only surface while building a logger
//! (configuration) and inside sinks, where they are logged and absorbed.

use thiserror::Error;

/// Result type alias for reqlog operations
pub type Result<T, E = ReqlogError> = std::result::Result<T, E>;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `batch_size` must be at least one entry.
    #[error("batch size must be greater than zero")]
    InvalidBatchSize,

    /// The service name feeds the producer id, log names and labels.
    #[error("service name must not be empty")]
    EmptyServiceName,

    /// Environment variable deserialization failed.
    #[cfg(feature = "config")]
    #[error("configuration error: {0}")]
    Env(#[from] envy::Error),
}

/// Errors raised while delivering a batch.
#[derive(Debug, Error)]
pub enum SinkError {
    /// IO error while writing.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The sink has been shut down or its writer is unavailable.
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Top-level error type.
#[derive(Debug, Error)]
pub enum ReqlogError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Sink construction or delivery failure.
    #[error(transparent)]
    Sink(#[from] SinkError),
}
