//! Error types for Floodgate.

use thiserror::Error;

/// Main error type for Floodgate operations.
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// A limiter was given parameters it cannot enforce
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Service configuration or rules file errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Admission was requested for a resource with no rule
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    /// gRPC server errors
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::transport::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for FloodgateError {
    fn from(err: config::ConfigError) -> Self {
        FloodgateError::Config(err.to_string())
    }
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;
