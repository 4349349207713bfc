//! Error types for the logger

use thiserror::Error;

/// Main error type for the logger
#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No devices configured")]
    NoDevices,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for LoggerError {
    fn from(err: anyhow::Error) -> Self {
        LoggerError::Internal(err.to_string())
    }
}
