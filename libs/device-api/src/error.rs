//! Error types for the device API client

use thiserror::Error;

/// Failures surfaced by a [`crate::DeviceApiClient`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Transport or handshake failure: unreachable host, rejected password,
    /// session conflicts, dropped connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// The device speaks a protocol variant this client cannot handle
    #[error("Incompatible API: {0}")]
    Incompatible(String),

    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Connection(err.to_string())
    }
}

impl From<prost::DecodeError> for ApiError {
    fn from(err: prost::DecodeError) -> Self {
        ApiError::Other(format!("Malformed message: {err}"))
    }
}

impl From<snow::Error> for ApiError {
    fn from(err: snow::Error) -> Self {
        ApiError::Connection(format!("Noise error: {err}"))
    }
}
