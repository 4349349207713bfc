//! Device API client
//!
//! Boundary to the ESPHome native API: connecting, authenticating and
//! subscribing to a node's log stream. The [`DeviceApiClient`] trait is the
//! seam the logger depends on; [`NativeApiClient`] speaks the native
//! framing over TCP, in plaintext or noise-encrypted.

pub mod error;
pub mod native;

use async_trait::async_trait;

pub use error::ApiError;
pub use native::client::NativeApiClient;

/// Default native API port
pub const DEFAULT_PORT: u16 = 6053;

/// Log levels as numbered by the device
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum LogLevel {
    None = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Config = 4,
    Debug = 5,
    Verbose = 6,
    VeryVerbose = 7,
}

/// One raw log event as delivered by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Raw level value; may be outside [`LogLevel`]
    pub level: i32,

    /// Message bytes, possibly with ANSI colour sequences
    pub message: Vec<u8>,
}

/// Callback invoked for every log event of a subscription
pub type LogCallback = Box<dyn Fn(LogEntry) + Send + Sync + 'static>;

/// Connection to a single device
#[async_trait]
pub trait DeviceApiClient: Send {
    /// Open the connection; `login` also performs the password handshake
    async fn connect(&mut self, login: bool) -> Result<(), ApiError>;

    /// Start the log subscription; `on_log` runs on the client's reader task
    async fn subscribe_logs(&mut self, on_log: LogCallback, level: LogLevel) -> Result<(), ApiError>;

    /// Resolves once the connection has failed or been closed by the device
    async fn closed(&mut self) -> ApiError;

    /// Close the connection
    async fn disconnect(&mut self) -> Result<(), ApiError>;
}
