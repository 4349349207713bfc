//! Device session
//!
//! Adapter over one Device API client connection. Log events arrive through
//! the client's callback on its reader task; the session turns each into a
//! [`LogRecord`] and hands it to the device's sink channel, so delivery
//! never waits on the supervisor.

use device_api::{ApiError, DeviceApiClient, LogEntry, LogLevel};
use tracing::debug;

use crate::clock::Clock;
use crate::models::record::{Level, LogRecord};
use crate::session::ansi::decode_and_strip;
use crate::sink::writer::{SinkEntry, SinkSender};

/// Minimum level requested from devices
pub const SUBSCRIBE_LEVEL: LogLevel = LogLevel::Verbose;

/// Map a raw device level; anything outside the closed map is `Unknown`
pub fn map_level(raw: i32) -> Level {
    match LogLevel::try_from(raw) {
        Ok(LogLevel::Error) => Level::Error,
        Ok(LogLevel::Warn) => Level::Warn,
        Ok(LogLevel::Info) => Level::Info,
        Ok(LogLevel::Debug) => Level::Debug,
        Ok(LogLevel::Verbose) => Level::Verbose,
        Ok(LogLevel::VeryVerbose) => Level::VeryVerbose,
        _ => Level::Unknown,
    }
}

/// Build a record from a raw event, stamped with the current time
pub fn to_record(entry: LogEntry, clock: &Clock) -> LogRecord {
    LogRecord {
        timestamp: clock.now(),
        level: map_level(entry.level),
        message: decode_and_strip(&entry.message),
    }
}

/// One connection to one device
pub struct DeviceSession {
    device: String,
    client: Box<dyn DeviceApiClient>,
    clock: Clock,
}

impl DeviceSession {
    pub fn new(device: impl Into<String>, client: Box<dyn DeviceApiClient>, clock: Clock) -> Self {
        Self {
            device: device.into(),
            client,
            clock,
        }
    }

    /// Open and authenticate the connection
    pub async fn connect(&mut self) -> Result<(), ApiError> {
        self.client.connect(true).await
    }

    /// Subscribe to the log stream, forwarding records to `sink`
    pub async fn subscribe(&mut self, sink: SinkSender) -> Result<(), ApiError> {
        let clock = self.clock;
        let device = self.device.clone();
        let on_log = Box::new(move |entry: LogEntry| {
            if sink.send(SinkEntry::Record(to_record(entry, &clock))).is_err() {
                debug!(device = %device, "Sink writer gone, dropping log record");
            }
        });
        self.client.subscribe_logs(on_log, SUBSCRIBE_LEVEL).await
    }

    /// Wait until the connection fails
    pub async fn closed(&mut self) -> ApiError {
        self.client.closed().await
    }

    pub async fn disconnect(&mut self) -> Result<(), ApiError> {
        self.client.disconnect().await
    }
}
