//! Log sink
//!
//! Appends formatted records to one device's log file and keeps the file
//! bounded by rotating it into the backup chain. Errors never leave the
//! sink: a failed write or rotation is reported and the next record is
//! attempted as usual.

use chrono::NaiveDateTime;
use tracing::{debug, error, info};

use crate::errors::LoggerError;
use crate::filesys::file::File;
use crate::models::record::{marker_line, LogRecord};
use crate::rotation::policy::{RotationPolicy, RotationStep};

/// Rotation is checked once per this many successful appends
pub const ROTATION_CHECK_INTERVAL: u64 = 100;

/// Log file of one device
#[derive(Debug)]
pub struct LogSink {
    device: String,
    file: File,
    policy: RotationPolicy,
    appended: u64,
}

impl LogSink {
    pub fn new(device: impl Into<String>, file: File, policy: RotationPolicy) -> Self {
        Self {
            device: device.into(),
            file,
            policy,
            appended: 0,
        }
    }

    /// The live log file
    pub fn file(&self) -> &File {
        &self.file
    }

    /// Records appended since the sink was created
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Append one record, rotating first when a check is due
    pub async fn append(&mut self, record: &LogRecord) {
        if self.appended > 0 && self.appended % ROTATION_CHECK_INTERVAL == 0 {
            if let Err(e) = self.rotate_if_due().await {
                error!(device = %self.device, "Log rotation failed: {}", e);
            }
        }

        match self.file.append_str(&record.to_line()).await {
            Ok(()) => self.appended += 1,
            Err(e) => error!(device = %self.device, "Failed to write log line: {}", e),
        }
    }

    /// Write the startup marker; does not count toward the rotation cadence
    pub async fn write_marker(&mut self, timestamp: NaiveDateTime) {
        match self.file.append_str(&marker_line(timestamp)).await {
            Ok(()) => info!(
                device = %self.device,
                "Writing to {} (local time {})",
                self.file.path().display(),
                timestamp.format("%Y-%m-%d %H:%M:%S")
            ),
            Err(e) => error!(
                device = %self.device,
                "Cannot write to {}: {}",
                self.file.path().display(),
                e
            ),
        }
    }

    /// Rotate if the live file has crossed a threshold; returns whether it did
    pub async fn rotate_if_due(&self) -> Result<bool, LoggerError> {
        if !self.file.exists().await {
            return Ok(false);
        }

        let size = self.file.size().await?;
        let lines = self.file.count_lines().await?;
        debug!(device = %self.device, size, lines, "Rotation check");

        if !self.policy.is_due(size, lines) {
            return Ok(false);
        }

        info!(
            device = %self.device,
            "Rotating {} (size: {} bytes, lines: {})",
            self.file.name(),
            size,
            lines
        );
        self.rotate().await?;
        Ok(true)
    }

    /// Move the live file into the backup chain
    pub async fn rotate(&self) -> Result<(), LoggerError> {
        for step in self.policy.plan(self.file.path()) {
            match step {
                RotationStep::Shift { from, to } => {
                    let from = File::new(from);
                    if from.exists().await {
                        let to = File::new(to);
                        to.delete().await?;
                        from.rename_to(&to).await?;
                    }
                }
                RotationStep::Remove(path) => File::new(path).delete().await?,
                RotationStep::MoveLive { from, to } => {
                    let to = File::new(to);
                    File::new(from).rename_to(&to).await?;
                    info!(device = %self.device, "Log rotated to {}", to.name());
                }
            }
        }
        Ok(())
    }
}
