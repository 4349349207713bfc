//! Log directory layout

use std::path::PathBuf;

use crate::errors::LoggerError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Default directory for device logs
pub const DEFAULT_LOG_DIR: &str = "/share/esphome_logs";

/// Where device log files live
#[derive(Debug, Clone)]
pub struct LogLayout {
    /// Directory holding all device logs
    pub log_dir: PathBuf,
}

impl LogLayout {
    /// Create a new layout
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    /// Get the log directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(&self.log_dir)
    }

    /// Live log file of a device
    pub fn device_log_file(&self, device: &str) -> File {
        self.logs_dir().file(&format!("{device}.log"))
    }

    /// Setup the layout (create directories)
    pub async fn setup(&self) -> Result<(), LoggerError> {
        self.logs_dir().create().await
    }
}

impl Default for LogLayout {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_DIR)
    }
}
