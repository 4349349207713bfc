//! Log records written to the device files

use std::fmt;

use chrono::NaiveDateTime;

/// Timestamp format of a log line
pub const RECORD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Timestamp format of the startup marker
pub const MARKER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Width the level column is padded to
const LEVEL_WIDTH: usize = 13;

/// Level of a captured log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
    Verbose,
    VeryVerbose,
    Unknown,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Verbose => "VERBOSE",
            Level::VeryVerbose => "VERY_VERBOSE",
            Level::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One captured log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Local wall-clock time the line was received
    pub timestamp: NaiveDateTime,

    pub level: Level,

    /// Message text, ANSI colour sequences already removed
    pub message: String,
}

impl LogRecord {
    /// Render as `[<timestamp>] [<LEVEL padded>] <message>\n`
    pub fn to_line(&self) -> String {
        format!(
            "[{}] [{:<width$}] {}\n",
            self.timestamp.format(RECORD_TIME_FORMAT),
            self.level,
            self.message,
            width = LEVEL_WIDTH
        )
    }
}

/// Line written once per successful subscription
pub fn marker_line(timestamp: NaiveDateTime) -> String {
    format!("# Logger gestartet um {}\n", timestamp.format(MARKER_TIME_FORMAT))
}
