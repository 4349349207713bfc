//! Rotation policy
//!
//! Pure decision logic: whether a file is due for rotation, and which
//! renames move the backup chain `<log>.1 .. <log>.N` one generation back.

use std::path::{Path, PathBuf};

/// Thresholds and chain length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Rotate once the file reaches this many bytes
    pub max_size_bytes: u64,

    /// Rotate once the file reaches this many lines
    pub max_lines: u64,

    /// Number of backups kept
    pub max_backups: u32,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_size_bytes: 500 * 1024,
            max_lines: 2000,
            max_backups: 5,
        }
    }
}

/// One filesystem step of a rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationStep {
    /// Shift `from` to `to` if `from` exists, deleting `to` first
    Shift { from: PathBuf, to: PathBuf },

    /// Delete the path if it exists
    Remove(PathBuf),

    /// Move the live log into the chain
    MoveLive { from: PathBuf, to: PathBuf },
}

impl RotationPolicy {
    /// Rotation is due when either threshold is reached
    pub fn is_due(&self, size_bytes: u64, lines: u64) -> bool {
        size_bytes >= self.max_size_bytes || lines >= self.max_lines
    }

    /// Path of backup generation `generation` (1 is the newest)
    pub fn backup_path(log_path: &Path, generation: u32) -> PathBuf {
        let mut name = log_path.as_os_str().to_owned();
        name.push(format!(".{generation}"));
        PathBuf::from(name)
    }

    /// Ordered steps for one rotation of `log_path`.
    ///
    /// The oldest backup is shifted first and the live file moved last, so no
    /// rename ever lands on a generation that has not been moved out yet.
    pub fn plan(&self, log_path: &Path) -> Vec<RotationStep> {
        let mut steps = Vec::new();
        if self.max_backups == 0 {
            steps.push(RotationStep::Remove(log_path.to_path_buf()));
            return steps;
        }

        for generation in (1..self.max_backups).rev() {
            steps.push(RotationStep::Shift {
                from: Self::backup_path(log_path, generation),
                to: Self::backup_path(log_path, generation + 1),
            });
        }

        let newest = Self::backup_path(log_path, 1);
        steps.push(RotationStep::Remove(newest.clone()));
        steps.push(RotationStep::MoveLive {
            from: log_path.to_path_buf(),
            to: newest,
        });
        steps
    }
}
