//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::LoggerError;
use crate::filesys::file::File;

/// A directory wrapper with path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), LoggerError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Check that files can be created in the directory
    pub async fn assert_writable(&self) -> Result<(), LoggerError> {
        let marker = self.file(".write-check");
        marker.append_str("").await?;
        marker.delete().await
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }
}
