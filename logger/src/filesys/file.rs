//! File operations

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use crate::errors::LoggerError;

/// A file wrapper with path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    path: PathBuf,
}

impl File {
    /// Create a new file reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name for display
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Check if the file exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Size in bytes
    pub async fn size(&self) -> Result<u64, LoggerError> {
        Ok(fs::metadata(&self.path).await?.len())
    }

    /// Number of lines; a trailing line without newline counts as a line
    pub async fn count_lines(&self) -> Result<u64, LoggerError> {
        let file = fs::File::open(&self.path).await?;
        let mut reader = BufReader::new(file);
        let mut count = 0;
        loop {
            let buf = reader.fill_buf().await?;
            if buf.is_empty() {
                break;
            }
            let len = buf.len();
            count += buf.iter().filter(|&&b| b == b'\n').count() as u64;
            let ends_partial = buf[len - 1] != b'\n';
            reader.consume(len);
            if ends_partial && reader.fill_buf().await?.is_empty() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Read file contents as string
    pub async fn read_string(&self) -> Result<String, LoggerError> {
        let mut file = fs::File::open(&self.path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;
        Ok(contents)
    }

    /// Read file as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, LoggerError> {
        let contents = self.read_string().await?;
        let value = serde_json::from_str(&contents)?;
        Ok(value)
    }

    /// Append to the file, creating it (and its parent directory) if absent
    pub async fn append_str(&self, contents: &str) -> Result<(), LoggerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(contents.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Rename the file to `target`
    pub async fn rename_to(&self, target: &File) -> Result<(), LoggerError> {
        fs::rename(&self.path, &target.path).await?;
        Ok(())
    }

    /// Delete the file
    pub async fn delete(&self) -> Result<(), LoggerError> {
        if self.exists().await {
            fs::remove_file(&self.path).await?;
        }
        Ok(())
    }
}
