//! Utility functions

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::filesys::file::File;
use crate::storage::layout::LogLayout;
use crate::storage::settings::Settings;

/// Version information for the logger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Read and parse the settings file
pub async fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    File::new(path)
        .read_json::<Settings>()
        .await
        .with_context(|| format!("reading settings from {}", path.display()))
}

/// Print what the logger would do with the given settings file, without
/// connecting to any device
pub async fn run_diagnostic(config_path: &Path) -> anyhow::Result<()> {
    let version = version_info();
    println!(
        "esplogger {} ({}, built {})",
        version.version, version.git_hash, version.build_time
    );

    let settings = load_settings(config_path).await?;
    let targets = settings
        .device_targets()
        .context("resolving configured devices")?;

    println!("Settings: {}", config_path.display());
    println!("Devices: {}", targets.len());
    for target in &targets {
        println!(
            "  {} -> {}:{} ({})",
            target.name,
            target.host,
            target.port,
            target.auth.describe()
        );
    }

    let layout = LogLayout::new(settings.log_dir.clone());
    let logs_dir = layout.logs_dir();
    if let Some(parent) = layout.log_dir.parent() {
        if !tokio::fs::try_exists(parent).await.unwrap_or(false) {
            println!("Warning: {} does not exist", parent.display());
        }
    }
    match logs_dir.assert_writable().await {
        Ok(()) => println!("Log directory: {} (writable)", logs_dir.path().display()),
        Err(e) => println!("Log directory: {} (NOT writable: {})", logs_dir.path().display(), e),
    }

    let tz_env = std::env::var("TZ").ok();
    let clock = Clock::resolve(settings.timezone.as_deref(), tz_env.as_deref());
    println!("Time zone: {}", clock.describe());
    println!(
        "Rotation: {} bytes / {} lines, {} backups",
        settings.rotation.max_size_bytes, settings.rotation.max_lines, settings.rotation.max_backups
    );

    Ok(())
}
