//! esplogger - Entry Point
//!
//! Captures the log streams of configured ESPHome devices into rotated
//! per-device files.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use esplogger::app::options::FleetOptions;
use esplogger::app::run::run;
use esplogger::clock::Clock;
use esplogger::logs::{init_logging, LogOptions};
use esplogger::storage::settings::DEFAULT_SETTINGS_PATH;
use esplogger::utils::{load_settings, run_diagnostic, version_info};

use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let mut cli_args: HashMap<String, String> = HashMap::new();
    for arg in env::args().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            cli_args.insert(key.trim_start_matches('-').to_string(), value.to_string());
        } else if arg.starts_with("--") {
            cli_args.insert(arg.trim_start_matches('-').to_string(), "true".to_string());
        }
    }

    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{json}"),
            Err(_) => println!("{}", version.version),
        }
        return ExitCode::SUCCESS;
    }

    let config_path = cli_args
        .get("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));

    if cli_args.contains_key("diagnostic") || cli_args.contains_key("diag") {
        return match run_diagnostic(&config_path).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Diagnostic failed: {e:#}");
                ExitCode::FAILURE
            }
        };
    }

    let settings = match load_settings(&config_path).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    // Held until exit so buffered output is flushed
    let _log_guard = match init_logging(LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.json_logs,
    }) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let targets = match settings.device_targets() {
        Ok(targets) => targets,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let clock = Clock::from_env(settings.timezone.as_deref());
    let options = FleetOptions::from_settings(&settings, clock);

    info!("esplogger {} ({})", version.version, version.git_hash);
    info!("Devices: {}", targets.len());
    info!("Log directory: {}", options.layout.log_dir.display());
    info!(
        "Rotation at {} KB or {} lines, keeping {} backups",
        options.rotation.max_size_bytes / 1024,
        options.rotation.max_lines,
        options.rotation.max_backups
    );
    for target in &targets {
        info!(device = %target.name, "{}:{} ({})", target.host, target.port, target.auth.describe());
    }

    match run(targets, options, await_shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to run the logger: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                _ => {
                    warn!("Unable to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
