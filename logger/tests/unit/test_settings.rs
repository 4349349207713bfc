//! Settings loading tests

use std::path::PathBuf;
use std::time::Duration;

use esplogger::app::options::FleetOptions;
use esplogger::clock::Clock;
use esplogger::errors::LoggerError;
use esplogger::logs::LogLevel;
use esplogger::models::device::AuthMode;
use esplogger::utils::load_settings;

async fn write_settings(json: &str) -> (tempfile::TempDir, PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("options.json");
    tokio::fs::write(&path, json).await.unwrap();
    (tmp, path)
}

#[tokio::test]
async fn test_full_settings_file() {
    let (_tmp, path) = write_settings(
        r#"{
            "devices": [
                {"name": "kitchen", "host": "10.0.0.5", "password": "secret"},
                {"name": "garage", "host": "10.0.0.6", "port": 6054, "encryption_key": "a2V5"}
            ],
            "log_dir": "/var/log/esp",
            "timezone": "+01:00",
            "log_level": "debug",
            "rotation": {"max_size_bytes": 1024, "max_lines": 10, "max_backups": 2},
            "reconnect": {"base_delay_secs": 5, "max_delay_secs": 20}
        }"#,
    )
    .await;

    let settings = load_settings(&path).await.unwrap();
    assert_eq!(settings.log_level, LogLevel::Debug);

    let targets = settings.device_targets().unwrap();
    assert_eq!(targets.len(), 2);
    assert_eq!(targets[0].auth.password().as_deref(), Some("secret"));
    assert_eq!(targets[1].port, 6054);
    assert!(matches!(targets[1].auth, AuthMode::EncryptionKey(_)));

    let clock = Clock::resolve(settings.timezone.as_deref(), None);
    let options = FleetOptions::from_settings(&settings, clock);
    assert_eq!(options.layout.log_dir, PathBuf::from("/var/log/esp"));
    assert_eq!(options.rotation.max_lines, 10);
    assert_eq!(options.rotation.max_backups, 2);
    assert_eq!(options.reconnect.base_delay, Duration::from_secs(5));
    assert_eq!(options.reconnect.max_delay, Duration::from_secs(20));
    assert_eq!(options.reconnect.duplicate_session_delay, Duration::from_secs(30));
    assert!(matches!(options.clock, Clock::Fixed(_)));
}

#[tokio::test]
async fn test_empty_names_rejected() {
    let (_tmp, path) = write_settings(r#"{"devices": [{"name": " ", "host": "10.0.0.5"}]}"#).await;

    let settings = load_settings(&path).await.unwrap();
    assert!(matches!(settings.device_targets(), Err(LoggerError::ConfigError(_))));
}

#[tokio::test]
async fn test_no_devices_is_not_a_parse_error() {
    let (_tmp, path) = write_settings("{}").await;

    let settings = load_settings(&path).await.unwrap();
    assert!(settings.device_targets().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_file() {
    let (_tmp, path) = write_settings(r#"{"devices": 3}"#).await;
    assert!(load_settings(&path).await.is_err());
}
