//! Fleet tests

use std::sync::Arc;
use std::time::Duration;

use device_api::LogLevel;
use esplogger::app::fleet::Fleet;
use esplogger::app::options::FleetOptions;
use esplogger::clock::Clock;
use esplogger::errors::LoggerError;
use esplogger::storage::layout::LogLayout;

use crate::mock::{entry, recording_sleep, target, Attempt, ScriptedConnector};

fn options(dir: &std::path::Path) -> FleetOptions {
    FleetOptions {
        layout: LogLayout::new(dir),
        clock: Clock::Utc,
        ..Default::default()
    }
}

fn never(_: Duration) -> futures::future::Pending<()> {
    futures::future::pending()
}

#[tokio::test]
async fn test_empty_device_list_starts_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let connector = ScriptedConnector::new();
    let journal = connector.journal();

    let result = Fleet::start(Vec::new(), &options(tmp.path()), Arc::new(connector), never).await;

    assert!(matches!(result, Err(LoggerError::NoDevices)));
    assert!(journal.entries().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_devices_never_share_a_file() {
    let tmp = tempfile::tempdir().unwrap();
    let lines = |device: &str| {
        (0..200)
            .map(|i| entry(LogLevel::Debug, &format!("[D][{device}]: line {i}")))
            .collect::<Vec<_>>()
    };
    let connector = ScriptedConnector::new()
        .script("kitchen", vec![Attempt::streaming(lines("kitchen"), None)])
        .script("garage", vec![Attempt::streaming(lines("garage"), None)]);
    let journal = connector.journal();

    let fleet = Fleet::start(
        vec![target("kitchen"), target("garage")],
        &options(tmp.path()),
        Arc::new(connector),
        never,
    )
    .await
    .unwrap();
    assert_eq!(fleet.device_names(), vec!["kitchen", "garage"]);

    journal.wait_for("kitchen:closed", 1).await;
    journal.wait_for("garage:closed", 1).await;
    fleet.shutdown().await;

    for device in ["kitchen", "garage"] {
        let contents = std::fs::read_to_string(tmp.path().join(format!("{device}.log"))).unwrap();
        let mut file_lines = contents.lines();

        assert!(file_lines.next().unwrap().starts_with("# Logger gestartet um "));
        let records: Vec<&str> = file_lines.collect();
        assert_eq!(records.len(), 200);
        for (i, line) in records.iter().enumerate() {
            assert!(line.contains("] [DEBUG        ] "), "bad line {line}");
            assert!(line.ends_with(&format!("[D][{device}]: line {i}")), "bad line {line}");
        }
    }
}

#[tokio::test]
async fn test_panicking_supervisor_is_respawned() {
    let tmp = tempfile::tempdir().unwrap();
    let connector = ScriptedConnector::new()
        .panic_on_client("kitchen", 1)
        .script("kitchen", vec![Attempt::streaming(Vec::new(), None)])
        .script("garage", vec![Attempt::streaming(Vec::new(), None)]);
    let journal = connector.journal();
    let (sleeps, sleep_fn) = recording_sleep();

    let fleet = Fleet::start(
        vec![target("kitchen"), target("garage")],
        &options(tmp.path()),
        Arc::new(connector),
        sleep_fn,
    )
    .await
    .unwrap();

    journal.wait_for("kitchen:closed", 1).await;
    journal.wait_for("garage:closed", 1).await;
    fleet.shutdown().await;

    assert_eq!(journal.count("kitchen:client-panic"), 1);
    assert_eq!(journal.count("kitchen:connect"), 1);
    assert_eq!(journal.count("garage:connect"), 1);
    assert_eq!(*sleeps.lock().unwrap(), vec![Duration::from_secs(10)]);
}
