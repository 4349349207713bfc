//! Supervisor tests against scripted clients

use std::sync::Arc;
use std::time::Duration;

use device_api::{ApiError, LogLevel};
use esplogger::clock::Clock;
use esplogger::models::record::Level;
use esplogger::sink::writer::SinkEntry;
use esplogger::supervisor::backoff::ReconnectOptions;
use esplogger::supervisor::fsm::{Failure, Phase};
use esplogger::supervisor::worker::Supervisor;
use tokio::sync::mpsc;

use crate::mock::{entry, recording_sleep, target, Attempt, ScriptedConnector};

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

#[tokio::test]
async fn test_phase_sequence_and_records() {
    let connector = ScriptedConnector::new().script(
        "kitchen",
        vec![Attempt::streaming(
            vec![
                entry(LogLevel::Info, "\x1b[0;32m[I][app]: booted\x1b[0m"),
                entry(LogLevel::Config, "[C][wifi]: ssid"),
            ],
            Some(ApiError::Connection("Connection reset by peer".to_string())),
        )],
    );
    let journal = connector.journal();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (sleeps, sleep_fn) = recording_sleep();

    let mut supervisor = Supervisor::new(
        Arc::new(target("kitchen")),
        Arc::new(connector),
        Clock::Utc,
        tx,
        ReconnectOptions::default(),
        sleep_fn,
    );
    assert_eq!(supervisor.state().phase(), Phase::Connecting);

    supervisor.step().await;
    assert_eq!(supervisor.state().phase(), Phase::Connected);
    assert!(supervisor.has_session());

    supervisor.step().await;
    assert_eq!(supervisor.state().phase(), Phase::Streaming);
    assert!(matches!(rx.try_recv().unwrap(), SinkEntry::Marker(_)));

    supervisor.step().await;
    assert_eq!(supervisor.state().phase(), Phase::Backoff);
    assert!(!supervisor.has_session());
    assert!(matches!(
        supervisor.state().last_failure(),
        Some(Failure::Connection(_))
    ));
    assert_eq!(supervisor.state().pending_delay(), Some(secs(10)));

    match rx.try_recv().unwrap() {
        SinkEntry::Record(record) => {
            assert_eq!(record.level, Level::Info);
            assert_eq!(record.message, "[I][app]: booted");
        }
        other => panic!("unexpected entry {:?}", other),
    }
    match rx.try_recv().unwrap() {
        SinkEntry::Record(record) => assert_eq!(record.level, Level::Unknown),
        other => panic!("unexpected entry {:?}", other),
    }
    assert!(rx.try_recv().is_err());

    supervisor.step().await;
    assert_eq!(supervisor.state().phase(), Phase::Connecting);

    assert_eq!(*sleeps.lock().unwrap(), vec![secs(2), secs(10)]);
    assert_eq!(
        journal.entries(),
        vec![
            "kitchen:connect",
            "kitchen:subscribe",
            "kitchen:closed",
            "kitchen:disconnect"
        ]
    );
}

#[tokio::test]
async fn test_duplicate_session_waits_thirty_seconds() {
    let connector = ScriptedConnector::new().script(
        "garage",
        vec![Attempt::refused(ApiError::Connection(
            "Already connected to garage.local:6053".to_string(),
        ))],
    );
    let journal = connector.journal();
    let (tx, _rx) = mpsc::unbounded_channel();
    let (sleeps, sleep_fn) = recording_sleep();

    let mut supervisor = Supervisor::new(
        Arc::new(target("garage")),
        Arc::new(connector),
        Clock::Utc,
        tx,
        ReconnectOptions::default(),
        sleep_fn,
    );

    supervisor.step().await;
    assert_eq!(supervisor.state().phase(), Phase::Backoff);
    assert!(matches!(
        supervisor.state().last_failure(),
        Some(Failure::DuplicateSession(_))
    ));
    assert_eq!(supervisor.state().pending_delay(), Some(secs(30)));

    supervisor.step().await;
    assert_eq!(*sleeps.lock().unwrap(), vec![secs(2), secs(30)]);
    assert_eq!(journal.count("garage:disconnect"), 1);
}

#[tokio::test]
async fn test_backoff_delays_stay_within_bounds() {
    let connector = ScriptedConnector::new();
    let (tx, _rx) = mpsc::unbounded_channel();
    let (sleeps, sleep_fn) = recording_sleep();
    let options = ReconnectOptions {
        disconnect_grace: Duration::ZERO,
        ..Default::default()
    };

    let mut supervisor = Supervisor::new(
        Arc::new(target("porch")),
        Arc::new(connector),
        Clock::Utc,
        tx,
        options,
        sleep_fn,
    );

    for _ in 0..20 {
        supervisor.step().await;
        assert_eq!(supervisor.state().phase(), Phase::Backoff);
        supervisor.step().await;
        assert_eq!(supervisor.state().phase(), Phase::Connecting);
    }

    let sleeps = sleeps.lock().unwrap();
    assert_eq!(sleeps.len(), 20);
    assert_eq!(sleeps[0], secs(10));
    assert!(sleeps.iter().all(|d| *d >= secs(10) && *d <= secs(60)));
    assert!(sleeps.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*sleeps.last().unwrap(), secs(60));
}

#[tokio::test]
async fn test_compatibility_failure_grows_faster() {
    let connector = ScriptedConnector::new().script(
        "attic",
        vec![
            Attempt::refused(ApiError::Incompatible("API version 2.0".to_string())),
            Attempt::refused(ApiError::Incompatible("API version 2.0".to_string())),
        ],
    );
    let (tx, _rx) = mpsc::unbounded_channel();
    let (_sleeps, sleep_fn) = recording_sleep();

    let mut supervisor = Supervisor::new(
        Arc::new(target("attic")),
        Arc::new(connector),
        Clock::Utc,
        tx,
        ReconnectOptions::default(),
        sleep_fn,
    );

    supervisor.step().await;
    assert!(matches!(
        supervisor.state().last_failure(),
        Some(Failure::Compatibility(_))
    ));
    assert_eq!(supervisor.state().pending_delay(), Some(secs(10)));

    supervisor.step().await;
    supervisor.step().await;
    assert_eq!(supervisor.state().pending_delay(), Some(secs(15)));
}

#[tokio::test]
async fn test_client_panic_becomes_unexpected_failure() {
    let connector = ScriptedConnector::new().script("shed", vec![Attempt::panicking()]);
    let (tx, _rx) = mpsc::unbounded_channel();
    let (_sleeps, sleep_fn) = recording_sleep();

    let mut supervisor = Supervisor::new(
        Arc::new(target("shed")),
        Arc::new(connector),
        Clock::Utc,
        tx,
        ReconnectOptions::default(),
        sleep_fn,
    );

    supervisor.step().await;
    assert_eq!(supervisor.state().phase(), Phase::Backoff);
    match supervisor.state().last_failure() {
        Some(Failure::Unexpected(msg)) => assert!(msg.contains("scripted panic")),
        other => panic!("unexpected failure {:?}", other),
    }
}

#[tokio::test]
async fn test_subscribe_failure_writes_no_marker() {
    let mut attempt = Attempt::streaming(Vec::new(), None);
    attempt.subscribe = Err(ApiError::Connection("Connection reset by peer".to_string()));
    let connector = ScriptedConnector::new().script("cellar", vec![attempt]);
    let journal = connector.journal();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (_sleeps, sleep_fn) = recording_sleep();

    let mut supervisor = Supervisor::new(
        Arc::new(target("cellar")),
        Arc::new(connector),
        Clock::Utc,
        tx,
        ReconnectOptions::default(),
        sleep_fn,
    );

    supervisor.step().await;
    supervisor.step().await;
    assert_eq!(supervisor.state().phase(), Phase::Backoff);
    assert!(rx.try_recv().is_err());
    assert_eq!(journal.count("cellar:disconnect"), 1);
}

#[tokio::test]
async fn test_recovery_keeps_accumulated_delay() {
    let connector = ScriptedConnector::new();
    let (tx, _rx) = mpsc::unbounded_channel();
    let (sleeps, sleep_fn) = recording_sleep();
    let options = ReconnectOptions {
        disconnect_grace: Duration::ZERO,
        ..Default::default()
    };

    let mut supervisor = Supervisor::new(
        Arc::new(target("loft")),
        Arc::new(connector),
        Clock::Utc,
        tx,
        options,
        sleep_fn,
    );

    // three refused connects: 10 s, 12 s, 14.4 s
    supervisor.step().await;
    supervisor.step().await;
    supervisor.step().await;
    supervisor.step().await;
    supervisor.step().await;
    assert_eq!(supervisor.state().phase(), Phase::Backoff);

    let delay = supervisor.recover("supervisor panicked: boom".to_string()).await;
    assert!((delay.as_secs_f64() - 17.28).abs() < 0.01, "delay {delay:?}");
    assert_eq!(supervisor.state().pending_delay(), Some(delay));
    assert_eq!(supervisor.state().phase(), Phase::Backoff);
    assert!(matches!(
        supervisor.state().last_failure(),
        Some(Failure::Unexpected(msg)) if msg.contains("boom")
    ));

    supervisor.step().await;
    assert_eq!(sleeps.lock().unwrap().last(), Some(&delay));
    assert_eq!(supervisor.state().phase(), Phase::Connecting);
}
