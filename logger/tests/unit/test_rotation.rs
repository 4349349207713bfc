//! Backup chain tests

use chrono::NaiveDate;
use esplogger::filesys::file::File;
use esplogger::models::record::{Level, LogRecord};
use esplogger::rotation::policy::RotationPolicy;
use esplogger::sink::log_sink::LogSink;

fn sink(dir: &std::path::Path, policy: RotationPolicy) -> LogSink {
    LogSink::new("kitchen", File::new(dir.join("kitchen.log")), policy)
}

fn backup(dir: &std::path::Path, generation: u32) -> std::path::PathBuf {
    dir.join(format!("kitchen.log.{generation}"))
}

/// Write a distinct generation and rotate it away, `count` times
async fn rotate_generations(sink: &LogSink, count: u32) {
    for generation in 1..=count {
        sink.file()
            .append_str(&format!("generation {generation}\n"))
            .await
            .unwrap();
        sink.rotate().await.unwrap();
    }
}

#[tokio::test]
async fn test_fewer_rotations_than_backups() {
    let tmp = tempfile::tempdir().unwrap();
    let sink = sink(tmp.path(), RotationPolicy::default());

    rotate_generations(&sink, 3).await;

    assert!(!sink.file().exists().await);
    for generation in 1..=3 {
        let contents = std::fs::read_to_string(backup(tmp.path(), generation)).unwrap();
        assert_eq!(contents, format!("generation {}\n", 4 - generation));
    }
    assert!(!backup(tmp.path(), 4).exists());
}

#[tokio::test]
async fn test_more_rotations_than_backups() {
    let tmp = tempfile::tempdir().unwrap();
    let sink = sink(tmp.path(), RotationPolicy::default());

    rotate_generations(&sink, 8).await;

    for generation in 1..=5 {
        let contents = std::fs::read_to_string(backup(tmp.path(), generation)).unwrap();
        assert_eq!(contents, format!("generation {}\n", 9 - generation));
    }
    assert!(!backup(tmp.path(), 6).exists());

    let files = std::fs::read_dir(tmp.path()).unwrap().count();
    assert_eq!(files, 5);
}

#[tokio::test]
async fn test_zero_backups_discards_live_file() {
    let tmp = tempfile::tempdir().unwrap();
    let policy = RotationPolicy {
        max_backups: 0,
        ..Default::default()
    };
    let sink = sink(tmp.path(), policy);

    rotate_generations(&sink, 2).await;

    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_append_rotates_on_line_threshold() {
    let tmp = tempfile::tempdir().unwrap();
    let policy = RotationPolicy {
        max_lines: 150,
        ..Default::default()
    };
    let mut sink = sink(tmp.path(), policy);
    let timestamp = NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_milli_opt(12, 0, 0, 0)
        .unwrap();

    for i in 0..250 {
        let record = LogRecord {
            timestamp,
            level: Level::Info,
            message: format!("line {i}"),
        };
        sink.append(&record).await;
    }

    // the check at 100 appends is below the threshold, the one at 200 rotates
    let rotated = std::fs::read_to_string(backup(tmp.path(), 1)).unwrap();
    assert_eq!(rotated.lines().count(), 200);
    assert!(rotated.lines().last().unwrap().ends_with("line 199"));

    let live = std::fs::read_to_string(tmp.path().join("kitchen.log")).unwrap();
    assert_eq!(live.lines().count(), 50);
    assert!(live.lines().next().unwrap().ends_with("line 200"));
}
