//! Sink writer task
//!
//! Each device's sink is owned by one task fed through a channel, so records
//! are written in arrival order and rotation never races an append.

use chrono::NaiveDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::models::record::LogRecord;
use crate::sink::log_sink::LogSink;

/// Message for a sink writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEntry {
    Record(LogRecord),
    Marker(NaiveDateTime),
}

pub type SinkSender = mpsc::UnboundedSender<SinkEntry>;

/// Spawn the writer; it runs until every sender is dropped
pub fn spawn_writer(sink: LogSink) -> (SinkSender, JoinHandle<LogSink>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run(sink, rx));
    (tx, handle)
}

async fn run(mut sink: LogSink, mut rx: mpsc::UnboundedReceiver<SinkEntry>) -> LogSink {
    while let Some(entry) = rx.recv().await {
        match entry {
            SinkEntry::Record(record) => sink.append(&record).await,
            SinkEntry::Marker(timestamp) => sink.write_marker(timestamp).await,
        }
    }
    debug!("Sink writer for {} stopped", sink.file().path().display());
    sink
}
