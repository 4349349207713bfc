//! Per-device log files

pub mod log_sink;
pub mod writer;
