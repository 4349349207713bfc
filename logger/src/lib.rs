//! ESPHome log capture
//!
//! Streams the logs of a fleet of ESPHome devices over the native API into
//! one rotated file per device, reconnecting with backoff when a device
//! goes away.

pub mod app;
pub mod clock;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod rotation;
pub mod session;
pub mod sink;
pub mod storage;
pub mod supervisor;
pub mod utils;
