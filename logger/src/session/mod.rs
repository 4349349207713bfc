//! Device sessions: one connection to one device's log stream

pub mod ansi;
pub mod connector;
pub mod device_session;
