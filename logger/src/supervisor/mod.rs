//! Per-device connection supervision

pub mod backoff;
pub mod fsm;
pub mod worker;
