//! Application wiring: options, the device fleet and the run loop

pub mod fleet;
pub mod options;
pub mod run;
