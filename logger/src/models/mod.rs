//! Domain models

pub mod device;
pub mod record;
