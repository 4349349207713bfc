//! Integration tests for esplogger

mod mock;
mod test_fleet;
mod test_rotation;
mod test_settings;
mod test_supervisor;
