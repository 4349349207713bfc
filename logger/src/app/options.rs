//! Application configuration options

use crate::clock::Clock;
use crate::rotation::policy::RotationPolicy;
use crate::storage::layout::LogLayout;
use crate::storage::settings::Settings;
use crate::supervisor::backoff::ReconnectOptions;

/// Options shared by every device in the fleet
#[derive(Debug, Clone)]
pub struct FleetOptions {
    /// Where device log files live
    pub layout: LogLayout,

    /// Rotation thresholds, applied per device
    pub rotation: RotationPolicy,

    /// Reconnect timing, applied per device
    pub reconnect: ReconnectOptions,

    /// Zone for record timestamps
    pub clock: Clock,
}

impl Default for FleetOptions {
    fn default() -> Self {
        Self {
            layout: LogLayout::default(),
            rotation: RotationPolicy::default(),
            reconnect: ReconnectOptions::default(),
            clock: Clock::Local,
        }
    }
}

impl FleetOptions {
    /// Build the options from settings and an already resolved clock
    pub fn from_settings(settings: &Settings, clock: Clock) -> Self {
        Self {
            layout: LogLayout::new(settings.log_dir.clone()),
            rotation: RotationPolicy::from(&settings.rotation),
            reconnect: ReconnectOptions::from(&settings.reconnect),
            clock,
        }
    }
}
