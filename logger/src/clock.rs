//! Wall-clock time in the configured zone

use chrono::{FixedOffset, Local, NaiveDateTime, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

/// Zone used to stamp log records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    Utc,
    /// The process zone, as chrono resolves it (honours `TZ`)
    Local,
    Fixed(FixedOffset),
    /// IANA zone from the bundled database
    Named(Tz),
}

impl Clock {
    /// Resolve a zone identifier.
    ///
    /// `tz_env` is the value of the `TZ` environment variable, used when no
    /// zone is configured. IANA names resolve through the bundled database;
    /// a name the database lacks but `TZ` carries uses the process zone.
    /// Anything else falls back to UTC.
    pub fn resolve(zone: Option<&str>, tz_env: Option<&str>) -> Self {
        let zone = zone
            .or(tz_env)
            .map(str::trim)
            .filter(|z| !z.is_empty());

        let Some(zone) = zone else {
            return Clock::Local;
        };

        if zone.eq_ignore_ascii_case("utc") || zone == "Z" {
            return Clock::Utc;
        }
        if zone.eq_ignore_ascii_case("local") {
            return Clock::Local;
        }
        if let Ok(offset) = zone.parse::<FixedOffset>() {
            return Clock::Fixed(offset);
        }
        if let Ok(tz) = zone.parse::<Tz>() {
            return Clock::Named(tz);
        }
        if tz_env.map(str::trim) == Some(zone) {
            return Clock::Local;
        }

        warn!("Time zone {} could not be resolved, using UTC", zone);
        Clock::Utc
    }

    /// Resolve against the process environment and report the outcome
    pub fn from_env(zone: Option<&str>) -> Self {
        let tz_env = std::env::var("TZ").ok();
        let clock = Self::resolve(zone, tz_env.as_deref());
        info!("Using time zone: {}", clock.describe());
        clock
    }

    /// Current wall-clock time in this zone
    pub fn now(&self) -> NaiveDateTime {
        match self {
            Clock::Utc => Utc::now().naive_utc(),
            Clock::Local => Local::now().naive_local(),
            Clock::Fixed(offset) => Utc::now().with_timezone(offset).naive_local(),
            Clock::Named(tz) => Utc::now().with_timezone(tz).naive_local(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Clock::Utc => "UTC".to_string(),
            Clock::Local => "local".to_string(),
            Clock::Fixed(offset) => offset.to_string(),
            Clock::Named(tz) => tz.name().to_string(),
        }
    }
}
