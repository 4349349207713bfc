//! Reconnect backoff

use std::time::Duration;

use crate::supervisor::fsm::Failure;

/// Reconnect timing options
#[derive(Debug, Clone)]
pub struct ReconnectOptions {
    /// Delay after a successful connection, and the floor for every delay
    pub base_delay: Duration,

    /// Ceiling for every delay
    pub max_delay: Duration,

    /// Fixed delay when the device already has a session elsewhere
    pub duplicate_session_delay: Duration,

    /// Growth after a connection-layer failure
    pub connection_multiplier: f64,

    /// Growth after compatibility and unexpected failures
    pub failure_multiplier: f64,

    /// Pause after tearing down a session
    pub disconnect_grace: Duration,
}

impl Default for ReconnectOptions {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
            duplicate_session_delay: Duration::from_secs(30),
            connection_multiplier: 1.2,
            failure_multiplier: 1.5,
            disconnect_grace: Duration::from_secs(2),
        }
    }
}

/// Backoff delay of one device
#[derive(Debug, Clone)]
pub struct Backoff {
    options: ReconnectOptions,
    current: Duration,
}

impl Backoff {
    pub fn new(options: ReconnectOptions) -> Self {
        Self {
            current: options.base_delay,
            options,
        }
    }

    /// Delay the next ordinary failure will wait
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn options(&self) -> &ReconnectOptions {
        &self.options
    }

    /// Back to the base delay after a successful connection
    pub fn reset(&mut self) {
        self.current = self.options.base_delay;
    }

    /// Delay to wait for `failure`, advancing the state for the next one
    pub fn on_failure(&mut self, failure: &Failure) -> Duration {
        match failure {
            Failure::DuplicateSession(_) => {
                self.current = self.clamp(self.options.duplicate_session_delay);
                self.current
            }
            Failure::Connection(_) => self.wait_and_grow(self.options.connection_multiplier),
            Failure::Compatibility(_) | Failure::Unexpected(_) => {
                self.wait_and_grow(self.options.failure_multiplier)
            }
        }
    }

    fn wait_and_grow(&mut self, multiplier: f64) -> Duration {
        let wait = self.current;
        let grown = self.current.as_secs_f64() * multiplier;
        self.current = if grown.is_finite() {
            self.clamp(Duration::from_secs_f64(grown.max(0.0)))
        } else {
            self.options.max_delay
        };
        wait
    }

    fn clamp(&self, delay: Duration) -> Duration {
        delay.clamp(self.options.base_delay, self.options.max_delay.max(self.options.base_delay))
    }
}
