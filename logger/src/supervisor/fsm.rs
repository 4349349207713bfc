//! Finite state machine for device connection supervision

use std::fmt;
use std::time::Duration;

use device_api::ApiError;

use crate::supervisor::backoff::{Backoff, ReconnectOptions};

/// Marker in connection errors raised when the device already serves another client
const DUPLICATE_SESSION_MARKER: &str = "already connected";

/// Supervisor phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Building a session and connecting
    Connecting,

    /// Connected, not yet subscribed
    Connected,

    /// Subscribed; records are flowing
    Streaming,

    /// Waiting before the next attempt
    Backoff,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Connecting => "connecting",
            Phase::Connected => "connected",
            Phase::Streaming => "streaming",
            Phase::Backoff => "backoff",
        };
        f.write_str(name)
    }
}

/// Classified failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The device already has an active session elsewhere
    DuplicateSession(String),

    /// Any other connection-layer failure
    Connection(String),

    /// Signature or version mismatch with the device API
    Compatibility(String),

    /// Anything else
    Unexpected(String),
}

impl Failure {
    pub fn classify(err: &ApiError) -> Self {
        match err {
            ApiError::Connection(msg)
                if msg.to_lowercase().contains(DUPLICATE_SESSION_MARKER) =>
            {
                Failure::DuplicateSession(msg.clone())
            }
            ApiError::Connection(msg) => Failure::Connection(msg.clone()),
            ApiError::Incompatible(msg) => Failure::Compatibility(msg.clone()),
            ApiError::Other(msg) => Failure::Unexpected(msg.clone()),
        }
    }

    /// Human readable description for status output
    pub fn describe(&self) -> String {
        match self {
            Failure::DuplicateSession(msg) => format!("session already active elsewhere ({msg})"),
            Failure::Connection(msg) => format!("connection error: {msg}"),
            Failure::Compatibility(msg) => format!("API compatibility problem: {msg}"),
            Failure::Unexpected(msg) => format!("unexpected error: {msg}"),
        }
    }
}

/// Supervisor event
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// Connection established and authenticated
    ConnectSucceeded,

    /// Log subscription accepted
    SubscribeSucceeded,

    /// Any phase failed
    Failed(Failure),

    /// Backoff delay has passed
    BackoffElapsed,
}

/// State owned by one device's supervisor
#[derive(Debug, Clone)]
pub struct SupervisorState {
    phase: Phase,
    backoff: Backoff,
    last_failure: Option<Failure>,
    pending_delay: Option<Duration>,
}

impl SupervisorState {
    /// Create a new state in the connecting phase
    pub fn new(options: ReconnectOptions) -> Self {
        Self {
            phase: Phase::Connecting,
            backoff: Backoff::new(options),
            last_failure: None,
            pending_delay: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn last_failure(&self) -> Option<&Failure> {
        self.last_failure.as_ref()
    }

    /// Delay chosen for the current backoff phase
    pub fn pending_delay(&self) -> Option<Duration> {
        self.pending_delay
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: SupervisorEvent) -> Result<(), String> {
        let new_phase = match (self.phase, event) {
            (Phase::Connecting, SupervisorEvent::ConnectSucceeded) => {
                self.backoff.reset();
                self.last_failure = None;
                Phase::Connected
            }

            (Phase::Connected, SupervisorEvent::SubscribeSucceeded) => Phase::Streaming,

            (
                Phase::Connecting | Phase::Connected | Phase::Streaming,
                SupervisorEvent::Failed(failure),
            ) => {
                self.pending_delay = Some(self.backoff.on_failure(&failure));
                self.last_failure = Some(failure);
                Phase::Backoff
            }

            (Phase::Backoff, SupervisorEvent::BackoffElapsed) => {
                self.pending_delay = None;
                Phase::Connecting
            }

            (phase, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", phase, event));
            }
        };

        self.phase = new_phase;
        Ok(())
    }

    /// Enter backoff from any phase after the supervisor itself failed.
    ///
    /// The failure counts like any other, so the delay keeps growing from
    /// where it was.
    pub fn recover(&mut self, failure: Failure) -> Duration {
        let delay = self.backoff.on_failure(&failure);
        self.pending_delay = Some(delay);
        self.last_failure = Some(failure);
        self.phase = Phase::Backoff;
        delay
    }
}
