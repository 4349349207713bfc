//! Connection supervisor for one device
//!
//! Drives `connecting -> connected -> streaming -> backoff -> connecting`
//! forever. Every failure, including a panic inside the client, is
//! classified and answered with a backoff; nothing escapes to the caller.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use device_api::ApiError;
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::models::device::DeviceTarget;
use crate::session::connector::Connector;
use crate::session::device_session::DeviceSession;
use crate::sink::writer::{SinkEntry, SinkSender};
use crate::supervisor::backoff::ReconnectOptions;
use crate::supervisor::fsm::{Failure, Phase, SupervisorEvent, SupervisorState};

/// Supervisor of one device
pub struct Supervisor<S> {
    target: Arc<DeviceTarget>,
    connector: Arc<dyn Connector>,
    clock: Clock,
    sink: SinkSender,
    state: SupervisorState,
    session: Option<DeviceSession>,
    sleep_fn: S,
}

impl<S, F> Supervisor<S>
where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    pub fn new(
        target: Arc<DeviceTarget>,
        connector: Arc<dyn Connector>,
        clock: Clock,
        sink: SinkSender,
        options: ReconnectOptions,
        sleep_fn: S,
    ) -> Self {
        Self {
            target,
            connector,
            clock,
            sink,
            state: SupervisorState::new(options),
            session: None,
            sleep_fn,
        }
    }

    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    /// Whether a session is currently held
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Run the state machine forever
    pub async fn run(&mut self) {
        info!(
            device = %self.target.name,
            "Supervising {}:{} ({})",
            self.target.host,
            self.target.port,
            self.target.auth.describe()
        );
        loop {
            self.step().await;
        }
    }

    /// Pick up after a panic that escaped [`Supervisor::run`].
    ///
    /// Drops any session and enters backoff with the accumulated delay, so
    /// the next [`Supervisor::run`] waits before reconnecting.
    pub async fn recover(&mut self, reason: String) -> Duration {
        self.teardown().await;
        let delay = self.state.recover(Failure::Unexpected(reason));
        info!(
            device = %self.target.name,
            phase = %Phase::Backoff,
            "Reconnecting in {:.1} seconds...",
            delay.as_secs_f64()
        );
        delay
    }

    /// Execute the current phase once
    pub async fn step(&mut self) {
        match self.state.phase() {
            Phase::Connecting => self.connect().await,
            Phase::Connected => self.subscribe().await,
            Phase::Streaming => self.stream().await,
            Phase::Backoff => self.backoff().await,
        }
    }

    async fn connect(&mut self) {
        info!(
            device = %self.target.name,
            phase = %Phase::Connecting,
            "Connecting to {}...",
            self.target.host
        );

        let client = self.connector.client(&self.target);
        let mut session = DeviceSession::new(self.target.name.clone(), client, self.clock);
        let result = guarded(session.connect()).await;
        self.session = Some(session);

        match result {
            Ok(()) => {
                self.transition(SupervisorEvent::ConnectSucceeded);
                info!(device = %self.target.name, phase = %Phase::Connected, "Connected");
            }
            Err(failure) => self.fail(failure).await,
        }
    }

    async fn subscribe(&mut self) {
        let result = match self.session.as_mut() {
            Some(session) => guarded(session.subscribe(self.sink.clone())).await,
            None => Err(Failure::Unexpected("No session to subscribe on".to_string())),
        };

        match result {
            Ok(()) => {
                if self.sink.send(SinkEntry::Marker(self.clock.now())).is_err() {
                    warn!(device = %self.target.name, "Sink writer gone, startup marker dropped");
                }
                self.transition(SupervisorEvent::SubscribeSucceeded);
                info!(device = %self.target.name, phase = %Phase::Streaming, "Subscribed to logs");
            }
            Err(failure) => self.fail(failure).await,
        }
    }

    async fn stream(&mut self) {
        let failure = match self.session.as_mut() {
            Some(session) => match guarded(async { Err::<(), _>(session.closed().await) }).await {
                Err(failure) => failure,
                Ok(()) => Failure::Unexpected("Connection ended without an error".to_string()),
            },
            None => Failure::Unexpected("Streaming without a session".to_string()),
        };
        self.fail(failure).await;
    }

    async fn backoff(&mut self) {
        let delay = self
            .state
            .pending_delay()
            .unwrap_or(self.state.backoff().options().base_delay);
        (self.sleep_fn)(delay).await;
        self.transition(SupervisorEvent::BackoffElapsed);
    }

    async fn fail(&mut self, failure: Failure) {
        match &failure {
            Failure::DuplicateSession(_) => warn!(
                device = %self.target.name,
                phase = %self.state.phase(),
                error = %failure.describe(),
                "Device already has an active session, waiting longer before retrying"
            ),
            Failure::Connection(_) => warn!(
                device = %self.target.name,
                phase = %self.state.phase(),
                error = %failure.describe(),
                "Connection failed"
            ),
            Failure::Compatibility(_) | Failure::Unexpected(_) => error!(
                device = %self.target.name,
                phase = %self.state.phase(),
                error = %failure.describe(),
                "Connection failed"
            ),
        }

        self.teardown().await;
        self.transition(SupervisorEvent::Failed(failure));

        if let Some(delay) = self.state.pending_delay() {
            info!(
                device = %self.target.name,
                phase = %Phase::Backoff,
                "Reconnecting in {:.1} seconds...",
                delay.as_secs_f64()
            );
        }
    }

    /// Best-effort disconnect; secondary errors are swallowed
    async fn teardown(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        if let Err(failure) = guarded(session.disconnect()).await {
            debug!(device = %self.target.name, "Ignoring disconnect error: {}", failure.describe());
        }
        drop(session);

        let grace = self.state.backoff().options().disconnect_grace;
        if !grace.is_zero() {
            (self.sleep_fn)(grace).await;
        }
    }

    fn transition(&mut self, event: SupervisorEvent) {
        if let Err(e) = self.state.process(event) {
            error!(device = %self.target.name, "{}", e);
        }
    }
}

/// Run a client call, turning errors and panics into classified failures
async fn guarded<T>(fut: impl Future<Output = Result<T, ApiError>>) -> Result<T, Failure> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(Failure::classify(&e)),
        Err(panic) => Err(Failure::Unexpected(format!(
            "client panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
