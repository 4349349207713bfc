//! Device fleet
//!
//! One log sink writer and one guarded supervisor per configured device.
//! Devices share nothing but the connector, so a failing device never
//! disturbs its siblings.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::options::FleetOptions;
use crate::clock::Clock;
use crate::errors::LoggerError;
use crate::models::device::DeviceTarget;
use crate::session::connector::Connector;
use crate::sink::log_sink::LogSink;
use crate::sink::writer::{spawn_writer, SinkSender};
use crate::supervisor::backoff::ReconnectOptions;
use crate::supervisor::worker::{panic_message, Supervisor};

/// Tasks belonging to one device
#[derive(Debug)]
pub struct DeviceHandle {
    pub name: String,
    guard: JoinHandle<()>,
    writer: JoinHandle<LogSink>,
}

/// Running fleet of device supervisors
#[derive(Debug)]
pub struct Fleet {
    devices: Vec<DeviceHandle>,
}

impl Fleet {
    /// Start one supervisor per target.
    ///
    /// An empty target list is reported and rejected before anything is
    /// spawned.
    pub async fn start<S, F>(
        targets: Vec<DeviceTarget>,
        options: &FleetOptions,
        connector: Arc<dyn Connector>,
        sleep_fn: S,
    ) -> Result<Self, LoggerError>
    where
        S: Fn(Duration) -> F + Clone + Send + Sync + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        if targets.is_empty() {
            error!("No devices configured, nothing to capture");
            return Err(LoggerError::NoDevices);
        }

        if let Err(e) = options.layout.setup().await {
            warn!(
                "Unable to create log directory {}: {}",
                options.layout.log_dir.display(),
                e
            );
        }

        let mut devices = Vec::with_capacity(targets.len());
        for target in targets {
            let file = options.layout.device_log_file(&target.name);
            let sink = LogSink::new(target.name.clone(), file, options.rotation);
            let (sink_tx, writer) = spawn_writer(sink);

            let name = target.name.clone();
            let guard = tokio::spawn(supervise_device(
                Arc::new(target),
                connector.clone(),
                options.clock,
                sink_tx,
                options.reconnect.clone(),
                sleep_fn.clone(),
            ));

            info!(device = %name, "Started log capture");
            devices.push(DeviceHandle {
                name,
                guard,
                writer,
            });
        }

        Ok(Self { devices })
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Names of the supervised devices, in configuration order
    pub fn device_names(&self) -> Vec<&str> {
        self.devices.iter().map(|d| d.name.as_str()).collect()
    }

    /// Wait for all guards; under normal operation this never completes
    pub async fn wait(&mut self) {
        join_all(self.devices.iter_mut().map(|d| &mut d.guard)).await;
    }

    /// Stop all supervisors and let the sink writers drain
    pub async fn shutdown(self) {
        for device in &self.devices {
            device.guard.abort();
        }

        for device in self.devices {
            // a cancelled guard drops its supervisor and with it the last sink sender
            let _ = device.guard.await;
            if let Err(e) = device.writer.await {
                error!(device = %device.name, "Sink writer failed: {}", e);
            }
        }
    }
}

/// Keep a supervisor running for one device.
///
/// A panic escaping the supervisor is logged and the same supervisor is put
/// back into backoff, keeping its reconnect delay.
async fn supervise_device<S, F>(
    target: Arc<DeviceTarget>,
    connector: Arc<dyn Connector>,
    clock: Clock,
    sink: SinkSender,
    reconnect: ReconnectOptions,
    sleep_fn: S,
) where
    S: Fn(Duration) -> F + Clone + Send + Sync + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let mut supervisor = Supervisor::new(target.clone(), connector, clock, sink, reconnect, sleep_fn);

    loop {
        let reason = match AssertUnwindSafe(supervisor.run()).catch_unwind().await {
            Ok(()) => "supervisor stopped".to_string(),
            Err(panic) => format!("supervisor panicked: {}", panic_message(panic.as_ref())),
        };
        error!(device = %target.name, "{}, restarting", reason);
        supervisor.recover(reason).await;
    }
}
