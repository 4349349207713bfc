//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tracing::info;

use crate::app::fleet::Fleet;
use crate::app::options::FleetOptions;
use crate::errors::LoggerError;
use crate::models::device::DeviceTarget;
use crate::session::connector::{Connector, NativeConnector};

/// Capture logs from every target until the shutdown signal resolves
pub async fn run(
    targets: Vec<DeviceTarget>,
    options: FleetOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), LoggerError> {
    let connector: Arc<dyn Connector> = Arc::new(NativeConnector::default());
    run_with(targets, options, connector, shutdown_signal).await
}

/// Same as [`run`] with an explicit connector
pub async fn run_with(
    targets: Vec<DeviceTarget>,
    options: FleetOptions,
    connector: Arc<dyn Connector>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), LoggerError> {
    let mut fleet = Fleet::start(targets, &options, connector, tokio::time::sleep).await?;
    info!("Capturing logs from {} device(s)", fleet.len());

    tokio::select! {
        _ = fleet.wait() => {
            info!("All supervisors stopped");
        }
        _ = shutdown_signal => {
            info!("Shutdown signal received, shutting down...");
        }
    }

    fleet.shutdown().await;
    Ok(())
}
