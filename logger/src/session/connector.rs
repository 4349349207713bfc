//! Builds Device API clients for targets

use device_api::native::client::ClientOptions;
use device_api::{DeviceApiClient, NativeApiClient};

use crate::models::device::{AuthMode, DeviceTarget};

/// Source of fresh clients; supervisors build one per connection attempt
pub trait Connector: Send + Sync {
    fn client(&self, target: &DeviceTarget) -> Box<dyn DeviceApiClient>;
}

/// Connector for the native API, plaintext or encrypted per target
#[derive(Debug, Clone, Default)]
pub struct NativeConnector {
    pub options: ClientOptions,
}

impl Connector for NativeConnector {
    fn client(&self, target: &DeviceTarget) -> Box<dyn DeviceApiClient> {
        let client = match &target.auth {
            AuthMode::None => NativeApiClient::new(&target.host, target.port, None),
            AuthMode::Password(_) => {
                NativeApiClient::new(&target.host, target.port, target.auth.password())
            }
            AuthMode::EncryptionKey(_) => NativeApiClient::with_noise_psk(
                &target.host,
                target.port,
                target.auth.encryption_key().unwrap_or_default(),
            ),
        };
        Box::new(client.with_options(self.options.clone()))
    }
}
