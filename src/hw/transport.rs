use std::fmt::Debug;

use async_trait::async_trait;
use tracing::info;

use super::btleplug_backend::BtleplugTransport;
use super::fake_backend::{FakeTransport, FakeTransportConfig};
use super::model::{FoundDevice, LinkEventStream, ServiceInfo};
use crate::config::CoordinatorConfig;
use crate::error::InteractionError;
use crate::protocol::EndpointId;

/// Opens BLE sessions to a Power Watchdog.
///
/// One transport serves every reconnect attempt of one coordinator.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Connects to `address` and discovers its services.
    ///
    /// An empty address connects to the first peripheral whose advertised
    /// name looks like a Power Watchdog.
    async fn connect(&self, address: &str) -> Result<Box<dyn TransportSession>, InteractionError>;
}

/// A connected peripheral with discovered services.
#[async_trait]
pub trait TransportSession: Send + Sync + Debug {
    /// Returns details for the connected device.
    fn device(&self) -> &FoundDevice;

    /// Returns the GATT services discovered on connect.
    fn services(&self) -> &[ServiceInfo];

    /// Requests a larger ATT MTU; backends may treat this as a no-op.
    async fn request_mtu(&self, mtu: u16) -> Result<(), InteractionError>;

    /// Enables notifications on `endpoint` and returns the merged stream of
    /// notifications and disconnect events.
    async fn subscribe(&self, endpoint: EndpointId) -> Result<LinkEventStream, InteractionError>;

    /// Writes `payload` to `endpoint` with response.
    async fn write(&self, endpoint: EndpointId, payload: &[u8]) -> Result<(), InteractionError>;

    /// Closes the connection.
    async fn disconnect(self: Box<Self>) -> Result<(), InteractionError>;
}

/// Runtime BLE backend selection.
#[derive(Debug)]
pub(crate) enum TransportBackend {
    Real,
    Fake(FakeTransportConfig),
}

/// Builds the transport for the selected runtime backend.
pub(crate) async fn transport_from_backend(
    backend: TransportBackend,
    config: &CoordinatorConfig,
) -> Result<Box<dyn Transport>, InteractionError> {
    let transport: Box<dyn Transport> = match backend {
        TransportBackend::Real => Box::new(BtleplugTransport::new(config.scan_timeout()).await?),
        TransportBackend::Fake(config) => {
            info!("using fake BLE backend");
            Box::new(FakeTransport::new(config))
        }
    };

    Ok(transport)
}
