use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::time::{sleep, timeout};
use tokio_stream::StreamExt;
use tracing::{debug, info, instrument, trace};

use super::model::{CharacteristicInfo, FoundDevice, LinkEvent, LinkEventStream, ServiceInfo};
use super::transport::{Transport, TransportSession};
use crate::detect::ModelDetector;
use crate::error::InteractionError;
use crate::protocol::{EndpointId, endpoint_metadata};

const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Transport backed by `btleplug`.
#[derive(Debug)]
pub struct BtleplugTransport {
    manager: Manager,
    scan_timeout: Duration,
}

impl BtleplugTransport {
    /// Creates the real BLE transport; each connect scans for at most
    /// `scan_timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform BLE manager cannot be created.
    pub async fn new(scan_timeout: Duration) -> Result<Self, InteractionError> {
        let manager = Manager::new().await?;
        Ok(Self {
            manager,
            scan_timeout,
        })
    }

    #[instrument(skip(self), level = "trace")]
    async fn adapters(&self) -> Result<Vec<AdapterHandle>, InteractionError> {
        let adapters = self.manager.adapters().await?;
        if adapters.is_empty() {
            return Err(InteractionError::NoAdapters);
        }

        let mut handles = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            let name = adapter.adapter_info().await?;
            handles.push(AdapterHandle { adapter, name });
        }
        Ok(handles)
    }

    /// Scans until a peripheral matching `address` appears.
    async fn scan_for(
        &self,
        adapters: &[AdapterHandle],
        address: &str,
    ) -> Result<(Adapter, Peripheral, FoundDevice), InteractionError> {
        loop {
            for handle in adapters {
                for peripheral in handle.adapter.peripherals().await? {
                    let Some(properties) = peripheral.properties().await? else {
                        continue;
                    };
                    let peripheral_address = properties.address.to_string();
                    let peripheral_id = peripheral.id().to_string();
                    if !matches_target(
                        address,
                        &peripheral_address,
                        &peripheral_id,
                        properties.local_name.as_deref(),
                    ) {
                        continue;
                    }

                    let device = FoundDevice::new(
                        handle.name.clone(),
                        peripheral_address,
                        properties.local_name,
                        properties.rssi,
                    );
                    return Ok((handle.adapter.clone(), peripheral, device));
                }
            }

            sleep(SCAN_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl Transport for BtleplugTransport {
    #[instrument(skip(self), level = "debug", fields(scan_timeout = ?self.scan_timeout))]
    async fn connect(&self, address: &str) -> Result<Box<dyn TransportSession>, InteractionError> {
        let adapters = self.adapters().await?;
        info!(adapter_count = adapters.len(), "starting BLE scan");
        for handle in &adapters {
            handle.adapter.start_scan(ScanFilter::default()).await?;
        }

        let scanned = timeout(self.scan_timeout, self.scan_for(&adapters, address)).await;

        for handle in &adapters {
            if let Err(error) = handle.adapter.stop_scan().await {
                debug!(?error, "failed to stop adapter scan cleanly");
            }
        }

        let (adapter, peripheral, device) = match scanned {
            Ok(found) => found?,
            Err(_elapsed) => {
                return Err(InteractionError::DeviceNotFound {
                    target: target_label(address),
                    timeout: humantime::format_duration(self.scan_timeout).to_string(),
                });
            }
        };

        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        if let Err(error) = peripheral.discover_services().await {
            if let Err(disconnect_error) = peripheral.disconnect().await {
                debug!(?disconnect_error, "failed to disconnect after service discovery");
            }
            return Err(error.into());
        }
        info!(address = device.address(), "connected to peripheral");

        let (services, characteristics_by_uuid) =
            collect_services_and_characteristics(&peripheral);
        Ok(Box::new(BtleplugSession {
            device,
            services,
            characteristics_by_uuid,
            peripheral,
            adapter,
        }))
    }
}

/// Active session bound to a real peripheral.
#[derive(Debug)]
struct BtleplugSession {
    device: FoundDevice,
    services: Vec<ServiceInfo>,
    characteristics_by_uuid: HashMap<String, Characteristic>,
    peripheral: Peripheral,
    adapter: Adapter,
}

impl BtleplugSession {
    fn characteristic_for(
        &self,
        endpoint: EndpointId,
    ) -> Result<&Characteristic, InteractionError> {
        self.characteristics_by_uuid
            .get(endpoint_metadata(endpoint).uuid())
            .ok_or(InteractionError::MissingEndpoint { endpoint })
    }
}

#[async_trait]
impl TransportSession for BtleplugSession {
    fn device(&self) -> &FoundDevice {
        &self.device
    }

    fn services(&self) -> &[ServiceInfo] {
        &self.services
    }

    async fn request_mtu(&self, mtu: u16) -> Result<(), InteractionError> {
        debug!(mtu, "btleplug negotiates the ATT MTU itself; skipping request");
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(%endpoint))]
    async fn subscribe(&self, endpoint: EndpointId) -> Result<LinkEventStream, InteractionError> {
        let characteristic = self.characteristic_for(endpoint)?;

        // Both streams must exist before subscribing so no early chunk is missed.
        let expected_uuid = characteristic.uuid;
        let notifications = self
            .peripheral
            .notifications()
            .await?
            .filter(move |notification| notification.uuid == expected_uuid)
            .map(|notification| LinkEvent::Notification(notification.value));

        let peripheral_id = self.peripheral.id();
        let disconnects = self
            .adapter
            .events()
            .await?
            .filter_map(move |event| match event {
                CentralEvent::DeviceDisconnected(id) if id == peripheral_id => {
                    Some(LinkEvent::Disconnected)
                }
                _ => None,
            });

        self.peripheral.subscribe(characteristic).await?;
        Ok(Box::pin(notifications.merge(disconnects)))
    }

    #[instrument(skip(self, payload), level = "trace", fields(%endpoint, payload_len = payload.len()))]
    async fn write(&self, endpoint: EndpointId, payload: &[u8]) -> Result<(), InteractionError> {
        let characteristic = self.characteristic_for(endpoint)?;
        self.peripheral
            .write(characteristic, payload, WriteType::WithResponse)
            .await?;
        trace!("write acknowledged");
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(address = self.device.address()))]
    async fn disconnect(self: Box<Self>) -> Result<(), InteractionError> {
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct AdapterHandle {
    adapter: Adapter,
    name: String,
}

fn matches_target(
    target: &str,
    peripheral_address: &str,
    peripheral_id: &str,
    local_name: Option<&str>,
) -> bool {
    if target.is_empty() {
        return local_name.is_some_and(ModelDetector::is_watchdog_name);
    }

    peripheral_address.eq_ignore_ascii_case(target) || peripheral_id.eq_ignore_ascii_case(target)
}

fn target_label(address: &str) -> String {
    if address.is_empty() {
        "any Power Watchdog".to_string()
    } else {
        address.to_string()
    }
}

fn collect_services_and_characteristics(
    peripheral: &Peripheral,
) -> (Vec<ServiceInfo>, HashMap<String, Characteristic>) {
    let mut services = Vec::new();
    let mut characteristics_by_uuid = HashMap::new();

    for service in peripheral.services() {
        let service_uuid = service.uuid.to_string().to_lowercase();

        let mut characteristics = Vec::new();
        for characteristic in &service.characteristics {
            let characteristic_uuid = characteristic.uuid.to_string().to_lowercase();
            characteristics_by_uuid
                .entry(characteristic_uuid.clone())
                .or_insert_with(|| characteristic.clone());

            let flags = characteristic.properties;
            characteristics.push(CharacteristicInfo::new(
                characteristic_uuid,
                flags.intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE),
                flags.intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE),
            ));
        }
        characteristics.sort_by(|left, right| left.uuid().cmp(right.uuid()));

        services.push(ServiceInfo::new(service_uuid, characteristics));
    }
    services.sort_by(|left, right| left.uuid().cmp(right.uuid()));

    (services, characteristics_by_uuid)
}
