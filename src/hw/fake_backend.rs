use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, instrument};

use super::model::{CharacteristicInfo, FoundDevice, LinkEvent, LinkEventStream, ServiceInfo};
use super::transport::{Transport, TransportSession};
use crate::detect::{Generation, ModelDetector};
use crate::error::{FixtureError, InteractionError};
use crate::protocol::{
    EndpointId, GEN2_PROTOCOL_OK, GEN2_PROTOCOL_OPEN, endpoint_metadata, endpoints_for,
};

const FAKE_ADAPTER_NAME: &str = "fake0";
const FAKE_RSSI: i16 = -48;

/// Parsed fake notification payload fixtures.
#[derive(Debug, Clone, derive_more::Into)]
pub(crate) struct NotificationPayloads {
    payloads: Vec<Vec<u8>>,
}

impl FromStr for NotificationPayloads {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let payloads = parse_notifications(value)?;
        Ok(Self { payloads })
    }
}

/// One parsed hex payload fixture.
#[derive(Debug, Clone, derive_more::Into)]
pub(crate) struct HexPayload {
    bytes: Vec<u8>,
}

impl FromStr for HexPayload {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let bytes = parse_hex(value)?;
        Ok(Self { bytes })
    }
}

/// Settings for a scripted Power Watchdog peripheral.
///
/// ```
/// use hughes::FakeTransportConfig;
///
/// let config = FakeTransportConfig::builder()
///     .local_name("WD_E8_0001")
///     .connect_failures(2)
///     .build();
/// let _ = config;
/// ```
#[derive(Debug, Clone, Builder)]
pub struct FakeTransportConfig {
    /// Advertised local name.
    #[builder(into)]
    local_name: String,
    /// Address reported for the peripheral.
    #[builder(into, default = "FA:KE:00:00:00:01".to_string())]
    address: String,
    /// Number of connect attempts refused before connections succeed.
    #[builder(default)]
    connect_failures: usize,
    /// Chunks replayed in order as soon as notifications are enabled.
    #[builder(default)]
    notifications: Vec<Vec<u8>>,
    /// Whether the Gen2 protocol-open write is answered with `ok`.
    #[builder(default = true)]
    ack_handshake: bool,
    /// Notification sent after every non-handshake write.
    command_reply: Option<Vec<u8>>,
    /// How long non-handshake writes take to complete.
    command_write_delay: Option<Duration>,
    /// Generation whose GATT layout is exposed; defaults to the name's.
    service_generation: Option<Generation>,
}

impl FakeTransportConfig {
    /// Returns the advertised local name.
    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Returns the peripheral address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[derive(Debug, Default)]
struct FakeState {
    remaining_failures: usize,
    connect_attempts: Vec<Instant>,
    writes: Vec<(EndpointId, Vec<u8>)>,
    mtu_requests: Vec<u16>,
    disconnect_calls: usize,
    connected: bool,
    link: Option<mpsc::UnboundedSender<LinkEvent>>,
}

impl FakeState {
    fn send(&self, event: LinkEvent) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| link.send(event).is_ok())
    }
}

/// Scripted transport used in tests and non-hardware environments.
#[derive(Debug)]
pub struct FakeTransport {
    config: FakeTransportConfig,
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    /// Creates a fake transport from explicit settings.
    #[must_use]
    pub fn new(config: FakeTransportConfig) -> Self {
        let state = FakeState {
            remaining_failures: config.connect_failures,
            ..FakeState::default()
        };
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Returns a handle for observing and driving the fake peripheral.
    #[must_use]
    pub fn controller(&self) -> FakeController {
        FakeController {
            state: Arc::clone(&self.state),
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    #[instrument(skip(self), level = "debug")]
    async fn connect(&self, address: &str) -> Result<Box<dyn TransportSession>, InteractionError> {
        let mut state = self.state.lock();
        state.connect_attempts.push(Instant::now());
        if state.remaining_failures > 0 {
            state.remaining_failures -= 1;
            return Err(InteractionError::FakeConnectRefused {
                address: self.config.address.clone(),
            });
        }
        state.connected = true;

        let generation = self
            .config
            .service_generation
            .unwrap_or_else(|| ModelDetector::detect(&self.config.local_name).generation());
        let device = FoundDevice::new(
            FAKE_ADAPTER_NAME.to_string(),
            self.config.address.clone(),
            Some(self.config.local_name.clone()),
            Some(FAKE_RSSI),
        );

        Ok(Box::new(FakeSession {
            device,
            services: services_for(generation),
            notifications: self.config.notifications.clone(),
            ack_handshake: self.config.ack_handshake,
            command_reply: self.config.command_reply.clone(),
            command_write_delay: self.config.command_write_delay,
            state: Arc::clone(&self.state),
        }))
    }
}

#[derive(Debug)]
struct FakeSession {
    device: FoundDevice,
    services: Vec<ServiceInfo>,
    notifications: Vec<Vec<u8>>,
    ack_handshake: bool,
    command_reply: Option<Vec<u8>>,
    command_write_delay: Option<Duration>,
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl TransportSession for FakeSession {
    fn device(&self) -> &FoundDevice {
        &self.device
    }

    fn services(&self) -> &[ServiceInfo] {
        &self.services
    }

    async fn request_mtu(&self, mtu: u16) -> Result<(), InteractionError> {
        self.state.lock().mtu_requests.push(mtu);
        Ok(())
    }

    async fn subscribe(&self, endpoint: EndpointId) -> Result<LinkEventStream, InteractionError> {
        let uuid = endpoint_metadata(endpoint).uuid();
        if !self
            .services
            .iter()
            .any(|service| service.characteristic(uuid).is_some())
        {
            return Err(InteractionError::MissingEndpoint { endpoint });
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        for payload in &self.notifications {
            // The receiver is alive until this function returns.
            let _sent = sender.send(LinkEvent::Notification(payload.clone()));
        }
        self.state.lock().link = Some(sender);
        debug!(replayed = self.notifications.len(), "fake notifications enabled");

        Ok(Box::pin(UnboundedReceiverStream::new(receiver)))
    }

    async fn write(&self, endpoint: EndpointId, payload: &[u8]) -> Result<(), InteractionError> {
        {
            let mut state = self.state.lock();
            if !state.connected {
                return Err(InteractionError::LinkClosed);
            }
            state.writes.push((endpoint, payload.to_vec()));

            if payload == GEN2_PROTOCOL_OPEN {
                if self.ack_handshake {
                    state.send(LinkEvent::Notification(GEN2_PROTOCOL_OK.to_vec()));
                }
                return Ok(());
            }
        }

        if let Some(delay) = self.command_write_delay {
            sleep(delay).await;
        }
        if let Some(reply) = &self.command_reply {
            self.state.lock().send(LinkEvent::Notification(reply.clone()));
        }
        Ok(())
    }

    async fn disconnect(self: Box<Self>) -> Result<(), InteractionError> {
        let mut state = self.state.lock();
        state.disconnect_calls += 1;
        state.connected = false;
        state.link = None;
        Ok(())
    }
}

/// Observes and drives a [`FakeTransport`] from tests.
#[derive(Debug, Clone)]
pub struct FakeController {
    state: Arc<Mutex<FakeState>>,
}

impl FakeController {
    /// Returns the instant of every connect attempt, in order.
    #[must_use]
    pub fn connect_attempts(&self) -> Vec<Instant> {
        self.state.lock().connect_attempts.clone()
    }

    /// Returns every payload written, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<(EndpointId, Vec<u8>)> {
        self.state.lock().writes.clone()
    }

    /// Returns every requested MTU.
    #[must_use]
    pub fn mtu_requests(&self) -> Vec<u16> {
        self.state.lock().mtu_requests.clone()
    }

    /// Returns how many times a session was disconnected by the host.
    #[must_use]
    pub fn disconnect_calls(&self) -> usize {
        self.state.lock().disconnect_calls
    }

    /// Returns whether a session is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Delivers a notification chunk on the open link.
    ///
    /// Returns `false` when no subscriber is listening.
    pub fn push_notification(&self, payload: impl Into<Vec<u8>>) -> bool {
        self.state
            .lock()
            .send(LinkEvent::Notification(payload.into()))
    }

    /// Simulates the peripheral dropping the connection.
    pub fn drop_link(&self) {
        let mut state = self.state.lock();
        state.send(LinkEvent::Disconnected);
        state.connected = false;
        state.link = None;
    }
}

fn services_for(generation: Generation) -> Vec<ServiceInfo> {
    let endpoints = endpoints_for(generation);
    let service = endpoint_metadata(endpoints.service);

    let notify = endpoint_metadata(endpoints.notify).uuid();
    let characteristics = if endpoints.notify == endpoints.write {
        vec![CharacteristicInfo::new(notify, true, true)]
    } else {
        vec![
            CharacteristicInfo::new(notify, true, false),
            CharacteristicInfo::new(endpoint_metadata(endpoints.write).uuid(), false, true),
        ]
    };

    vec![ServiceInfo::new(service.uuid(), characteristics)]
}

fn parse_notifications(raw_value: &str) -> Result<Vec<Vec<u8>>, FixtureError> {
    if raw_value.trim().is_empty() {
        return Ok(Vec::new());
    }
    raw_value.split(',').map(parse_hex).collect()
}

/// Parses a hex payload, ignoring whitespace.
pub(crate) fn parse_hex(raw_value: &str) -> Result<Vec<u8>, FixtureError> {
    let cleaned: String = raw_value.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&cleaned).map_err(|error| match error {
        hex::FromHexError::InvalidHexCharacter { index, .. } => {
            let start = index - index % 2;
            FixtureError::InvalidHexByte {
                value: cleaned.chars().skip(start).take(2).collect(),
            }
        }
        hex::FromHexError::OddLength | hex::FromHexError::InvalidStringLength => {
            FixtureError::InvalidHexLength
        }
    })
}
