use std::time::Duration;

use serde::{Serialize, Serializer};
use serde_with::{DurationMilliSeconds, serde_as};
use tokio::time::Instant;

use crate::config::DeviceConfig;
use crate::detect::DeviceModel;
use crate::hw::FoundDevice;
use crate::state::DeviceState;

/// Lifecycle phase of a coordinator.
#[serde_as]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, derive_more::Display)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ConnectionPhase {
    /// Not yet started.
    #[display("disconnected")]
    Disconnected,
    /// Waiting for the transport to connect.
    #[display("connecting")]
    Connecting,
    /// Validating identity and enabling notifications.
    #[display("initializing")]
    Initializing,
    /// Notifications flowing.
    #[display("connected")]
    Connected,
    /// Waiting out a backoff delay before the next attempt.
    #[display("reconnecting (attempt {attempt}, in {})", humantime::format_duration(*delay))]
    Reconnecting {
        attempt: u32,
        #[serde(rename = "delay_ms")]
        #[serde_as(as = "DurationMilliSeconds<u64>")]
        delay: Duration,
    },
    /// Shut down; terminal.
    #[display("torn down")]
    TornDown,
}

/// Read-only view of everything a coordinator publishes.
///
/// Serializes with the derived `last_seen_age_ms` and `data_healthy` health
/// fields alongside the stored ones.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    device: DeviceConfig,
    model: DeviceModel,
    phase: ConnectionPhase,
    connected: bool,
    peripheral: Option<FoundDevice>,
    state: Option<DeviceState>,
    update_count: u64,
    reconnect_failures: u32,
    stale_threshold: Duration,
}

#[serde_as]
#[derive(Serialize)]
struct SnapshotRecord<'a> {
    device: &'a DeviceConfig,
    model: &'a DeviceModel,
    phase: ConnectionPhase,
    connected: bool,
    peripheral: Option<&'a FoundDevice>,
    state: Option<&'a DeviceState>,
    update_count: u64,
    reconnect_failures: u32,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    last_seen_age_ms: Option<Duration>,
    data_healthy: bool,
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SnapshotRecord {
            device: &self.device,
            model: &self.model,
            phase: self.phase,
            connected: self.connected,
            peripheral: self.peripheral.as_ref(),
            state: self.state.as_ref(),
            update_count: self.update_count,
            reconnect_failures: self.reconnect_failures,
            last_seen_age_ms: self.last_seen_age(),
            data_healthy: self.data_healthy(),
        }
        .serialize(serializer)
    }
}

impl Snapshot {
    pub(crate) fn new(device: DeviceConfig, model: DeviceModel, stale_threshold: Duration) -> Self {
        Self {
            device,
            model,
            phase: ConnectionPhase::Disconnected,
            connected: false,
            peripheral: None,
            state: None,
            update_count: 0,
            reconnect_failures: 0,
            stale_threshold,
        }
    }

    /// Configured device identity, passed through unchanged.
    #[must_use]
    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    /// Model detected from the configured name.
    #[must_use]
    pub fn model(&self) -> &DeviceModel {
        &self.model
    }

    #[must_use]
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Returns whether notifications are currently flowing.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Peripheral of the current or most recent session.
    #[must_use]
    pub fn peripheral(&self) -> Option<&FoundDevice> {
        self.peripheral.as_ref()
    }

    /// Latest telemetry, kept across reconnects.
    #[must_use]
    pub fn state(&self) -> Option<&DeviceState> {
        self.state.as_ref()
    }

    /// Number of decoded updates applied since spawn.
    #[must_use]
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Reconnect cycles since the last successful connection.
    #[must_use]
    pub fn reconnect_failures(&self) -> u32 {
        self.reconnect_failures
    }

    /// Time since the last decoded update, if any arrived.
    #[must_use]
    pub fn last_seen_age(&self) -> Option<Duration> {
        self.state
            .as_ref()
            .map(|state| Instant::now().saturating_duration_since(state.last_seen()))
    }

    /// Returns whether the link is up and the latest update is fresh.
    #[must_use]
    pub fn data_healthy(&self) -> bool {
        self.connected
            && self
                .last_seen_age()
                .is_some_and(|age| age < self.stale_threshold)
    }

    pub(crate) fn set_phase(&mut self, phase: ConnectionPhase) {
        self.phase = phase;
        self.connected = phase == ConnectionPhase::Connected;
    }

    pub(crate) fn set_peripheral(&mut self, peripheral: FoundDevice) {
        self.peripheral = Some(peripheral);
    }

    pub(crate) fn set_reconnect_failures(&mut self, failures: u32) {
        self.reconnect_failures = failures;
    }

    pub(crate) fn state_mut(&mut self) -> &mut Option<DeviceState> {
        &mut self.state
    }

    pub(crate) fn record_update(&mut self) {
        self.update_count += 1;
    }
}
