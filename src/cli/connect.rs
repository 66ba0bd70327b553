use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio_stream::StreamExt;
use tracing::{info, instrument};

use crate::cli::command::{FakeArgs, parse_duration};
use crate::config::{CoordinatorConfig, DeviceConfig};
use crate::coordinator::Coordinator;
use crate::hw::{TransportBackend, transport_from_backend};

/// Device identity and link options shared by connecting commands.
#[derive(Debug, Clone, Args)]
pub struct ConnectArgs {
    /// BLE address of the device; omit to use the first advertised Power Watchdog.
    #[arg(long)]
    address: Option<String>,
    /// Advertised name, used to pick the protocol generation (e.g. `WD_E8_0001`, `PMD30`).
    #[arg(long)]
    name: String,
    /// Display-unit preference forwarded in every snapshot.
    #[arg(long)]
    display_unit: Option<String>,
    /// How long to scan for the device on each connect attempt (e.g. `30s`).
    #[arg(long, value_parser = parse_duration)]
    scan_timeout: Option<Duration>,
    /// Age of the last decoded update after which the link is forced to reconnect.
    #[arg(long, value_parser = parse_duration)]
    stale_threshold: Option<Duration>,
}

impl ConnectArgs {
    /// Creates connect arguments for a device name.
    ///
    /// ```
    /// use hughes::ConnectArgs;
    ///
    /// let args = ConnectArgs::new("WD_E8_0001").with_address("AA:BB:CC:DD:EE:FF");
    /// let _ = args;
    /// ```
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            address: None,
            name: name.into(),
            display_unit: None,
            scan_timeout: None,
            stale_threshold: None,
        }
    }

    /// Sets an explicit BLE address.
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub(crate) fn device_config(&self) -> DeviceConfig {
        DeviceConfig::builder()
            .address(self.address.clone().unwrap_or_default())
            .name(self.name.clone())
            .maybe_display_unit(self.display_unit.clone())
            .build()
    }

    pub(crate) fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig::builder()
            .maybe_scan_timeout(self.scan_timeout)
            .maybe_stale_threshold(self.stale_threshold)
            .build()
    }
}

/// Builds the selected transport and spawns a coordinator for the device.
#[instrument(skip_all, level = "info", fields(name = %args.name, fake = fake.is_some()))]
pub(crate) async fn spawn_coordinator(
    args: &ConnectArgs,
    fake: Option<FakeArgs>,
) -> Result<Coordinator> {
    let device = args.device_config();
    let config = args.coordinator_config();
    let backend = match fake {
        Some(fake) => TransportBackend::Fake(fake.into_transport_config(&device)),
        None => TransportBackend::Real,
    };
    let transport = transport_from_backend(backend, &config)
        .await
        .context("failed to initialise the BLE backend")?;

    info!(generation = %device.model().generation(), "starting coordinator");
    Ok(Coordinator::spawn(transport, device, config))
}

/// Waits until the coordinator reports a live connection.
///
/// Returns `false` when the coordinator is torn down first.
pub(crate) async fn wait_until_connected(coordinator: &Coordinator) -> bool {
    let mut updates = coordinator.updates();
    while let Some(snapshot) = updates.next().await {
        if snapshot.is_connected() {
            return true;
        }
    }
    false
}
