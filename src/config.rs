use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::detect::{DeviceModel, ModelDetector};

/// Identity of the device a coordinator manages.
///
/// `name` drives generation detection; `display_unit` is carried through to
/// every snapshot untouched.
///
/// ```
/// let device = hughes::DeviceConfig::builder()
///     .address("AA:BB:CC:DD:EE:FF")
///     .name("WD_E8_0001")
///     .display_unit("imperial")
///     .build();
/// assert!(device.model().is_enhanced());
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Builder, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[builder(into)]
    address: String,
    #[builder(into)]
    name: String,
    #[builder(into)]
    display_unit: Option<String>,
}

impl DeviceConfig {
    /// Returns the configured BLE address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the configured advertised name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the display-unit preference, if any.
    #[must_use]
    pub fn display_unit(&self) -> Option<&str> {
        self.display_unit.as_deref()
    }

    /// Classifies the configured name.
    #[must_use]
    pub fn model(&self) -> DeviceModel {
        ModelDetector::detect(&self.name)
    }
}

/// Timing knobs for the connection coordinator.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Builder)]
pub struct CoordinatorConfig {
    #[builder(default = Duration::from_secs(5))]
    backoff_base: Duration,
    #[builder(default = 2)]
    backoff_multiplier: u32,
    #[builder(default = Duration::from_secs(120))]
    backoff_cap: Duration,
    #[builder(default = Duration::from_secs(60))]
    watchdog_interval: Duration,
    #[builder(default = Duration::from_secs(300))]
    stale_threshold: Duration,
    #[builder(default = Duration::from_millis(200))]
    gen1_settle: Duration,
    #[builder(default = Duration::from_millis(100))]
    operation_delay: Duration,
    #[builder(default = Duration::from_secs(3))]
    handshake_timeout: Duration,
    #[builder(default = Duration::from_millis(200))]
    gen2_settle: Duration,
    #[builder(default = 80)]
    requested_mtu: u16,
    #[builder(default = Duration::from_secs(5))]
    command_timeout: Duration,
    #[builder(default = Duration::from_secs(30))]
    scan_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CoordinatorConfig {
    /// First reconnect delay.
    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    /// Growth factor applied per failed reconnect cycle.
    #[must_use]
    pub fn backoff_multiplier(&self) -> u32 {
        self.backoff_multiplier
    }

    /// Upper bound on any reconnect delay.
    #[must_use]
    pub fn backoff_cap(&self) -> Duration {
        self.backoff_cap
    }

    /// How often the staleness check runs while connected.
    #[must_use]
    pub fn watchdog_interval(&self) -> Duration {
        self.watchdog_interval
    }

    /// Maximum time without a decoded update before a forced reconnect.
    #[must_use]
    pub fn stale_threshold(&self) -> Duration {
        self.stale_threshold
    }

    /// Delay after connecting before Gen1 discovery.
    #[must_use]
    pub fn gen1_settle(&self) -> Duration {
        self.gen1_settle
    }

    /// Delay before enabling notifications.
    #[must_use]
    pub fn operation_delay(&self) -> Duration {
        self.operation_delay
    }

    /// How long to wait for the Gen2 `ok` acknowledgement.
    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Delay after the Gen2 handshake before entering the connected phase.
    #[must_use]
    pub fn gen2_settle(&self) -> Duration {
        self.gen2_settle
    }

    /// ATT MTU requested from Gen2 devices.
    #[must_use]
    pub fn requested_mtu(&self) -> u16 {
        self.requested_mtu
    }

    /// How long a command waits for a confirming update.
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// How long the BLE backend scans for the device on each attempt.
    #[must_use]
    pub fn scan_timeout(&self) -> Duration {
        self.scan_timeout
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_match_device_timing() {
        let config = CoordinatorConfig::default();
        assert_eq!(Duration::from_secs(5), config.backoff_base());
        assert_eq!(2, config.backoff_multiplier());
        assert_eq!(Duration::from_secs(120), config.backoff_cap());
        assert_eq!(Duration::from_secs(60), config.watchdog_interval());
        assert_eq!(Duration::from_secs(300), config.stale_threshold());
        assert_eq!(Duration::from_secs(3), config.handshake_timeout());
        assert_eq!(80, config.requested_mtu());
    }

    #[test]
    fn device_config_round_trips_through_json() {
        let device = DeviceConfig::builder()
            .address("AA:BB")
            .name("PMD30")
            .build();
        let json = serde_json::to_string(&device).expect("config should serialize");
        assert_eq!(
            r#"{"address":"AA:BB","name":"PMD30","display_unit":null}"#,
            json
        );
        let parsed: DeviceConfig = serde_json::from_str(&json).expect("config should parse");
        assert_eq!(device, parsed);
    }
}
