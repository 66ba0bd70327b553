use std::pin::Pin;

use serde::Serialize;
use tokio_stream::Stream;

/// The Power Watchdog peripheral a session is attached to.
///
/// Captured once per connection; `address` is the adapter-reported address,
/// which may differ from the configured one when discovery picked the device.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct FoundDevice {
    adapter: String,
    address: String,
    local_name: Option<String>,
    rssi: Option<i16>,
}

impl FoundDevice {
    pub(crate) fn new(
        adapter: String,
        address: String,
        local_name: Option<String>,
        rssi: Option<i16>,
    ) -> Self {
        Self {
            adapter,
            address,
            local_name,
            rssi,
        }
    }

    /// Adapter the link runs through (e.g. `hci0`).
    #[must_use]
    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Advertised name at connect time; some adapters drop it.
    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    /// Signal strength seen during discovery, in dBm.
    #[must_use]
    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }
}

/// What the coordinator needs to know about one GATT characteristic.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct CharacteristicInfo {
    uuid: String,
    notify: bool,
    write: bool,
}

impl CharacteristicInfo {
    pub(crate) fn new(uuid: impl Into<String>, notify: bool, write: bool) -> Self {
        Self {
            uuid: uuid.into().to_ascii_lowercase(),
            notify,
            write,
        }
    }

    /// Lowercase characteristic UUID.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Whether the characteristic can notify or indicate.
    #[must_use]
    pub fn can_notify(&self) -> bool {
        self.notify
    }

    /// Whether the characteristic accepts writes, with or without response.
    #[must_use]
    pub fn can_write(&self) -> bool {
        self.write
    }
}

/// A discovered GATT service and its characteristics.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ServiceInfo {
    uuid: String,
    characteristics: Vec<CharacteristicInfo>,
}

impl ServiceInfo {
    pub(crate) fn new(uuid: impl Into<String>, characteristics: Vec<CharacteristicInfo>) -> Self {
        Self {
            uuid: uuid.into().to_ascii_lowercase(),
            characteristics,
        }
    }

    /// Lowercase service UUID.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    #[must_use]
    pub fn characteristics(&self) -> &[CharacteristicInfo] {
        &self.characteristics
    }

    /// Looks up a characteristic by UUID, ignoring case.
    #[must_use]
    pub fn characteristic(&self, uuid: &str) -> Option<&CharacteristicInfo> {
        self.characteristics
            .iter()
            .find(|characteristic| characteristic.uuid.eq_ignore_ascii_case(uuid))
    }
}

/// Finds a service by UUID, ignoring case.
pub(crate) fn find_service<'a>(services: &'a [ServiceInfo], uuid: &str) -> Option<&'a ServiceInfo> {
    services
        .iter()
        .find(|service| service.uuid.eq_ignore_ascii_case(uuid))
}

/// Events delivered by a subscribed link.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum LinkEvent {
    /// Raw notification payload from the subscribed characteristic.
    Notification(Vec<u8>),
    /// The peripheral dropped the connection.
    Disconnected,
}

/// Stream of link events; ends when the backend stops delivering them.
pub type LinkEventStream = Pin<Box<dyn Stream<Item = LinkEvent> + Send>>;

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn lookups_ignore_uuid_case() {
        let services = vec![ServiceInfo::new(
            "000000FF-0000-1000-8000-00805F9B34FB",
            vec![CharacteristicInfo::new("0000FF01-0000-1000-8000-00805F9B34FB", true, true)],
        )];

        let service = find_service(&services, "000000ff-0000-1000-8000-00805f9b34fb")
            .expect("service is found");
        let characteristic = service
            .characteristic("0000ff01-0000-1000-8000-00805f9b34fb")
            .expect("characteristic is found");
        assert_eq!("0000ff01-0000-1000-8000-00805f9b34fb", characteristic.uuid());
        assert!(characteristic.can_notify());
    }

    #[test]
    fn unknown_characteristic_is_absent() {
        let service = ServiceInfo::new("0000ffe0-0000-1000-8000-00805f9b34fb", Vec::new());
        assert_eq!(None, service.characteristic("0000ffe1-0000-1000-8000-00805f9b34fb"));
    }
}
