use strum_macros::{Display, EnumIter};

use crate::detect::Generation;

/// Known Power Watchdog GATT endpoints.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, Display)]
pub enum EndpointId {
    /// Gen1 telemetry service.
    #[strum(to_string = "gen1_service")]
    Gen1Service,
    /// Gen1 characteristic that notifies 20-byte telemetry chunks.
    #[strum(to_string = "gen1_notify_characteristic")]
    Gen1NotifyCharacteristic,
    /// Gen1 write characteristic; present on hardware but unused.
    #[strum(to_string = "gen1_write_characteristic")]
    Gen1WriteCharacteristic,
    /// Gen2 service.
    #[strum(to_string = "gen2_service")]
    Gen2Service,
    /// Gen2 single read/write/notify characteristic.
    #[strum(to_string = "gen2_read_write_notify_characteristic")]
    Gen2ReadWriteNotifyCharacteristic,
}

/// Descriptive metadata for one protocol endpoint.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct EndpointMetadata {
    name: &'static str,
    uuid: &'static str,
}

impl EndpointMetadata {
    /// Human-readable endpoint name.
    pub(crate) fn name(self) -> &'static str {
        self.name
    }

    /// Endpoint UUID.
    pub(crate) fn uuid(self) -> &'static str {
        self.uuid
    }
}

/// Returns metadata for one endpoint.
pub(crate) fn endpoint_metadata(endpoint: EndpointId) -> EndpointMetadata {
    match endpoint {
        EndpointId::Gen1Service => EndpointMetadata {
            name: "Power Watchdog gen1 service",
            uuid: "0000ffe0-0000-1000-8000-00805f9b34fb",
        },
        EndpointId::Gen1NotifyCharacteristic => EndpointMetadata {
            name: "Power Watchdog gen1 telemetry notify",
            uuid: "0000ffe2-0000-1000-8000-00805f9b34fb",
        },
        EndpointId::Gen1WriteCharacteristic => EndpointMetadata {
            name: "Power Watchdog gen1 write",
            uuid: "0000fff5-0000-1000-8000-00805f9b34fb",
        },
        EndpointId::Gen2Service => EndpointMetadata {
            name: "Power Watchdog gen2 service",
            uuid: "000000ff-0000-1000-8000-00805f9b34fb",
        },
        EndpointId::Gen2ReadWriteNotifyCharacteristic => EndpointMetadata {
            name: "Power Watchdog gen2 read/write/notify",
            uuid: "0000ff01-0000-1000-8000-00805f9b34fb",
        },
    }
}

/// Service and characteristics used by one generation.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct GenerationEndpoints {
    /// Service that must be present before notifications are enabled.
    pub(crate) service: EndpointId,
    /// Characteristic delivering telemetry notifications.
    pub(crate) notify: EndpointId,
    /// Characteristic accepting host writes.
    pub(crate) write: EndpointId,
}

/// Returns the endpoints a generation talks through.
pub(crate) fn endpoints_for(generation: Generation) -> GenerationEndpoints {
    match generation {
        Generation::Gen1 => GenerationEndpoints {
            service: EndpointId::Gen1Service,
            notify: EndpointId::Gen1NotifyCharacteristic,
            write: EndpointId::Gen1WriteCharacteristic,
        },
        Generation::Gen2 => GenerationEndpoints {
            service: EndpointId::Gen2Service,
            notify: EndpointId::Gen2ReadWriteNotifyCharacteristic,
            write: EndpointId::Gen2ReadWriteNotifyCharacteristic,
        },
    }
}

/// ASCII command that switches a Gen2 unit into binary framing.
pub(crate) const GEN2_PROTOCOL_OPEN: &[u8] = b"!%!%,protocol,open,";
/// ASCII acknowledgement of [`GEN2_PROTOCOL_OPEN`].
pub(crate) const GEN2_PROTOCOL_OK: &[u8] = b"ok";

/// Returns whether a Gen2 notification is the `ok` handshake acknowledgement.
///
/// Surrounding whitespace and NUL padding are ignored.
pub(crate) fn is_gen2_open_ack(payload: &[u8]) -> bool {
    let is_padding = |byte: &u8| byte.is_ascii_whitespace() || *byte == 0;
    let start = payload
        .iter()
        .position(|byte| !is_padding(byte))
        .unwrap_or(payload.len());
    let end = payload
        .iter()
        .rposition(|byte| !is_padding(byte))
        .map_or(start, |index| index + 1);
    &payload[start..end] == GEN2_PROTOCOL_OK
}
