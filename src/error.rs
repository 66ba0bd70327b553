use derive_more::From;
use thiserror::Error;

use crate::codec::{AssemblerError, BacklightError, CodecError, FramerError, ReportError};
use crate::detect::Generation;
use crate::protocol::{EndpointId, endpoint_metadata};

/// Errors returned by BLE interaction operations.
#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("BLE operation failed")]
    Ble(#[from] btleplug::Error),
    #[error("no BLE adapters were found")]
    NoAdapters,
    #[error("no Power Watchdog matching `{target}` was found within {timeout}")]
    DeviceNotFound { target: String, timeout: String },
    #[error("fake device `{address}` refused the connection")]
    FakeConnectRefused { address: String },
    #[error(
        "required endpoint `{name}` ({uuid}) was not found on the connected device",
        name = endpoint_metadata(*endpoint).name(),
        uuid = endpoint_metadata(*endpoint).uuid()
    )]
    MissingEndpoint { endpoint: EndpointId },
    #[error("the link to the device is closed")]
    LinkClosed,
    #[error("failed while waiting for Ctrl+C")]
    CtrlC { source: std::io::Error },
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}

/// Errors returned when parsing fake interaction fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("hex payload length must be even")]
    InvalidHexLength,
    #[error("hex payload contains invalid byte `{value}`")]
    InvalidHexByte { value: String },
}

/// Reasons a single connection attempt failed.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Transport(#[from] InteractionError),
    #[error(
        "connected device does not expose the {generation} service {uuid}",
        uuid = endpoint_metadata(*service).uuid()
    )]
    ServiceMismatch {
        generation: Generation,
        service: EndpointId,
    },
    #[error("connected device name `{name}` does not look like a {generation} Power Watchdog")]
    NameMismatch { generation: Generation, name: String },
}

/// Errors returned by the coordinator command API.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("the device is not connected")]
    NotConnected,
    #[error("{generation} devices do not accept commands")]
    Unsupported { generation: Generation },
    #[error("the coordinator has been torn down")]
    TornDown,
    #[error(transparent)]
    InvalidBacklight(#[from] BacklightError),
    #[error("failed to encode command")]
    Encode(#[source] CodecError),
    #[error("failed to write command to the device")]
    Write(#[source] InteractionError),
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Top-level protocol errors wrapping module-specific error types.
#[derive(Debug, Error, From)]
pub enum ProtocolError {
    #[error(transparent)]
    #[from(AssemblerError, Box<AssemblerError>)]
    Assembler(Box<AssemblerError>),
    #[error(transparent)]
    #[from(FramerError, Box<FramerError>)]
    Framer(Box<FramerError>),
    #[error(transparent)]
    #[from(ReportError, Box<ReportError>)]
    Report(Box<ReportError>),
    #[error(transparent)]
    #[from(CodecError, Box<CodecError>)]
    Codec(Box<CodecError>),
    #[error(transparent)]
    #[from(FixtureError, Box<FixtureError>)]
    Fixture(Box<FixtureError>),
    #[error("capture ended with {remaining} unframed byte(s)")]
    #[from(skip)]
    TrailingBytes { remaining: usize },
}
