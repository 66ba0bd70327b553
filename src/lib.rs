mod app;
mod cli;
mod codec;
mod config;
mod coordinator;
mod detect;
mod error;
mod hw;
mod protocol;
mod state;
mod telemetry;
mod terminal;
mod utils;

pub use app::{run, run_with_clients_and_log_level, run_with_log_level};
pub use cli::{
    Args, BacklightArgs, Command, ConnectArgs, ControlAction, ControlArgs, DecodeArgs,
    DetectArgs, FakeArgs, ListenArgs, LogLevel, OutputFormat, SyncTimeArgs, Toggle, ToggleArgs,
};
pub use codec::{
    AssemblerError, Backlight, BacklightError, CodecError, Command as DeviceCommand, CommandCode,
    DL_REPORT_DUAL_LEN, DL_REPORT_SINGLE_LEN, Direction, FramerError, GEN1_CHUNK_LEN,
    GEN1_CHUNK_TIMEOUT, GEN1_FRAME_HEADER, GEN1_FRAME_LEN, GEN2_HEADER_LEN, GEN2_MAGIC,
    GEN2_PROTOCOL_VERSION, GEN2_TAIL, Gen1Codec, Gen1FrameAssembler, Gen2Codec,
    Gen2CommandBuilder, Gen2Packet, Gen2PacketFramer, ProtocolCodec, ReportError, codec_for,
    decode_capture, decode_dl_report, decode_gen1_frame, error_text,
};
pub use config::{CoordinatorConfig, DeviceConfig};
pub use coordinator::{CommandOutcome, ConnectionPhase, Coordinator, Snapshot};
pub use detect::{DeviceModel, Generation, ModelDetector};
pub use error::{CommandError, ConnectError, FixtureError, InteractionError, ProtocolError};
pub use hw::{
    BtleplugTransport, CharacteristicInfo, FakeController, FakeTransport, FakeTransportConfig,
    FoundDevice, LinkEvent, LinkEventStream, ServiceInfo, Transport, TransportSession,
};
pub use protocol::EndpointId;
pub use state::{DecodedUpdate, DeviceState, DlReport, LineData};
pub use terminal::TerminalClient;
