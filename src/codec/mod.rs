mod command;
mod error_codes;
mod gen1;
mod gen2;

use thiserror::Error;
use tokio::time::Instant;

use crate::detect::{DeviceModel, Generation};
use crate::error::ProtocolError;
use crate::state::DecodedUpdate;

pub use self::command::{
    Backlight, BacklightError, Command, CommandCode, Direction, Gen2CommandBuilder,
};
pub use self::error_codes::error_text;
pub use self::gen1::{
    AssemblerError, GEN1_CHUNK_LEN, GEN1_CHUNK_TIMEOUT, GEN1_FRAME_HEADER, GEN1_FRAME_LEN,
    Gen1Codec, Gen1FrameAssembler, decode_gen1_frame,
};
pub use self::gen2::{
    DL_REPORT_DUAL_LEN, DL_REPORT_SINGLE_LEN, FramerError, GEN2_HEADER_LEN, GEN2_MAGIC,
    GEN2_PROTOCOL_VERSION, GEN2_TAIL, Gen2Codec, Gen2Packet, Gen2PacketFramer, ReportError,
    decode_dl_report,
};

/// Errors returned when encoding outgoing commands.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum CodecError {
    /// The generation has no command channel.
    #[error("{generation} devices do not accept commands")]
    Unsupported { generation: Generation },
    /// The body does not match the command's fixed length.
    #[error("{command} expects a {expected}-byte body, got {actual}")]
    BodyLengthMismatch {
        command: CommandCode,
        expected: usize,
        actual: usize,
    },
    /// The body does not fit the 16-bit length field.
    #[error("command body of {actual} bytes does not fit a 16-bit length")]
    BodyTooLarge { actual: usize },
    /// The device clock cannot represent the requested year.
    #[error("year {year} cannot be encoded; supported years are 2000..=2255")]
    TimeOutOfRange { year: i32 },
}

/// One generation's wire protocol behind a common interface.
///
/// Implementations are owned by a single task; every method runs
/// synchronously.
pub trait ProtocolCodec: Send + std::fmt::Debug {
    /// Generation this codec speaks.
    fn generation(&self) -> Generation;

    /// Feeds one notification chunk and returns every update it completes.
    ///
    /// Malformed frames are logged and dropped; they never surface as errors.
    fn ingest(&mut self, chunk: &[u8], now: Instant) -> Vec<DecodedUpdate>;

    /// Encodes an outgoing command.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Unsupported`] unless the generation has a command
    /// channel, or an encoding error for invalid command values.
    fn encode(&mut self, _command: &Command) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::Unsupported {
            generation: self.generation(),
        })
    }

    /// Drops any partially reassembled input.
    fn reset(&mut self);
}

/// Returns the codec matching a detected model.
///
/// ```
/// use hughes::{Generation, ModelDetector, codec_for};
///
/// let codec = codec_for(&ModelDetector::detect("WD_V9_01"));
/// assert_eq!(Generation::Gen2, codec.generation());
/// ```
#[must_use]
pub fn codec_for(model: &DeviceModel) -> Box<dyn ProtocolCodec> {
    match model.generation() {
        Generation::Gen1 => Box::new(Gen1Codec::default()),
        Generation::Gen2 => Box::new(Gen2Codec::new(model.is_enhanced())),
    }
}

/// Strictly decodes a captured byte sequence for offline protocol debugging.
///
/// Gen1 captures must hold one 40-byte frame. Gen2 captures may hold any
/// number of back-to-back packets; non-report packets are skipped. Unlike
/// [`ProtocolCodec::ingest`], every framing or decode problem is returned.
///
/// # Errors
///
/// Returns the first assembler, framer or report error encountered, or
/// [`ProtocolError::TrailingBytes`] when a Gen2 capture ends mid-packet.
///
/// ```
/// use hughes::{Generation, decode_capture};
///
/// let packet = [0x24, 0x7C, 0x27, 0x40, 0x01, 0x01, 0x02, 0x00, 0x00, 0x71, 0x21];
/// let updates = decode_capture(Generation::Gen2, false, &packet)?;
/// assert!(updates.is_empty());
/// # Ok::<(), hughes::ProtocolError>(())
/// ```
pub fn decode_capture(
    generation: Generation,
    enhanced: bool,
    bytes: &[u8],
) -> Result<Vec<DecodedUpdate>, ProtocolError> {
    match generation {
        Generation::Gen1 => Ok(vec![decode_gen1_frame(bytes)?]),
        Generation::Gen2 => {
            let mut framer = Gen2PacketFramer::new();
            framer.append(bytes);

            let mut updates = Vec::new();
            while let Some(packet) = framer.try_extract() {
                let packet = packet?;
                if packet.command_code() == Some(CommandCode::DlReport) {
                    updates.push(DecodedUpdate::Gen2(decode_dl_report(
                        packet.body(),
                        enhanced,
                    )?));
                }
            }

            match framer.buffered_len() {
                0 => Ok(updates),
                remaining => Err(ProtocolError::TrailingBytes { remaining }),
            }
        }
    }
}

/// Reads a big-endian `i32`; callers validate `bytes` covers `offset..offset + 4`.
fn read_i32_be(bytes: &[u8], offset: usize) -> i32 {
    i32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
