use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::detect::Generation;
use crate::state::{
    DecodedUpdate, DlReport, EnhancedReadings, Gen2Status, LineData, Measurements,
};
use crate::utils::format_hex;

use super::command::{Command, CommandCode, Gen2CommandBuilder};
use super::{CodecError, ProtocolCodec, read_i32_be};

/// Start-of-packet marker.
pub const GEN2_MAGIC: [u8; 4] = [0x24, 0x7C, 0x27, 0x40];
/// End-of-packet marker.
pub const GEN2_TAIL: [u8; 2] = [0x71, 0x21];
/// Only protocol version spoken by current firmware.
pub const GEN2_PROTOCOL_VERSION: u8 = 0x01;
/// Magic, version, message id, command and u16 body length.
pub const GEN2_HEADER_LEN: usize = 9;
/// DLReport body length for single-line units.
pub const DL_REPORT_SINGLE_LEN: usize = 34;
/// DLReport body length for dual-line units.
pub const DL_REPORT_DUAL_LEN: usize = 68;

const OFFSET_VOLTAGE: usize = 0;
const OFFSET_CURRENT: usize = 4;
const OFFSET_POWER: usize = 8;
const OFFSET_ENERGY: usize = 12;
const OFFSET_OUTPUT_VOLTAGE: usize = 20;
const OFFSET_BACKLIGHT: usize = 24;
const OFFSET_NEUTRAL_DETECTION: usize = 25;
const OFFSET_BOOST: usize = 26;
const OFFSET_TEMPERATURE_F: usize = 27;
const OFFSET_FREQUENCY: usize = 28;
const OFFSET_ERROR: usize = 32;
const OFFSET_RELAY: usize = 33;
const RELAY_ON: u8 = 0x01;
const SCALE_ELECTRICAL: f64 = 10_000.0;
const SCALE_FREQUENCY: f64 = 100.0;

/// Framing problems that force a one-byte resynchronisation.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum FramerError {
    /// The byte after the magic is not a supported version.
    #[error("gen2 packet has unexpected protocol version 0x{version:02X}")]
    UnexpectedVersion { version: u8 },
    /// The two bytes after the declared body are not `71 21`.
    #[error("gen2 packet has bad tail {} (expected 71 21)", format_hex(actual))]
    BadTail { actual: [u8; 2] },
}

/// Errors returned when decoding a DLReport body.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ReportError {
    /// The body is neither a single nor a dual block.
    #[error(
        "dl report body is {actual} bytes; expected {single} or {dual}",
        single = DL_REPORT_SINGLE_LEN,
        dual = DL_REPORT_DUAL_LEN
    )]
    MalformedBody { actual: usize },
}

/// One complete Gen2 packet.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Gen2Packet {
    version: u8,
    msg_id: u8,
    command: u8,
    body: Vec<u8>,
}

impl Gen2Packet {
    /// Protocol version byte.
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Rolling message id.
    #[must_use]
    pub fn msg_id(&self) -> u8 {
        self.msg_id
    }

    /// Raw command byte.
    #[must_use]
    pub fn command(&self) -> u8 {
        self.command
    }

    /// Known command code, if the byte is recognised.
    #[must_use]
    pub fn command_code(&self) -> Option<CommandCode> {
        CommandCode::from_code(self.command)
    }

    /// Packet body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Reassembles magic/tail-delimited Gen2 packets from arbitrary chunks.
#[derive(Debug, Default)]
pub struct Gen2PacketFramer {
    buffer: Vec<u8>,
}

impl Gen2PacketFramer {
    /// Creates an empty framer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends received bytes to the internal buffer.
    pub fn append(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Attempts to extract the next packet from the buffer.
    ///
    /// Returns `None` once more input is needed. `Some(Err(..))` means a
    /// spurious magic was skipped by one byte; call again to keep scanning.
    ///
    /// ```
    /// use hughes::Gen2PacketFramer;
    ///
    /// let packet = [0x24, 0x7C, 0x27, 0x40, 0x01, 0x07, 0x03, 0x00, 0x00, 0x71, 0x21];
    /// let mut framer = Gen2PacketFramer::new();
    /// framer.append(&packet[..5]);
    /// assert!(framer.try_extract().is_none());
    ///
    /// framer.append(&packet[5..]);
    /// let extracted = framer.try_extract().expect("packet is complete")?;
    /// assert_eq!(0x07, extracted.msg_id());
    /// assert_eq!(0x03, extracted.command());
    /// assert!(framer.try_extract().is_none());
    /// # Ok::<(), hughes::FramerError>(())
    /// ```
    pub fn try_extract(&mut self) -> Option<Result<Gen2Packet, FramerError>> {
        let Some(start) = self
            .buffer
            .windows(GEN2_MAGIC.len())
            .position(|window| window == GEN2_MAGIC)
        else {
            let keep = GEN2_MAGIC.len() - 1;
            if self.buffer.len() > keep {
                self.buffer.drain(..self.buffer.len() - keep);
            }
            return None;
        };

        if start > 0 {
            debug!(discarded = start, "discarding bytes before gen2 magic");
            self.buffer.drain(..start);
        }

        if self.buffer.len() < GEN2_HEADER_LEN {
            return None;
        }

        let version = self.buffer[4];
        if version != GEN2_PROTOCOL_VERSION {
            self.buffer.drain(..1);
            return Some(Err(FramerError::UnexpectedVersion { version }));
        }

        let body_len = usize::from(u16::from_be_bytes([self.buffer[7], self.buffer[8]]));
        let tail_start = GEN2_HEADER_LEN + body_len;
        let total_len = tail_start + GEN2_TAIL.len();
        if self.buffer.len() < total_len {
            return None;
        }

        let tail = [self.buffer[tail_start], self.buffer[tail_start + 1]];
        if tail != GEN2_TAIL {
            self.buffer.drain(..1);
            return Some(Err(FramerError::BadTail { actual: tail }));
        }

        let packet = Gen2Packet {
            version,
            msg_id: self.buffer[5],
            command: self.buffer[6],
            body: self.buffer[GEN2_HEADER_LEN..tail_start].to_vec(),
        };
        self.buffer.drain(..total_len);
        Some(Ok(packet))
    }

    /// Extracts every complete packet, logging and skipping framing errors.
    pub fn drain_packets(&mut self) -> Vec<Gen2Packet> {
        let mut packets = Vec::new();
        while let Some(result) = self.try_extract() {
            match result {
                Ok(packet) => packets.push(packet),
                Err(error) => debug!(%error, "resynchronising gen2 framer"),
            }
        }
        packets
    }

    /// Number of bytes currently buffered.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Discards all buffered bytes.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// Decodes a DLReport body into one or two lines.
///
/// Enhanced-only readings are left empty unless `enhanced` is set, whatever the
/// raw bytes contain.
///
/// # Errors
///
/// Returns an error when the body is neither 34 nor 68 bytes long.
///
/// ```
/// use hughes::decode_dl_report;
///
/// let mut body = [0_u8; 34];
/// body[0..4].copy_from_slice(&1_210_000_i32.to_be_bytes());
/// body[33] = 0x01;
///
/// let report = decode_dl_report(&body, false)?;
/// assert_eq!(121.0, report.line1().voltage());
/// assert_eq!(Some(true), report.line1().relay_on());
/// assert!(report.line2().is_none());
/// # Ok::<(), hughes::ReportError>(())
/// ```
pub fn decode_dl_report(body: &[u8], enhanced: bool) -> Result<DlReport, ReportError> {
    let (line1, line2) = match body.len() {
        DL_REPORT_SINGLE_LEN => (decode_block(body, enhanced), None),
        DL_REPORT_DUAL_LEN => {
            let (first, second) = body.split_at(DL_REPORT_SINGLE_LEN);
            (
                decode_block(first, enhanced),
                Some(decode_block(second, enhanced)),
            )
        }
        actual => return Err(ReportError::MalformedBody { actual }),
    };

    Ok(DlReport {
        line1,
        line2,
        raw_body: body.to_vec(),
    })
}

fn decode_block(block: &[u8], enhanced: bool) -> LineData {
    let measurements = Measurements {
        voltage: f64::from(read_i32_be(block, OFFSET_VOLTAGE)) / SCALE_ELECTRICAL,
        current: f64::from(read_i32_be(block, OFFSET_CURRENT)) / SCALE_ELECTRICAL,
        power: f64::from(read_i32_be(block, OFFSET_POWER)) / SCALE_ELECTRICAL,
        energy: f64::from(read_i32_be(block, OFFSET_ENERGY)) / SCALE_ELECTRICAL,
        frequency: f64::from(read_i32_be(block, OFFSET_FREQUENCY)) / SCALE_FREQUENCY,
    };
    let status = Gen2Status {
        relay_on: block[OFFSET_RELAY] == RELAY_ON,
        neutral_detection_enabled: block[OFFSET_NEUTRAL_DETECTION] != 0,
        backlight_level: block[OFFSET_BACKLIGHT],
    };
    let enhanced = enhanced.then(|| EnhancedReadings {
        output_voltage: f64::from(read_i32_be(block, OFFSET_OUTPUT_VOLTAGE)) / SCALE_ELECTRICAL,
        boost_active: block[OFFSET_BOOST] != 0,
        temperature_f: f64::from(block[OFFSET_TEMPERATURE_F]),
    });

    LineData::gen2(measurements, block[OFFSET_ERROR], status, enhanced)
}

/// Gen2 codec: packet framing, DLReport decode and command encode.
#[derive(Debug, Default)]
pub struct Gen2Codec {
    framer: Gen2PacketFramer,
    commands: Gen2CommandBuilder,
    enhanced: bool,
}

impl Gen2Codec {
    /// Creates a codec for a unit with or without enhanced readings.
    #[must_use]
    pub fn new(enhanced: bool) -> Self {
        Self {
            enhanced,
            ..Self::default()
        }
    }

    fn handle_packet(&self, packet: &Gen2Packet) -> Option<DecodedUpdate> {
        match packet.command_code() {
            Some(CommandCode::DlReport) => match decode_dl_report(packet.body(), self.enhanced) {
                Ok(report) => Some(DecodedUpdate::Gen2(report)),
                Err(error) => {
                    debug!(%error, msg_id = packet.msg_id(), "discarding dl report");
                    None
                }
            },
            other => {
                debug!(
                    command = format_args!("0x{:02X}", packet.command()),
                    known = ?other,
                    msg_id = packet.msg_id(),
                    body = %format_hex(packet.body()),
                    "ignoring non-report gen2 packet"
                );
                None
            }
        }
    }
}

impl ProtocolCodec for Gen2Codec {
    fn generation(&self) -> Generation {
        Generation::Gen2
    }

    fn ingest(&mut self, chunk: &[u8], _now: Instant) -> Vec<DecodedUpdate> {
        trace!(chunk_len = chunk.len(), "gen2 chunk");
        self.framer.append(chunk);
        self.framer
            .drain_packets()
            .iter()
            .filter_map(|packet| self.handle_packet(packet))
            .collect()
    }

    fn encode(&mut self, command: &Command) -> Result<Vec<u8>, CodecError> {
        self.commands.encode(command)
    }

    fn reset(&mut self) {
        self.framer.reset();
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::codec::command::Backlight;

    fn packet(msg_id: u8, command: u8, body: &[u8]) -> Vec<u8> {
        let mut bytes = GEN2_MAGIC.to_vec();
        bytes.extend_from_slice(&[GEN2_PROTOCOL_VERSION, msg_id, command]);
        bytes.extend_from_slice(
            &u16::try_from(body.len())
                .expect("test body fits")
                .to_be_bytes(),
        );
        bytes.extend_from_slice(body);
        bytes.extend_from_slice(&GEN2_TAIL);
        bytes
    }

    fn block(voltage: i32, relay: u8) -> [u8; 34] {
        let mut block = [0_u8; 34];
        block[0..4].copy_from_slice(&voltage.to_be_bytes());
        block[4..8].copy_from_slice(&85_000_i32.to_be_bytes());
        block[8..12].copy_from_slice(&10_200_000_i32.to_be_bytes());
        block[12..16].copy_from_slice(&4_567_800_i32.to_be_bytes());
        block[20..24].copy_from_slice(&1_190_000_i32.to_be_bytes());
        block[OFFSET_BACKLIGHT] = 3;
        block[OFFSET_NEUTRAL_DETECTION] = 1;
        block[OFFSET_BOOST] = 1;
        block[OFFSET_TEMPERATURE_F] = 97;
        block[28..32].copy_from_slice(&6_001_i32.to_be_bytes());
        block[OFFSET_ERROR] = 7;
        block[OFFSET_RELAY] = relay;
        block
    }

    fn extract_all(framer: &mut Gen2PacketFramer) -> Vec<Gen2Packet> {
        framer.drain_packets()
    }

    #[test]
    fn framer_extracts_whole_packet() {
        let bytes = packet(4, 0x01, &[0xAA; 34]);
        let mut framer = Gen2PacketFramer::new();
        framer.append(&bytes);

        let packets = extract_all(&mut framer);
        assert_eq!(1, packets.len());
        assert_eq!(4, packets[0].msg_id());
        assert_eq!(Some(CommandCode::DlReport), packets[0].command_code());
        assert_eq!(&[0xAA; 34], packets[0].body());
        assert_eq!(0, framer.buffered_len());
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(7)]
    #[case(20)]
    fn framer_is_independent_of_chunk_boundaries(#[case] chunk_len: usize) {
        let bytes = packet(9, 0x01, &block(1_200_000, 1));

        let mut whole = Gen2PacketFramer::new();
        whole.append(&bytes);
        let expected = extract_all(&mut whole);

        let mut split = Gen2PacketFramer::new();
        let mut packets = Vec::new();
        for chunk in bytes.chunks(chunk_len) {
            split.append(chunk);
            packets.extend(extract_all(&mut split));
        }

        assert_eq!(1, packets.len());
        assert_eq!(expected, packets);
    }

    #[test]
    fn framer_skips_leading_garbage() {
        let mut bytes = vec![0x00, 0x24, 0x7C, 0x13, 0x99];
        bytes.extend(packet(2, 0x01, &[]));
        let mut framer = Gen2PacketFramer::new();
        framer.append(&bytes);

        let packets = extract_all(&mut framer);
        assert_eq!(1, packets.len());
        assert_eq!(2, packets[0].msg_id());
    }

    #[test]
    fn framer_resynchronises_after_bad_tail() {
        let mut corrupt = packet(1, 0x01, &[0x10, 0x20]);
        let tail_index = corrupt.len() - 1;
        corrupt[tail_index] = 0x00;
        let mut bytes = corrupt;
        bytes.extend(packet(2, 0x01, &[0x30]));

        let mut framer = Gen2PacketFramer::new();
        framer.append(&bytes);

        assert_matches!(
            framer.try_extract(),
            Some(Err(FramerError::BadTail {
                actual: [0x71, 0x00]
            }))
        );
        let packet = framer
            .try_extract()
            .expect("next packet is buffered")
            .expect("next packet is valid");
        assert_eq!(2, packet.msg_id());
        assert_eq!(&[0x30], packet.body());
        assert_eq!(None, framer.try_extract());
    }

    #[test]
    fn framer_resynchronises_after_unexpected_version() {
        let mut bytes = GEN2_MAGIC.to_vec();
        bytes.extend_from_slice(&[0x02, 0, 0, 0, 0]);
        bytes.extend(packet(5, 0x01, &[]));

        let mut framer = Gen2PacketFramer::new();
        framer.append(&bytes);
        assert_matches!(
            framer.try_extract(),
            Some(Err(FramerError::UnexpectedVersion { version: 0x02 }))
        );
        let packets = extract_all(&mut framer);
        assert_eq!(1, packets.len());
        assert_eq!(5, packets[0].msg_id());
    }

    #[test]
    fn framer_keeps_possible_partial_magic() {
        let mut framer = Gen2PacketFramer::new();
        framer.append(&[0x00, 0x11, 0x22, 0x24, 0x7C, 0x27]);
        assert_eq!(None, framer.try_extract());
        assert_eq!(3, framer.buffered_len());

        let bytes = packet(6, 0x02, &[0x01]);
        framer.append(&bytes[3..]);
        let packets = extract_all(&mut framer);
        assert_eq!(1, packets.len());
        assert_eq!(6, packets[0].msg_id());
    }

    #[test]
    fn framer_waits_for_incomplete_body() {
        let bytes = packet(1, 0x01, &[0xAB; 34]);
        let mut framer = Gen2PacketFramer::new();
        framer.append(&bytes[..20]);
        assert_eq!(None, framer.try_extract());
        assert_eq!(20, framer.buffered_len());
    }

    #[test]
    fn framer_extracts_back_to_back_packets() {
        let mut bytes = packet(1, 0x01, &[]);
        bytes.extend(packet(2, 0x02, &[0x09]));
        let mut framer = Gen2PacketFramer::new();
        framer.append(&bytes);

        let ids: Vec<u8> = extract_all(&mut framer)
            .iter()
            .map(Gen2Packet::msg_id)
            .collect();
        assert_eq!(vec![1, 2], ids);
    }

    #[test]
    fn dl_report_decodes_single_block() {
        let report = decode_dl_report(&block(1_212_345, 1), false).expect("valid body");
        let line = report.line1();
        assert_eq!(121.2345, line.voltage());
        assert_eq!(8.5, line.current());
        assert_eq!(1020.0, line.power());
        assert_eq!(456.78, line.energy());
        assert_eq!(60.01, line.frequency());
        assert_eq!(7, line.error_code());
        assert_eq!("Missing Ground", line.error_text());
        assert_eq!(Some(true), line.relay_on());
        assert_eq!(Some(true), line.neutral_detection_enabled());
        assert_eq!(Some(3), line.backlight_level());
        assert_eq!(None, report.line2());
    }

    #[test]
    fn dl_report_decodes_dual_block() {
        let mut body = block(1_200_000, 1).to_vec();
        body.extend_from_slice(&block(1_180_000, 2));

        let report = decode_dl_report(&body, false).expect("valid body");
        let line2 = report.line2().expect("dual body carries line 2");
        assert_eq!(118.0, line2.voltage());
        assert_eq!(Some(false), line2.relay_on());
    }

    #[rstest]
    #[case(1, Some(true))]
    #[case(2, Some(false))]
    #[case(0, Some(false))]
    #[case(9, Some(false))]
    fn dl_report_relay_is_on_only_for_one(#[case] raw: u8, #[case] expected: Option<bool>) {
        let report = decode_dl_report(&block(0, raw), false).expect("valid body");
        assert_eq!(expected, report.line1().relay_on());
    }

    #[test]
    fn dl_report_hides_enhanced_fields_on_standard_units() {
        let report = decode_dl_report(&block(1_200_000, 1), false).expect("valid body");
        assert_eq!(None, report.line1().output_voltage());
        assert_eq!(None, report.line1().boost_active());
        assert_eq!(None, report.line1().temperature_f());
    }

    #[test]
    fn dl_report_exposes_enhanced_fields() {
        let report = decode_dl_report(&block(1_200_000, 1), true).expect("valid body");
        assert_eq!(Some(119.0), report.line1().output_voltage());
        assert_eq!(Some(true), report.line1().boost_active());
        assert_eq!(Some(97.0), report.line1().temperature_f());
    }

    #[rstest]
    #[case(0)]
    #[case(33)]
    #[case(35)]
    #[case(67)]
    #[case(102)]
    fn dl_report_rejects_other_lengths(#[case] len: usize) {
        assert_matches!(
            decode_dl_report(&vec![0; len], false),
            Err(ReportError::MalformedBody { actual }) if actual == len
        );
    }

    #[test]
    fn codec_ignores_non_report_packets() {
        let mut codec = Gen2Codec::new(false);
        let mut bytes = packet(1, 0x02, &[0x04]);
        bytes.extend(packet(2, 0x01, &[0x00; 10]));
        bytes.extend(packet(3, 0x01, &block(1_200_000, 1)));

        let updates = codec.ingest(&bytes, Instant::now());
        assert_eq!(1, updates.len());
        assert_matches!(&updates[0], DecodedUpdate::Gen2(report) if report.line1().voltage() == 120.0);
    }

    #[test]
    fn encoded_command_frames_back_to_same_code_and_body() {
        let mut codec = Gen2Codec::new(false);
        let backlight = Backlight::new(2).expect("valid level");
        let bytes = codec
            .encode(&Command::SetBacklight(backlight))
            .expect("command should encode");

        let mut framer = Gen2PacketFramer::new();
        framer.append(&bytes);
        let packets = extract_all(&mut framer);
        assert_eq!(1, packets.len());
        assert_eq!(Some(CommandCode::SetBacklight), packets[0].command_code());
        assert_eq!(&[2], packets[0].body());
    }

    #[test]
    fn codec_reset_drops_partial_packet() {
        let bytes = packet(1, 0x01, &block(1_200_000, 1));
        let mut codec = Gen2Codec::new(false);
        assert!(codec.ingest(&bytes[..10], Instant::now()).is_empty());
        codec.reset();
        assert!(codec.ingest(&bytes[10..], Instant::now()).is_empty());
    }
}
