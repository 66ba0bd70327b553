use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::detect::Generation;
use crate::state::{DecodedUpdate, LineData, Measurements};
use crate::utils::format_hex;

use super::{ProtocolCodec, read_i32_be};

/// Size of one Gen1 notification chunk.
pub const GEN1_CHUNK_LEN: usize = 20;
/// Size of one assembled Gen1 frame.
pub const GEN1_FRAME_LEN: usize = 40;
/// Leading bytes of every valid Gen1 frame.
pub const GEN1_FRAME_HEADER: [u8; 3] = [0x01, 0x03, 0x20];
/// Age after which a pending first chunk is discarded.
pub const GEN1_CHUNK_TIMEOUT: Duration = Duration::from_secs(1);

const OFFSET_VOLTAGE: usize = 3;
const OFFSET_CURRENT: usize = 7;
const OFFSET_POWER: usize = 11;
const OFFSET_ENERGY: usize = 15;
const OFFSET_ERROR: usize = 19;
const OFFSET_FREQUENCY: usize = 31;
const OFFSET_LINE_MARKER: usize = 37;
const LINE_MARKER_LEN: usize = 3;
const SCALE_ELECTRICAL: f64 = 10_000.0;
const SCALE_FREQUENCY: f64 = 100.0;

/// Errors returned when assembling or decoding Gen1 frames.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum AssemblerError {
    /// The frame is shorter than the fixed 40-byte layout.
    #[error(
        "gen1 frame is too short: expected {expected} bytes, got {actual}",
        expected = GEN1_FRAME_LEN
    )]
    FrameTooShort { actual: usize },
    /// The frame does not start with `01 03 20`.
    #[error("gen1 frame header mismatch: got {}", format_hex(actual))]
    BadHeader { actual: [u8; 3] },
}

/// Decodes one assembled 40-byte Gen1 frame.
///
/// # Errors
///
/// Returns an error when the frame is shorter than 40 bytes or carries a header
/// other than `01 03 20`.
///
/// ```
/// use hughes::{DecodedUpdate, decode_gen1_frame};
///
/// let mut frame = [0_u8; 40];
/// frame[..3].copy_from_slice(&[0x01, 0x03, 0x20]);
/// frame[3..7].copy_from_slice(&1_200_000_i32.to_be_bytes());
/// frame[31..35].copy_from_slice(&6_000_i32.to_be_bytes());
///
/// let DecodedUpdate::Gen1 { line, is_line2 } = decode_gen1_frame(&frame)? else {
///     unreachable!("gen1 frames always decode into gen1 updates");
/// };
/// assert_eq!(120.0, line.voltage());
/// assert_eq!(60.0, line.frequency());
/// assert!(!is_line2);
/// # Ok::<(), hughes::AssemblerError>(())
/// ```
pub fn decode_gen1_frame(frame: &[u8]) -> Result<DecodedUpdate, AssemblerError> {
    if frame.len() < GEN1_FRAME_LEN {
        return Err(AssemblerError::FrameTooShort {
            actual: frame.len(),
        });
    }

    let header = [frame[0], frame[1], frame[2]];
    if header != GEN1_FRAME_HEADER {
        return Err(AssemblerError::BadHeader { actual: header });
    }

    let measurements = Measurements {
        voltage: f64::from(read_i32_be(frame, OFFSET_VOLTAGE)) / SCALE_ELECTRICAL,
        current: f64::from(read_i32_be(frame, OFFSET_CURRENT)) / SCALE_ELECTRICAL,
        power: f64::from(read_i32_be(frame, OFFSET_POWER)) / SCALE_ELECTRICAL,
        energy: f64::from(read_i32_be(frame, OFFSET_ENERGY)) / SCALE_ELECTRICAL,
        frequency: f64::from(read_i32_be(frame, OFFSET_FREQUENCY)) / SCALE_FREQUENCY,
    };
    let is_line2 = frame[OFFSET_LINE_MARKER..OFFSET_LINE_MARKER + LINE_MARKER_LEN]
        .iter()
        .any(|byte| *byte != 0);

    Ok(DecodedUpdate::Gen1 {
        line: LineData::gen1(measurements, frame[OFFSET_ERROR]),
        is_line2,
    })
}

/// Pairs consecutive 20-byte Gen1 notifications into 40-byte frames.
#[derive(Debug, Default)]
pub struct Gen1FrameAssembler {
    pending: Option<(Vec<u8>, Instant)>,
}

impl Gen1FrameAssembler {
    /// Creates an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one notification chunk received at `now`.
    ///
    /// Returns `Ok(None)` while waiting for the second half of a frame. A
    /// completed candidate always clears the pending slot, so a bad frame never
    /// poisons the next pair.
    ///
    /// # Errors
    ///
    /// Returns an error when a completed candidate frame fails validation.
    ///
    /// ```
    /// use hughes::Gen1FrameAssembler;
    /// use tokio::time::Instant;
    ///
    /// let mut frame = [0_u8; 40];
    /// frame[..3].copy_from_slice(&[0x01, 0x03, 0x20]);
    ///
    /// let mut assembler = Gen1FrameAssembler::new();
    /// let now = Instant::now();
    /// assert!(assembler.feed(&frame[..20], now)?.is_none());
    /// assert!(assembler.feed(&frame[20..], now)?.is_some());
    /// # Ok::<(), hughes::AssemblerError>(())
    /// ```
    pub fn feed(
        &mut self,
        chunk: &[u8],
        now: Instant,
    ) -> Result<Option<DecodedUpdate>, AssemblerError> {
        if chunk.len() != GEN1_CHUNK_LEN {
            debug!(
                chunk_len = chunk.len(),
                expected = GEN1_CHUNK_LEN,
                "unexpected gen1 chunk size, storing as first half"
            );
            self.pending = Some((chunk.to_vec(), now));
            return Ok(None);
        }

        let Some((first, received_at)) = self.pending.take() else {
            trace!("stored first gen1 chunk");
            self.pending = Some((chunk.to_vec(), now));
            return Ok(None);
        };

        let age = now.saturating_duration_since(received_at);
        if age > GEN1_CHUNK_TIMEOUT {
            debug!(
                age_ms = age.as_millis(),
                "pending gen1 chunk expired, storing current chunk as first half"
            );
            self.pending = Some((chunk.to_vec(), now));
            return Ok(None);
        }

        let mut frame = first;
        frame.extend_from_slice(chunk);
        decode_gen1_frame(&frame).map(Some)
    }

    /// Discards any pending first half.
    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// Returns whether a first half is waiting for its pair.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Gen1 codec: decode only.
#[derive(Debug, Default)]
pub struct Gen1Codec {
    assembler: Gen1FrameAssembler,
}

impl ProtocolCodec for Gen1Codec {
    fn generation(&self) -> Generation {
        Generation::Gen1
    }

    fn ingest(&mut self, chunk: &[u8], now: Instant) -> Vec<DecodedUpdate> {
        match self.assembler.feed(chunk, now) {
            Ok(update) => update.into_iter().collect(),
            Err(error) => {
                debug!(%error, "discarding gen1 frame");
                Vec::new()
            }
        }
    }

    fn reset(&mut self) {
        self.assembler.reset();
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn frame(voltage: i32, current: i32, power: i32, energy: i32, frequency: i32) -> [u8; 40] {
        let mut frame = [0_u8; 40];
        frame[..3].copy_from_slice(&GEN1_FRAME_HEADER);
        frame[3..7].copy_from_slice(&voltage.to_be_bytes());
        frame[7..11].copy_from_slice(&current.to_be_bytes());
        frame[11..15].copy_from_slice(&power.to_be_bytes());
        frame[15..19].copy_from_slice(&energy.to_be_bytes());
        frame[31..35].copy_from_slice(&frequency.to_be_bytes());
        frame
    }

    fn standard_frame() -> [u8; 40] {
        frame(1_205_000, 152_500, 18_376_250, 1_234_500, 5_998)
    }

    #[test]
    fn decode_scales_all_measurements() {
        let mut raw = standard_frame();
        raw[OFFSET_ERROR] = 8;

        let decoded = decode_gen1_frame(&raw).expect("valid frame should decode");
        let DecodedUpdate::Gen1 { line, is_line2 } = decoded else {
            panic!("gen1 frames decode into gen1 updates");
        };
        assert_eq!(120.5, line.voltage());
        assert_eq!(15.25, line.current());
        assert_eq!(1837.625, line.power());
        assert_eq!(123.45, line.energy());
        assert_eq!(59.98, line.frequency());
        assert_eq!(8, line.error_code());
        assert_eq!("Lost Ground", line.error_text());
        assert!(!is_line2);
    }

    #[rstest]
    #[case([0, 0, 0], false)]
    #[case([0, 0, 1], true)]
    #[case([0xFF, 0, 0], true)]
    fn decode_reads_line_marker(#[case] marker: [u8; 3], #[case] expected: bool) {
        let mut raw = standard_frame();
        raw[37..40].copy_from_slice(&marker);
        assert_matches!(
            decode_gen1_frame(&raw),
            Ok(DecodedUpdate::Gen1 { is_line2, .. }) if is_line2 == expected
        );
    }

    #[test]
    fn decode_rejects_bad_header() {
        let mut raw = standard_frame();
        raw[2] = 0x21;
        assert_matches!(
            decode_gen1_frame(&raw),
            Err(AssemblerError::BadHeader {
                actual: [0x01, 0x03, 0x21]
            })
        );
    }

    #[test]
    fn decode_rejects_short_frame() {
        assert_matches!(
            decode_gen1_frame(&[0x01, 0x03, 0x20]),
            Err(AssemblerError::FrameTooShort { actual: 3 })
        );
    }

    #[test]
    fn decode_handles_negative_values() {
        let raw = frame(-10_000, 0, 0, 0, 0);
        assert_matches!(
            decode_gen1_frame(&raw),
            Ok(DecodedUpdate::Gen1 { line, .. }) if line.voltage() == -1.0
        );
    }

    #[test]
    fn assembler_pairs_two_chunks() {
        let raw = standard_frame();
        let now = Instant::now();
        let mut assembler = Gen1FrameAssembler::new();

        assert_eq!(None, assembler.feed(&raw[..20], now).expect("first half"));
        assert!(assembler.has_pending());
        let decoded = assembler
            .feed(&raw[20..], now + Duration::from_millis(50))
            .expect("valid pair should decode");
        assert!(decoded.is_some());
        assert!(!assembler.has_pending());
    }

    #[test]
    fn assembler_bad_pair_then_valid_pair_yields_only_valid() {
        let mut bad = standard_frame();
        bad[0] = 0x00;
        let good = standard_frame();
        let now = Instant::now();
        let mut assembler = Gen1FrameAssembler::new();

        assembler.feed(&bad[..20], now).expect("first half");
        assert_matches!(
            assembler.feed(&bad[20..], now),
            Err(AssemblerError::BadHeader { .. })
        );
        assert!(!assembler.has_pending());

        assert_eq!(None, assembler.feed(&good[..20], now).expect("first half"));
        assert_matches!(assembler.feed(&good[20..], now), Ok(Some(_)));
    }

    #[test]
    fn assembler_expires_stale_first_half() {
        let raw = standard_frame();
        let start = Instant::now();
        let mut assembler = Gen1FrameAssembler::new();

        assembler.feed(&raw[..20], start).expect("first half");
        let later = start + GEN1_CHUNK_TIMEOUT + Duration::from_millis(1);
        assert_eq!(
            None,
            assembler.feed(&raw[..20], later).expect("stale pair is dropped")
        );
        assert_matches!(
            assembler.feed(&raw[20..], later + Duration::from_millis(10)),
            Ok(Some(DecodedUpdate::Gen1 { .. }))
        );
    }

    #[test]
    fn assembler_accepts_pair_exactly_at_timeout() {
        let raw = standard_frame();
        let start = Instant::now();
        let mut assembler = Gen1FrameAssembler::new();

        assembler.feed(&raw[..20], start).expect("first half");
        assert_matches!(
            assembler.feed(&raw[20..], start + GEN1_CHUNK_TIMEOUT),
            Ok(Some(_))
        );
    }

    #[test]
    fn assembler_stores_odd_sized_chunk_as_first_half() {
        let now = Instant::now();
        let mut assembler = Gen1FrameAssembler::new();

        assert_eq!(None, assembler.feed(&[0x01; 7], now).expect("odd chunk"));
        assert!(assembler.has_pending());
        assert_matches!(
            assembler.feed(&[0x00; 20], now),
            Err(AssemblerError::FrameTooShort { actual: 27 })
        );
    }

    #[test]
    fn codec_swallows_protocol_errors() {
        let mut bad = standard_frame();
        bad[1] = 0x00;
        let now = Instant::now();
        let mut codec = Gen1Codec::default();

        assert_eq!(Vec::<DecodedUpdate>::new(), codec.ingest(&bad[..20], now));
        assert_eq!(Vec::<DecodedUpdate>::new(), codec.ingest(&bad[20..], now));

        let good = standard_frame();
        codec.ingest(&good[..20], now);
        assert_eq!(1, codec.ingest(&good[20..], now).len());
    }

    #[test]
    fn codec_reset_drops_pending_half() {
        let raw = standard_frame();
        let now = Instant::now();
        let mut codec = Gen1Codec::default();

        codec.ingest(&raw[..20], now);
        codec.reset();
        assert!(codec.ingest(&raw[20..], now).is_empty());
    }
}
