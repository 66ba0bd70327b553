use serde::Serialize;
use serde_with::{hex::Hex, serde_as};
use tokio::time::Instant;

use crate::codec::error_text;
use crate::detect::{DeviceModel, Generation};

/// Scaled electrical readings shared by both generations.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct Measurements {
    pub(crate) voltage: f64,
    pub(crate) current: f64,
    pub(crate) power: f64,
    pub(crate) energy: f64,
    pub(crate) frequency: f64,
}

/// Gen2-only status bytes reported by every Gen2 unit.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct Gen2Status {
    pub(crate) relay_on: bool,
    pub(crate) neutral_detection_enabled: bool,
    pub(crate) backlight_level: u8,
}

/// Readings only meaningful on enhanced Gen2 models.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct EnhancedReadings {
    pub(crate) output_voltage: f64,
    pub(crate) boost_active: bool,
    pub(crate) temperature_f: f64,
}

/// Latest reading for one electrical line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineData {
    voltage: f64,
    current: f64,
    power: f64,
    energy: f64,
    frequency: f64,
    error_code: u8,
    error_text: String,
    relay_on: Option<bool>,
    neutral_detection_enabled: Option<bool>,
    backlight_level: Option<u8>,
    output_voltage: Option<f64>,
    boost_active: Option<bool>,
    temperature_f: Option<f64>,
}

impl LineData {
    pub(crate) fn gen1(measurements: Measurements, error_code: u8) -> Self {
        Self::base(Generation::Gen1, measurements, error_code)
    }

    pub(crate) fn gen2(
        measurements: Measurements,
        error_code: u8,
        status: Gen2Status,
        enhanced: Option<EnhancedReadings>,
    ) -> Self {
        Self {
            relay_on: Some(status.relay_on),
            neutral_detection_enabled: Some(status.neutral_detection_enabled),
            backlight_level: Some(status.backlight_level),
            output_voltage: enhanced.map(|readings| round_to(readings.output_voltage, 4)),
            boost_active: enhanced.map(|readings| readings.boost_active),
            temperature_f: enhanced.map(|readings| readings.temperature_f),
            ..Self::base(Generation::Gen2, measurements, error_code)
        }
    }

    fn base(generation: Generation, measurements: Measurements, error_code: u8) -> Self {
        Self {
            voltage: round_to(measurements.voltage, 4),
            current: round_to(measurements.current, 4),
            power: round_to(measurements.power, 4),
            energy: round_to(measurements.energy, 4),
            frequency: round_to(measurements.frequency, 2),
            error_code,
            error_text: error_text(generation, error_code),
            relay_on: None,
            neutral_detection_enabled: None,
            backlight_level: None,
            output_voltage: None,
            boost_active: None,
            temperature_f: None,
        }
    }

    /// Line voltage in volts.
    #[must_use]
    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    /// Line current in amperes.
    #[must_use]
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Line power in watts.
    #[must_use]
    pub fn power(&self) -> f64 {
        self.power
    }

    /// Cumulative energy in kilowatt-hours.
    #[must_use]
    pub fn energy(&self) -> f64 {
        self.energy
    }

    /// Line frequency in hertz.
    #[must_use]
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Raw device error code.
    #[must_use]
    pub fn error_code(&self) -> u8 {
        self.error_code
    }

    /// Error text resolved through the generation's table.
    #[must_use]
    pub fn error_text(&self) -> &str {
        &self.error_text
    }

    /// Relay state (Gen2 only).
    #[must_use]
    pub fn relay_on(&self) -> Option<bool> {
        self.relay_on
    }

    /// Whether neutral detection is enabled (Gen2 only).
    #[must_use]
    pub fn neutral_detection_enabled(&self) -> Option<bool> {
        self.neutral_detection_enabled
    }

    /// Display backlight level `0..=5` (Gen2 only).
    #[must_use]
    pub fn backlight_level(&self) -> Option<u8> {
        self.backlight_level
    }

    /// Output voltage in volts (enhanced Gen2 only).
    #[must_use]
    pub fn output_voltage(&self) -> Option<f64> {
        self.output_voltage
    }

    /// Whether voltage boost is active (enhanced Gen2 only).
    #[must_use]
    pub fn boost_active(&self) -> Option<bool> {
        self.boost_active
    }

    /// Unit temperature in degrees Fahrenheit (enhanced Gen2 only).
    #[must_use]
    pub fn temperature_f(&self) -> Option<f64> {
        self.temperature_f
    }
}

/// One decoded DLReport: one or two lines plus the raw body.
#[derive(Debug, Clone, PartialEq)]
pub struct DlReport {
    pub(crate) line1: LineData,
    pub(crate) line2: Option<LineData>,
    pub(crate) raw_body: Vec<u8>,
}

impl DlReport {
    /// Line 1 reading.
    #[must_use]
    pub fn line1(&self) -> &LineData {
        &self.line1
    }

    /// Line 2 reading, present only on dual-line units.
    #[must_use]
    pub fn line2(&self) -> Option<&LineData> {
        self.line2.as_ref()
    }
}

/// One successfully decoded telemetry update.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedUpdate {
    /// A Gen1 frame carries exactly one line.
    Gen1 {
        /// Decoded reading.
        line: LineData,
        /// Whether the frame's marker bytes designate line 2.
        is_line2: bool,
    },
    /// A Gen2 DLReport carries all lines at once.
    Gen2(DlReport),
}

/// Latest telemetry snapshot for one device.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    generation: Generation,
    is_enhanced: bool,
    is_dual_line: bool,
    line1: LineData,
    line2: Option<LineData>,
    #[serde(skip)]
    last_seen: Instant,
    #[serde_as(as = "Option<Hex>")]
    raw_report: Option<Vec<u8>>,
}

impl DeviceState {
    /// Creates state from the first decoded update of a device.
    pub(crate) fn from_first_update(
        model: &DeviceModel,
        update: DecodedUpdate,
        now: Instant,
    ) -> Self {
        let generation = model.generation();
        let mut state = Self {
            generation,
            is_enhanced: generation == Generation::Gen2 && model.is_enhanced(),
            is_dual_line: false,
            line1: LineData::base(generation, Measurements::default(), 0),
            line2: None,
            last_seen: now,
            raw_report: None,
        };
        state.apply(update, now);
        state
    }

    /// Merges a decoded update and refreshes `last_seen`.
    pub(crate) fn apply(&mut self, update: DecodedUpdate, now: Instant) {
        match update {
            DecodedUpdate::Gen1 { line, is_line2 } => {
                if is_line2 {
                    self.is_dual_line = true;
                    self.line2 = Some(line);
                } else {
                    self.line1 = line;
                }
            }
            DecodedUpdate::Gen2(report) => {
                self.is_dual_line = report.line2.is_some();
                self.line1 = report.line1;
                self.line2 = report.line2;
                self.raw_report = Some(report.raw_body);
            }
        }
        self.last_seen = self.last_seen.max(now);
    }

    /// Protocol generation of the device.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Whether enhanced-only readings are populated.
    #[must_use]
    pub fn is_enhanced(&self) -> bool {
        self.is_enhanced
    }

    /// Whether the unit reports two lines.
    #[must_use]
    pub fn is_dual_line(&self) -> bool {
        self.is_dual_line
    }

    /// Line 1 reading.
    #[must_use]
    pub fn line1(&self) -> &LineData {
        &self.line1
    }

    /// Line 2 reading; present iff [`Self::is_dual_line`].
    #[must_use]
    pub fn line2(&self) -> Option<&LineData> {
        self.line2.as_ref()
    }

    /// Monotonic time of the most recent successful decode.
    #[must_use]
    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    /// Raw body of the last Gen2 DLReport, kept for protocol debugging.
    #[must_use]
    pub fn raw_report(&self) -> Option<&[u8]> {
        self.raw_report.as_deref()
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
