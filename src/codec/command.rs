use std::fmt;

use serde::Serialize;
use strum_macros::{Display, EnumIter};
use thiserror::Error;
use time::OffsetDateTime;

use super::CodecError;
use super::gen2::{GEN2_MAGIC, GEN2_PROTOCOL_VERSION, GEN2_TAIL};

const MIN_BACKLIGHT: u8 = 0;
const MAX_BACKLIGHT: u8 = 5;
const MSG_ID_MAX: u8 = 100;
const TIME_BASE_YEAR: i32 = 2000;
const RELAY_ON: u8 = 0x01;
const RELAY_OFF: u8 = 0x02;

/// Which side of the link originates a command code.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, Serialize)]
pub enum Direction {
    /// Sent by the device.
    #[strum(to_string = "device->host")]
    DeviceToHost,
    /// Sent by the host.
    #[strum(to_string = "host->device")]
    HostToDevice,
}

/// Known Gen2 command codes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumIter, Serialize)]
pub enum CommandCode {
    /// Periodic telemetry report.
    #[strum(to_string = "dl_report")]
    DlReport,
    /// Device error report.
    #[strum(to_string = "error_report")]
    ErrorReport,
    /// Reset the cumulative energy counter.
    #[strum(to_string = "energy_reset")]
    EnergyReset,
    /// Restart energy accounting.
    #[strum(to_string = "energy_restart")]
    EnergyRestart,
    /// Clear the stored error log.
    #[strum(to_string = "error_del")]
    ErrorDel,
    /// Set the device clock.
    #[strum(to_string = "set_time")]
    SetTime,
    /// Set display backlight level.
    #[strum(to_string = "set_backlight")]
    SetBacklight,
    /// Read the accounting start time.
    #[strum(to_string = "read_start_time")]
    ReadStartTime,
    /// Write initial calibration data.
    #[strum(to_string = "set_init_data")]
    SetInitData,
    /// Open or close the output relay.
    #[strum(to_string = "set_open")]
    SetOpen,
    /// Enable or disable neutral detection.
    #[strum(to_string = "neutral_detection")]
    NeutralDetection,
    /// Device alarm notification.
    #[strum(to_string = "alarm")]
    Alarm,
}

impl CommandCode {
    /// Returns the command byte used on the wire.
    ///
    /// ```
    /// use hughes::CommandCode;
    ///
    /// assert_eq!(0x01, CommandCode::DlReport.code());
    /// assert_eq!(0x0B, CommandCode::SetOpen.code());
    /// ```
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::DlReport => 0x01,
            Self::ErrorReport => 0x02,
            Self::EnergyReset => 0x03,
            Self::EnergyRestart => 0x04,
            Self::ErrorDel => 0x05,
            Self::SetTime => 0x06,
            Self::SetBacklight => 0x07,
            Self::ReadStartTime => 0x08,
            Self::SetInitData => 0x0A,
            Self::SetOpen => 0x0B,
            Self::NeutralDetection => 0x0D,
            Self::Alarm => 0x0E,
        }
    }

    /// Resolves a wire command byte.
    ///
    /// ```
    /// use hughes::CommandCode;
    ///
    /// assert_eq!(Some(CommandCode::SetTime), CommandCode::from_code(0x06));
    /// assert_eq!(None, CommandCode::from_code(0x09));
    /// ```
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::DlReport),
            0x02 => Some(Self::ErrorReport),
            0x03 => Some(Self::EnergyReset),
            0x04 => Some(Self::EnergyRestart),
            0x05 => Some(Self::ErrorDel),
            0x06 => Some(Self::SetTime),
            0x07 => Some(Self::SetBacklight),
            0x08 => Some(Self::ReadStartTime),
            0x0A => Some(Self::SetInitData),
            0x0B => Some(Self::SetOpen),
            0x0D => Some(Self::NeutralDetection),
            0x0E => Some(Self::Alarm),
            _ => None,
        }
    }

    /// Returns which side originates this command.
    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Self::DlReport | Self::ErrorReport | Self::Alarm => Direction::DeviceToHost,
            Self::EnergyReset
            | Self::EnergyRestart
            | Self::ErrorDel
            | Self::SetTime
            | Self::SetBacklight
            | Self::ReadStartTime
            | Self::SetInitData
            | Self::SetOpen
            | Self::NeutralDetection => Direction::HostToDevice,
        }
    }

    /// Returns the fixed body length, when the command has one.
    ///
    /// Device reports are variable-length and return `None`.
    ///
    /// ```
    /// use hughes::CommandCode;
    ///
    /// assert_eq!(Some(0), CommandCode::EnergyReset.body_len());
    /// assert_eq!(Some(6), CommandCode::SetTime.body_len());
    /// assert_eq!(None, CommandCode::DlReport.body_len());
    /// ```
    #[must_use]
    pub const fn body_len(self) -> Option<usize> {
        match self {
            Self::DlReport | Self::ErrorReport | Self::Alarm => None,
            Self::EnergyReset | Self::EnergyRestart | Self::ErrorDel | Self::ReadStartTime => {
                Some(0)
            }
            Self::SetBacklight | Self::SetOpen | Self::NeutralDetection => Some(1),
            Self::SetTime => Some(6),
            Self::SetInitData => Some(15),
        }
    }
}

/// Errors returned by backlight validation.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum BacklightError {
    /// The level was outside the accepted range.
    #[error("backlight level {value} is out of range ({min}..={max})")]
    OutOfRange { value: u8, min: u8, max: u8 },
}

/// Validated display backlight level in the inclusive range `0..=5`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct Backlight(u8);

impl Backlight {
    /// Creates a validated backlight level.
    ///
    /// # Errors
    ///
    /// Returns an error when `value` is outside `0..=5`.
    ///
    /// ```
    /// use hughes::Backlight;
    ///
    /// assert_eq!(3, Backlight::new(3)?.value());
    /// assert!(Backlight::new(6).is_err());
    /// # Ok::<(), hughes::BacklightError>(())
    /// ```
    pub fn new(value: u8) -> Result<Self, BacklightError> {
        if !(MIN_BACKLIGHT..=MAX_BACKLIGHT).contains(&value) {
            return Err(BacklightError::OutOfRange {
                value,
                min: MIN_BACKLIGHT,
                max: MAX_BACKLIGHT,
            });
        }

        Ok(Self(value))
    }

    /// Returns the underlying level.
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

/// Host-to-device commands supported by Gen2 units.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Command {
    /// Switch the output relay.
    SetRelay(bool),
    /// Set the display backlight.
    SetBacklight(Backlight),
    /// Toggle neutral detection.
    SetNeutralDetection(bool),
    /// Reset the cumulative energy counter.
    ResetEnergy,
    /// Set the device clock to a UTC timestamp.
    SyncTime(OffsetDateTime),
}

impl Command {
    /// Returns the wire command code.
    #[must_use]
    pub fn code(&self) -> CommandCode {
        match self {
            Self::SetRelay(_) => CommandCode::SetOpen,
            Self::SetBacklight(_) => CommandCode::SetBacklight,
            Self::SetNeutralDetection(_) => CommandCode::NeutralDetection,
            Self::ResetEnergy => CommandCode::EnergyReset,
            Self::SyncTime(_) => CommandCode::SetTime,
        }
    }

    fn body(&self) -> Result<Vec<u8>, CodecError> {
        let body = match self {
            Self::SetRelay(on) => vec![if *on { RELAY_ON } else { RELAY_OFF }],
            Self::SetBacklight(level) => vec![level.value()],
            Self::SetNeutralDetection(enabled) => vec![u8::from(*enabled)],
            Self::ResetEnergy => Vec::new(),
            Self::SyncTime(timestamp) => time_body(*timestamp)?.to_vec(),
        };
        Ok(body)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetRelay(on) => write!(f, "relay {}", on_off(*on)),
            Self::SetBacklight(level) => write!(f, "backlight {}", level.value()),
            Self::SetNeutralDetection(enabled) => {
                write!(f, "neutral-detection {}", on_off(*enabled))
            }
            Self::ResetEnergy => f.write_str("reset-energy"),
            Self::SyncTime(timestamp) => write!(f, "sync-time {}", timestamp.unix_timestamp()),
        }
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

fn time_body(timestamp: OffsetDateTime) -> Result<[u8; 6], CodecError> {
    let utc = timestamp.to_offset(time::UtcOffset::UTC);
    let year = u8::try_from(utc.year() - TIME_BASE_YEAR)
        .map_err(|_overflow| CodecError::TimeOutOfRange { year: utc.year() })?;

    Ok([
        year,
        u8::from(utc.month()),
        utc.day(),
        utc.hour(),
        utc.minute(),
        utc.second(),
    ])
}

/// Builds framed Gen2 command packets with a rolling message id.
#[derive(Debug, Default)]
pub struct Gen2CommandBuilder {
    last_msg_id: u8,
}

impl Gen2CommandBuilder {
    /// Creates a builder whose first packet carries message id `1`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_msg_id(&mut self) -> u8 {
        self.last_msg_id = (self.last_msg_id % MSG_ID_MAX) + 1;
        self.last_msg_id
    }

    /// Frames a raw command body.
    ///
    /// # Errors
    ///
    /// Returns an error when `body` does not match the fixed length of a
    /// command that has one, or is too long for the 16-bit length field.
    ///
    /// ```
    /// use hughes::{CommandCode, Gen2CommandBuilder};
    ///
    /// let mut builder = Gen2CommandBuilder::new();
    /// let packet = builder.build(CommandCode::SetOpen, &[0x01])?;
    /// assert_eq!(
    ///     vec![0x24, 0x7C, 0x27, 0x40, 0x01, 0x01, 0x0B, 0x00, 0x01, 0x01, 0x71, 0x21],
    ///     packet
    /// );
    /// # Ok::<(), hughes::CodecError>(())
    /// ```
    pub fn build(&mut self, command: CommandCode, body: &[u8]) -> Result<Vec<u8>, CodecError> {
        if let Some(expected) = command.body_len()
            && expected != body.len()
        {
            return Err(CodecError::BodyLengthMismatch {
                command,
                expected,
                actual: body.len(),
            });
        }
        let body_len = u16::try_from(body.len())
            .map_err(|_overflow| CodecError::BodyTooLarge { actual: body.len() })?;

        let mut packet = Vec::with_capacity(GEN2_MAGIC.len() + 5 + body.len() + GEN2_TAIL.len());
        packet.extend_from_slice(&GEN2_MAGIC);
        packet.push(GEN2_PROTOCOL_VERSION);
        packet.push(self.next_msg_id());
        packet.push(command.code());
        packet.extend_from_slice(&body_len.to_be_bytes());
        packet.extend_from_slice(body);
        packet.extend_from_slice(&GEN2_TAIL);
        Ok(packet)
    }

    /// Encodes a typed command.
    ///
    /// # Errors
    ///
    /// Returns an error when a time sync timestamp falls outside the years the
    /// device clock can represent (`2000..=2255`).
    pub fn encode(&mut self, command: &Command) -> Result<Vec<u8>, CodecError> {
        let body = command.body()?;
        self.build(command.code(), &body)
    }
}
