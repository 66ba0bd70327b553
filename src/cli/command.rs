use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::filter::LevelFilter;

use crate::cli::control::ControlArgs;
use crate::cli::decode::DecodeArgs;
use crate::cli::detect::DetectArgs;
use crate::cli::listen::ListenArgs;
use crate::config::DeviceConfig;
use crate::error::FixtureError;
use crate::hw::{FakeTransportConfig, HexPayload, NotificationPayloads};

/// Command-line options for the Power Watchdog BLE tool.
#[derive(Debug, Parser)]
#[command(
    name = "hughes",
    about = "Monitor and control Hughes Power Watchdog surge protectors over BLE."
)]
pub struct Args {
    /// Overrides `RUST_LOG` with a single level.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format; defaults to pretty on a terminal and JSON otherwise.
    #[arg(long, global = true, value_enum)]
    output_format: Option<OutputFormat>,
    /// Uses the scripted fake BLE backend instead of a real adapter.
    #[arg(long, global = true)]
    fake: bool,
    /// Fake notification chunks as comma-separated hexadecimal payloads.
    #[arg(long, global = true, requires = "fake")]
    fake_notifications: Option<NotificationPayloads>,
    /// Fake notification sent after every command write.
    #[arg(long, global = true, requires = "fake")]
    fake_command_reply: Option<HexPayload>,
    /// Number of fake connect attempts refused before one succeeds.
    #[arg(long, global = true, requires = "fake")]
    fake_connect_failures: Option<usize>,
    /// Leaves the fake Gen2 protocol-open write unacknowledged.
    #[arg(long, global = true, requires = "fake")]
    fake_no_ack: bool,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use hughes::{Args, Command, DetectArgs};
    ///
    /// let args = Args::new(Command::Detect(DetectArgs::new("WD_E8_0001")));
    /// let _ = args;
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            log_level: None,
            output_format: None,
            fake: false,
            fake_notifications: None,
            fake_command_reply: None,
            fake_connect_failures: None,
            fake_no_ack: false,
            command,
        }
    }

    /// Enables fake backend mode with pre-parsed fake configuration.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        let FakeArgs {
            notifications,
            command_reply,
            connect_failures,
            ack_handshake,
        } = fake;

        self.fake = true;
        self.fake_notifications = notifications;
        self.fake_command_reply = command_reply;
        self.fake_connect_failures = Some(connect_failures);
        self.fake_no_ack = !ack_handshake;
        self
    }

    /// Returns the explicit log-level override, if any.
    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    /// Returns the explicit output format, if any.
    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output_format
    }

    /// Splits parsed CLI arguments into command and optional fake-backend settings.
    #[must_use]
    pub fn into_command_and_fake_args(self) -> (Command, Option<FakeArgs>) {
        let Args {
            fake,
            fake_notifications,
            fake_command_reply,
            fake_connect_failures,
            fake_no_ack,
            command,
            ..
        } = self;

        let fake_args = fake.then(|| FakeArgs {
            notifications: fake_notifications,
            command_reply: fake_command_reply,
            connect_failures: fake_connect_failures.unwrap_or_default(),
            ack_handshake: !fake_no_ack,
        });

        (command, fake_args)
    }
}

/// Fake backend arguments for programmatic runs.
///
/// ```
/// use hughes::FakeArgs;
///
/// let fake = FakeArgs::builder()
///     .notifications("247C2740")?
///     .connect_failures(1)
///     .build();
/// let _ = fake;
/// # Ok::<(), hughes::FixtureError>(())
/// ```
#[derive(Debug, Clone, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    notifications: Option<NotificationPayloads>,
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    command_reply: Option<HexPayload>,
    #[builder(default)]
    connect_failures: usize,
    #[builder(default = true)]
    ack_handshake: bool,
}

impl FakeArgs {
    /// Builds a fake peripheral advertising the configured device identity.
    pub(crate) fn into_transport_config(self, device: &DeviceConfig) -> FakeTransportConfig {
        let Self {
            notifications,
            command_reply,
            connect_failures,
            ack_handshake,
        } = self;

        FakeTransportConfig::builder()
            .local_name(device.name())
            .maybe_address((!device.address().is_empty()).then(|| device.address().to_string()))
            .connect_failures(connect_failures)
            .notifications(notifications.map(Into::into).unwrap_or_default())
            .maybe_command_reply(command_reply.map(Into::into))
            .ack_handshake(ack_handshake)
            .build()
    }
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Classify an advertised device name into a protocol generation.
    Detect(DetectArgs),
    /// Strictly decode a captured Gen1 frame or Gen2 packet sequence.
    Decode(DecodeArgs),
    /// Connect, keep the link alive and print every published snapshot.
    Listen(ListenArgs),
    /// Connect, then send one Gen2 command.
    Control(ControlArgs),
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Detect(_args) => "detect",
            Self::Decode(_args) => "decode",
            Self::Listen(_args) => "listen",
            Self::Control(_args) => "control",
        }
    }
}

/// Log level accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Informational messages and above.
    Info,
    /// Debug messages and above.
    Debug,
    /// Everything.
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// Rendering used for command output.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Coloured tables for humans.
    Pretty,
    /// One JSON document per line.
    Json,
}

pub(crate) fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use clap::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn fake_fixture_flags_require_fake_mode() {
        let result =
            Args::try_parse_from(["hughes", "--fake-notifications", "DEADBEEF", "detect", "PMD30"]);

        let error = result.expect_err("fake payload flags should require --fake");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }

    #[test]
    fn fake_no_ack_requires_fake_mode() {
        let result = Args::try_parse_from(["hughes", "--fake-no-ack", "detect", "PMD30"]);

        let error = result.expect_err("--fake-no-ack should require --fake");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }

    #[test]
    fn invalid_fake_notifications_are_rejected() {
        let result = Args::try_parse_from([
            "hughes",
            "--fake",
            "--fake-notifications",
            "0x1",
            "detect",
            "PMD30",
        ]);

        let error = result.expect_err("invalid hex should fail argument parsing");
        assert_eq!(ErrorKind::ValueValidation, error.kind());
    }

    #[test]
    fn fake_mode_builds_fake_settings() {
        let cli = Args::try_parse_from([
            "hughes",
            "--fake",
            "--fake-notifications",
            "247C2740,0171",
            "--fake-connect-failures",
            "2",
            "--fake-no-ack",
            "listen",
            "--name",
            "WD_V6_01",
        ])
        .expect("valid fake arguments should parse");

        let (command, fake) = cli.into_command_and_fake_args();
        assert_matches!(command, Command::Listen(_));
        let device = DeviceConfig::builder().address("").name("WD_V6_01").build();
        let config = fake
            .expect("fake settings should be present")
            .into_transport_config(&device);
        assert_eq!("WD_V6_01", config.local_name());
        assert_eq!("FA:KE:00:00:00:01", config.address());
    }

    #[test]
    fn real_mode_has_no_fake_settings() {
        let cli = Args::try_parse_from(["hughes", "detect", "PMD30"])
            .expect("detect arguments should parse");

        let (_command, fake) = cli.into_command_and_fake_args();
        assert!(fake.is_none());
    }

    #[rstest]
    #[case("error", LevelFilter::ERROR)]
    #[case("warn", LevelFilter::WARN)]
    #[case("debug", LevelFilter::DEBUG)]
    #[case("trace", LevelFilter::TRACE)]
    fn log_level_maps_to_filter(#[case] raw: &str, #[case] expected: LevelFilter) {
        let cli = Args::try_parse_from(["hughes", "--log-level", raw, "detect", "PMD30"])
            .expect("log level should parse");

        assert_eq!(
            Some(expected),
            cli.log_level().map(LogLevel::as_level_filter)
        );
    }

    #[test]
    fn output_format_is_global() {
        let cli = Args::try_parse_from(["hughes", "detect", "PMD30", "--output-format", "json"])
            .expect("global flags should parse after the subcommand");

        assert_eq!(Some(OutputFormat::Json), cli.output_format());
    }

    #[test]
    fn fake_args_builder_parses_fixtures() {
        let fake = FakeArgs::builder()
            .notifications("01 03 20")
            .expect("fixture should parse")
            .command_reply("7121")
            .expect("fixture should parse")
            .build();
        let device = DeviceConfig::builder()
            .address("AA:BB")
            .name("PMD30")
            .build();

        let config = fake.into_transport_config(&device);
        assert_eq!("AA:BB", config.address());
    }

    #[rstest]
    #[case("250ms", Duration::from_millis(250))]
    #[case("2s", Duration::from_secs(2))]
    fn parse_duration_accepts_humantime(#[case] raw: &str, #[case] expected: Duration) {
        assert_eq!(Ok(expected), parse_duration(raw));
    }
}
