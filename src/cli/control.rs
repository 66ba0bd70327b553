use std::io;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand, ValueEnum};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::time::timeout;
use tracing::instrument;

use crate::cli::command::{FakeArgs, parse_duration};
use crate::cli::connect::{ConnectArgs, spawn_coordinator, wait_until_connected};
use crate::cli::ui::Painter;
use crate::cli::{OutputFormat, write_json_line};
use crate::codec::Backlight;
use crate::coordinator::{CommandOutcome, Coordinator};
use crate::detect::Generation;

/// JSON result emitted by a `control` action.
#[derive(Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ControlResult {
    Relay {
        state: Toggle,
        outcome: CommandOutcome,
    },
    Backlight {
        level: u8,
        outcome: CommandOutcome,
    },
    NeutralDetection {
        state: Toggle,
        outcome: CommandOutcome,
    },
    ResetEnergy {
        outcome: CommandOutcome,
    },
    SyncTime {
        unix_timestamp: i64,
        outcome: CommandOutcome,
    },
}

/// Arguments for the `control` command.
#[derive(Debug, Args)]
pub struct ControlArgs {
    #[command(flatten)]
    connect: ConnectArgs,
    /// How long to wait for the first successful connection (e.g. `45s`).
    #[arg(long, value_parser = parse_duration, default_value = "60s")]
    connect_timeout: Duration,
    #[command(subcommand)]
    action: ControlAction,
}

impl ControlArgs {
    /// Creates control arguments for one action.
    ///
    /// ```
    /// use hughes::{ConnectArgs, ControlAction, ControlArgs, Toggle, ToggleArgs};
    ///
    /// let args = ControlArgs::new(
    ///     ConnectArgs::new("WD_V6_01"),
    ///     ControlAction::Relay(ToggleArgs::new(Toggle::Off)),
    /// );
    /// let _ = args;
    /// ```
    #[must_use]
    pub fn new(connect: ConnectArgs, action: ControlAction) -> Self {
        Self {
            connect,
            connect_timeout: Duration::from_secs(60),
            action,
        }
    }
}

/// Command sent by `control`.
#[derive(Debug, Subcommand)]
pub enum ControlAction {
    /// Switch the relay on or off.
    Relay(ToggleArgs),
    /// Set the display backlight level (0..=5).
    Backlight(BacklightArgs),
    /// Enable or disable neutral detection.
    NeutralDetection(ToggleArgs),
    /// Reset the cumulative energy counter.
    ResetEnergy,
    /// Set the device clock; sent as UTC.
    SyncTime(SyncTimeArgs),
}

/// On/off switch argument.
#[derive(Debug, Args)]
pub struct ToggleArgs {
    #[arg(value_enum)]
    state: Toggle,
}

impl ToggleArgs {
    /// Creates a toggle argument.
    #[must_use]
    pub fn new(state: Toggle) -> Self {
        Self { state }
    }
}

/// Requested switch position.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, ValueEnum, Serialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Toggle {
    /// Switch off.
    Off,
    /// Switch on.
    On,
}

impl Toggle {
    fn is_on(self) -> bool {
        self == Self::On
    }
}

/// Arguments for `control backlight`.
#[derive(Debug, Args)]
pub struct BacklightArgs {
    #[arg(value_parser = parse_backlight)]
    level: u8,
}

/// Arguments for `control sync-time`.
#[derive(Debug, Args)]
pub struct SyncTimeArgs {
    /// Unix timestamp to send; defaults to the current time.
    #[arg(long)]
    unix: Option<i64>,
}

impl SyncTimeArgs {
    /// Creates sync-time arguments with an optional fixed timestamp.
    #[must_use]
    pub fn new(unix: Option<i64>) -> Self {
        Self { unix }
    }

    fn resolve_timestamp(&self) -> Result<OffsetDateTime> {
        match self.unix {
            Some(unix) => OffsetDateTime::from_unix_timestamp(unix)
                .with_context(|| format!("invalid unix timestamp {unix}")),
            None => Ok(OffsetDateTime::now_utc()),
        }
    }
}

fn parse_backlight(value: &str) -> Result<u8, String> {
    let parsed = value.parse::<u8>().map_err(|error| error.to_string())?;
    Backlight::new(parsed)
        .map(Backlight::value)
        .map_err(|error| error.to_string())
}

/// Executes the `control` command.
#[instrument(skip_all, level = "info", fields(action = ?args.action, ?output_format))]
pub(crate) async fn run<W>(
    args: &ControlArgs,
    fake: Option<FakeArgs>,
    out: &mut W,
    painter: &Painter,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let coordinator = spawn_coordinator(&args.connect, fake).await?;
    let result = run_with_coordinator(&coordinator, args, out, painter, output_format).await;
    coordinator.shutdown().await;
    result
}

async fn run_with_coordinator<W>(
    coordinator: &Coordinator,
    args: &ControlArgs,
    out: &mut W,
    painter: &Painter,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    // Gen1 has no command channel; the coordinator rejects without a link.
    if coordinator.snapshot().model().generation() == Generation::Gen2 {
        match timeout(args.connect_timeout, wait_until_connected(coordinator)).await {
            Ok(true) => {}
            Ok(false) => bail!("coordinator stopped before connecting"),
            Err(_elapsed) => bail!(
                "not connected after {}",
                humantime::format_duration(args.connect_timeout)
            ),
        }
    }

    let (summary, result) = match &args.action {
        ControlAction::Relay(toggle) => {
            let outcome = coordinator.set_relay(toggle.state.is_on()).await?;
            (
                format!("Relay {}", toggle.state),
                ControlResult::Relay {
                    state: toggle.state,
                    outcome,
                },
            )
        }
        ControlAction::Backlight(backlight) => {
            let outcome = coordinator.set_backlight(backlight.level).await?;
            (
                format!("Backlight {}", backlight.level),
                ControlResult::Backlight {
                    level: backlight.level,
                    outcome,
                },
            )
        }
        ControlAction::NeutralDetection(toggle) => {
            let outcome = coordinator
                .set_neutral_detection(toggle.state.is_on())
                .await?;
            (
                format!("Neutral detection {}", toggle.state),
                ControlResult::NeutralDetection {
                    state: toggle.state,
                    outcome,
                },
            )
        }
        ControlAction::ResetEnergy => {
            let outcome = coordinator.reset_energy().await?;
            (
                "Energy reset".to_string(),
                ControlResult::ResetEnergy { outcome },
            )
        }
        ControlAction::SyncTime(sync_time) => {
            let timestamp = sync_time.resolve_timestamp()?;
            let outcome = coordinator.sync_time(timestamp).await?;
            (
                format!("Synced time (UTC unix {})", timestamp.unix_timestamp()),
                ControlResult::SyncTime {
                    unix_timestamp: timestamp.unix_timestamp(),
                    outcome,
                },
            )
        }
    };

    match output_format {
        OutputFormat::Pretty => {
            let outcome = match result.outcome() {
                CommandOutcome::Confirmed => painter.success(result.outcome().to_string()),
                CommandOutcome::Unconfirmed => painter.warning(result.outcome().to_string()),
            };
            writeln!(out, "{}: {outcome}", painter.value(summary))?;
        }
        OutputFormat::Json => write_json_line(out, &result)?,
    }

    Ok(())
}

impl ControlResult {
    fn outcome(&self) -> CommandOutcome {
        match self {
            Self::Relay { outcome, .. }
            | Self::Backlight { outcome, .. }
            | Self::NeutralDetection { outcome, .. }
            | Self::ResetEnergy { outcome }
            | Self::SyncTime { outcome, .. } => *outcome,
        }
    }
}
