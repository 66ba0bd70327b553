use std::io;

use anyhow::Result;
use tracing::instrument;

use crate::cli::ui::Painter;
use crate::cli::{Command, FakeArgs, LogLevel, OutputFormat};
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

const SERVICE_NAME: &str = "hughes";

/// Runs a CLI command against the real process terminal.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = hughes::Args::try_parse_from(["hughes", "detect", "WD_E8_0001"])?;
/// let (command, maybe_fake_args) = args.into_command_and_fake_args();
/// let mut out = Vec::new();
/// hughes::run(command, &mut out, maybe_fake_args).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails,
/// decoding fails, or output writing fails.
pub async fn run<W>(command: Command, out: &mut W, fake: Option<FakeArgs>) -> Result<()>
where
    W: io::Write,
{
    run_with_log_level(command, out, fake, None, None).await
}

/// Runs a CLI command with explicit log-level and output-format overrides.
///
/// # Errors
///
/// See [`run`].
pub async fn run_with_log_level<W>(
    command: Command,
    out: &mut W,
    fake: Option<FakeArgs>,
    log_level: Option<LogLevel>,
    output_format: Option<OutputFormat>,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients_and_log_level(
        command,
        out,
        &SystemTerminalClient,
        fake,
        log_level,
        output_format,
    )
    .await
}

/// Runs a CLI command with an injected terminal client and explicit settings.
///
/// Without an explicit output format, output is pretty on a terminal and
/// JSON lines otherwise.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// struct FakeTerminal;
/// impl hughes::TerminalClient for FakeTerminal {
///     fn stdout_is_terminal(&self) -> bool { false }
///     fn stderr_is_terminal(&self) -> bool { false }
/// }
///
/// let args = hughes::Args::try_parse_from([
///     "hughes",
///     "--log-level",
///     "debug",
///     "decode",
///     "--generation",
///     "gen2",
///     "247C2740 01 01 02 00 00 7121",
/// ])?;
/// let log_level = args.log_level();
/// let output_format = args.output_format();
/// let (command, maybe_fake_args) = args.into_command_and_fake_args();
/// let mut out = Vec::new();
/// hughes::run_with_clients_and_log_level(
///     command,
///     &mut out,
///     &FakeTerminal,
///     maybe_fake_args,
///     log_level,
///     output_format,
/// ).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// See [`run`].
#[instrument(
    skip(command, out, terminal_client, fake),
    level = "info",
    fields(command = %command.name(), fake = fake.is_some(), ?log_level)
)]
pub async fn run_with_clients_and_log_level<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    fake: Option<FakeArgs>,
    log_level: Option<LogLevel>,
    output_format: Option<OutputFormat>,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        SERVICE_NAME,
        terminal_client.stderr_is_terminal(),
        log_level.map(LogLevel::as_level_filter),
    )?;

    let interactive = terminal_client.stdout_is_terminal();
    let output_format = output_format.unwrap_or(if interactive {
        OutputFormat::Pretty
    } else {
        OutputFormat::Json
    });
    let painter = Painter::new(interactive);

    match command {
        Command::Detect(args) => crate::cli::detect::run(&args, out, &painter, output_format),
        Command::Decode(args) => crate::cli::decode::run(&args, out, &painter, output_format),
        Command::Listen(args) => {
            crate::cli::listen::run(&args, fake, out, &painter, output_format).await
        }
        Command::Control(args) => {
            crate::cli::control::run(&args, fake, out, &painter, output_format).await
        }
    }
}
