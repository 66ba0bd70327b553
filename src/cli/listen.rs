use std::io;

use anyhow::Result;
use clap::Args;
use tokio_stream::StreamExt;
use tracing::{info, instrument};

use crate::cli::command::FakeArgs;
use crate::cli::connect::{ConnectArgs, spawn_coordinator};
use crate::cli::ui::{Painter, SnapshotView};
use crate::cli::{OutputFormat, write_json_line};
use crate::coordinator::Snapshot;
use crate::error::InteractionError;

/// Arguments for the `listen` command.
#[derive(Debug, Args)]
pub struct ListenArgs {
    #[command(flatten)]
    connect: ConnectArgs,
    /// Stop once this many decoded updates have arrived. If omitted, listen until Ctrl+C.
    #[arg(long)]
    max_updates: Option<u64>,
}

impl ListenArgs {
    /// Creates listen arguments with an optional update limit.
    ///
    /// ```
    /// use hughes::{ConnectArgs, ListenArgs};
    ///
    /// let args = ListenArgs::new(ConnectArgs::new("WD_V6_01"), Some(10));
    /// let _ = args;
    /// ```
    #[must_use]
    pub fn new(connect: ConnectArgs, max_updates: Option<u64>) -> Self {
        Self {
            connect,
            max_updates,
        }
    }
}

/// Why a listen session ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
enum StopReason {
    #[display("reached {_0} update(s)")]
    ReachedLimit(u64),
    #[display("interrupted")]
    Interrupted,
    #[display("coordinator stopped")]
    CoordinatorStopped,
}

/// Executes the `listen` command.
#[instrument(skip_all, level = "info", fields(max_updates = ?args.max_updates, ?output_format))]
pub(crate) async fn run<W>(
    args: &ListenArgs,
    fake: Option<FakeArgs>,
    out: &mut W,
    painter: &Painter,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let coordinator = spawn_coordinator(&args.connect, fake).await?;
    let mut updates = coordinator.updates();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome: Result<StopReason> = loop {
        tokio::select! {
            biased;
            signal = &mut ctrl_c => {
                break signal
                    .map(|()| StopReason::Interrupted)
                    .map_err(|source| InteractionError::CtrlC { source }.into());
            }
            next = updates.next() => {
                let Some(snapshot) = next else {
                    break Ok(StopReason::CoordinatorStopped);
                };
                if let Err(error) = render(out, &snapshot, painter, output_format) {
                    break Err(error);
                }
                if args
                    .max_updates
                    .is_some_and(|max_updates| snapshot.update_count() >= max_updates)
                {
                    break Ok(StopReason::ReachedLimit(snapshot.update_count()));
                }
            }
        }
    };

    coordinator.shutdown().await;
    let stop_reason = outcome?;
    info!(%stop_reason, "listen finished");

    if output_format == OutputFormat::Pretty {
        let stop_label = match stop_reason {
            StopReason::ReachedLimit(_) => painter.success(stop_reason.to_string()),
            StopReason::Interrupted | StopReason::CoordinatorStopped => {
                painter.warning(stop_reason.to_string())
            }
        };
        writeln!(out, "{} {stop_label}", painter.heading("Stopped:"))?;
    }

    Ok(())
}

fn render<W>(
    out: &mut W,
    snapshot: &Snapshot,
    painter: &Painter,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    match output_format {
        OutputFormat::Pretty => {
            writeln!(out, "{}", SnapshotView::new(snapshot, painter))?;
            writeln!(out)?;
        }
        OutputFormat::Json => write_json_line(out, snapshot)?,
    }
    Ok(())
}
