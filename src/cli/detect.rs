use std::io;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tracing::instrument;

use crate::cli::OutputFormat;
use crate::cli::ui::{Painter, Table, model_label};
use crate::cli::write_json_line;
use crate::codec::GEN1_FRAME_LEN;
use crate::detect::{DeviceModel, Generation, ModelDetector};
use crate::protocol::{endpoint_metadata, endpoints_for};

/// Arguments for the `detect` command.
#[derive(Debug, Args)]
pub struct DetectArgs {
    /// Advertised BLE name, e.g. `WD_E8_0001` or `PMD30`.
    name: String,
}

impl DetectArgs {
    /// Creates detect arguments for one advertised name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Serialize)]
struct DetectReport<'a> {
    name: &'a str,
    watchdog_name: bool,
    #[serde(flatten)]
    model: &'a DeviceModel,
    service: &'static str,
}

/// Executes the `detect` command.
#[instrument(skip(args, out), level = "debug", fields(name = %args.name))]
pub(crate) fn run<W>(
    args: &DetectArgs,
    out: &mut W,
    painter: &Painter,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let model = ModelDetector::detect(&args.name);
    let watchdog_name = ModelDetector::is_watchdog_name(&args.name);
    let service = endpoint_metadata(endpoints_for(model.generation()).service).uuid();

    match output_format {
        OutputFormat::Pretty => {
            let framing = match model.generation() {
                Generation::Gen1 => format!("{GEN1_FRAME_LEN}-byte paired frames"),
                Generation::Gen2 => "magic-delimited packets".to_string(),
            };
            let recognised = if watchdog_name {
                painter.success("yes")
            } else {
                painter.warning("no (assuming gen1)")
            };
            let table = Table::key_value(
                painter,
                vec![
                    ("model", painter.value(model_label(&model))),
                    ("recognised", recognised),
                    ("service", service.to_string()),
                    ("framing", framing),
                ],
            );
            writeln!(out, "{} {}", painter.heading("Detected:"), painter.value(&args.name))?;
            writeln!(out, "{table}")?;
        }
        OutputFormat::Json => write_json_line(
            out,
            &DetectReport {
                name: &args.name,
                watchdog_name,
                model: &model,
                service,
            },
        )?,
    }

    Ok(())
}
