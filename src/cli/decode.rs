use std::io;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use strum::IntoEnumIterator;
use tracing::instrument;

use crate::cli::OutputFormat;
use crate::cli::ui::{LinesView, Painter};
use crate::cli::write_json_line;
use crate::codec::decode_capture;
use crate::detect::Generation;
use crate::hw::HexPayload;
use crate::state::{DecodedUpdate, LineData};
use crate::utils::format_hex;

/// Arguments for the `decode` command.
#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Protocol generation of the capture.
    #[arg(long, value_parser = parse_generation)]
    generation: Generation,
    /// Decode enhanced Gen2 fields (output voltage, boost, temperature).
    #[arg(long)]
    enhanced: bool,
    /// Captured bytes as hexadecimal; whitespace is ignored.
    capture: HexPayload,
}

#[derive(Serialize)]
struct DecodedLine<'a> {
    update: usize,
    line: &'static str,
    #[serde(flatten)]
    reading: &'a LineData,
}

/// Executes the `decode` command.
#[instrument(skip(args, out), level = "debug", fields(generation = %args.generation, enhanced = args.enhanced))]
pub(crate) fn run<W>(
    args: &DecodeArgs,
    out: &mut W,
    painter: &Painter,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let capture: Vec<u8> = args.capture.clone().into();
    let updates = decode_capture(args.generation, args.enhanced, &capture)
        .with_context(|| format!("failed to decode {} capture", args.generation))?;

    for (index, update) in updates.iter().enumerate() {
        let update_number = index + 1;
        let lines = labelled_lines(update);
        match output_format {
            OutputFormat::Pretty => {
                writeln!(
                    out,
                    "{}",
                    painter.heading(format!("Update {update_number} ({}):", args.generation))
                )?;
                writeln!(out, "{}", LinesView::new(lines, painter))?;
                if let DecodedUpdate::Gen2(report) = update {
                    writeln!(
                        out,
                        "{}",
                        painter.muted(format!("raw={}", format_hex(&report.raw_body)))
                    )?;
                }
            }
            OutputFormat::Json => {
                for (line, reading) in lines {
                    write_json_line(
                        out,
                        &DecodedLine {
                            update: update_number,
                            line,
                            reading,
                        },
                    )?;
                }
            }
        }
    }

    Ok(())
}

fn labelled_lines(update: &DecodedUpdate) -> Vec<(&'static str, &LineData)> {
    match update {
        DecodedUpdate::Gen1 { line, is_line2 } => {
            vec![(if *is_line2 { "L2" } else { "L1" }, line)]
        }
        DecodedUpdate::Gen2(report) => {
            let mut lines = vec![("L1", report.line1())];
            lines.extend(report.line2().map(|line| ("L2", line)));
            lines
        }
    }
}

fn parse_generation(value: &str) -> Result<Generation, String> {
    Generation::iter()
        .find(|generation| generation.to_string().eq_ignore_ascii_case(value))
        .ok_or_else(|| format!("unknown generation `{value}` (expected gen1 or gen2)"))
}
