pub(crate) mod command;
pub(crate) mod connect;
pub(crate) mod control;
pub(crate) mod decode;
pub(crate) mod detect;
pub(crate) mod listen;
pub(crate) mod ui;

use std::io;

use serde::Serialize;

pub use self::command::{Args, Command, FakeArgs, LogLevel, OutputFormat};
pub use self::connect::ConnectArgs;
pub use self::control::{
    BacklightArgs, ControlAction, ControlArgs, SyncTimeArgs, Toggle, ToggleArgs,
};
pub use self::decode::DecodeArgs;
pub use self::detect::DetectArgs;
pub use self::listen::ListenArgs;

/// Writes `value` as one compact JSON document followed by a newline.
pub(crate) fn write_json_line(out: &mut impl io::Write, value: &impl Serialize) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
