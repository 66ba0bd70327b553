use std::process::ExitCode;

use clap::Parser;

use hughes::{Args, run_with_log_level};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let mut stdout = std::io::stdout();

    let run_result = async {
        let log_level = args.log_level();
        let output_format = args.output_format();
        let (command, maybe_fake_args) = args.into_command_and_fake_args();

        run_with_log_level(
            command,
            &mut stdout,
            maybe_fake_args,
            log_level,
            output_format,
        )
        .await
    }
    .await;

    match run_result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}
