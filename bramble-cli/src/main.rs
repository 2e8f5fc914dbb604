//! Entry point for the `bramble` binary.
//!
//! Bootstraps diagnostics, dispatches the parsed subcommand, writes the
//! summary to stdout and folds every failure path into the process exit
//! code.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use bramble_cli::{
    cli::{render_summary, run_cli, Cli, CliError},
    logging,
};

fn main() -> ExitCode {
    if let Err(err) = logging::setup() {
        // The subscriber never came up, so say it plainly.
        eprintln!("bramble: {err}");
        return ExitCode::FAILURE;
    }

    match run_cli(Cli::parse()) {
        Ok(summary) => match render_summary(&summary, io::stdout().lock()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!(error = %err, "could not write the summary");
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

/// Logs a failed command, surfacing the stable error code when the
/// failure came out of the core library.
fn report(err: &CliError) {
    match err {
        CliError::Core(core) => {
            error!(code = %core.code(), error = %core, "command failed");
        }
        other => error!(error = %other, "command failed"),
    }
}
