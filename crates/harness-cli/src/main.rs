//! CLI entrypoint for the service fixture harness.
//!
//! The binary delegates to [`harness_cli::run`], which parses arguments,
//! installs telemetry, and drives the application controller.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    harness_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
