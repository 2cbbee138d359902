//! Command-line runtime for the service fixture harness.
//!
//! Parses arguments, installs telemetry, and drives an
//! [`AppController`](harness_core::AppController) through one of two flows:
//! `probe` starts the target, requests a few paths, and stops it again, while
//! `run` keeps the target alive until the operator sends a termination
//! signal. The runtime writes to caller-supplied streams so tests can capture
//! its output.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use harness_core::{AppController, HttpClient, StartOptions};
use tracing::warn;

mod cli;
mod errors;
pub mod shutdown;
pub mod telemetry;

use cli::{Cli, CliCommand};
use errors::AppError;
use shutdown::{ShutdownSignal, SystemShutdownSignal};

const CLI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::cli");

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let result = Cli::try_parse_from(args)
        .map_err(AppError::CliUsage)
        .and_then(|cli| {
            telemetry::initialise(&cli.config)?;
            execute(cli, stdout)
        });

    match result {
        Ok(exit_code) => exit_code,
        Err(AppError::CliUsage(error)) => {
            let rendered = error.render();
            if error.use_stderr() {
                let _ = write!(stderr, "{rendered}");
            } else {
                let _ = write!(stdout, "{rendered}");
            }
            ExitCode::from(u8::try_from(error.exit_code()).unwrap_or(2))
        }
        Err(error) => {
            let _ = writeln!(stderr, "harness: {error}");
            ExitCode::FAILURE
        }
    }
}

fn execute<W: Write>(cli: Cli, stdout: &mut W) -> Result<ExitCode, AppError> {
    let options = StartOptions::from(&cli.config);
    match cli.command {
        CliCommand::Probe { paths } => {
            let mut controller = AppController::new()?;
            probe(&mut controller, &options, &paths, stdout)
        }
        CliCommand::Run => {
            // Register before starting so an early signal is not lost.
            let mut signal = SystemShutdownSignal::install()?;
            let mut controller = AppController::new()?;
            serve(&mut controller, &options, stdout, &mut signal)
        }
    }
}

/// Response details printed by `probe`.
trait ProbeResponse {
    fn describe(&self) -> String;
}

impl ProbeResponse for harness_core::ReqwestResponse {
    fn describe(&self) -> String {
        self.status().to_string()
    }
}

fn probe<C, W>(
    controller: &mut AppController<C>,
    options: &StartOptions,
    paths: &[String],
    stdout: &mut W,
) -> Result<ExitCode, AppError>
where
    C: HttpClient,
    C::Response: ProbeResponse,
    W: Write,
{
    controller.start(options)?;
    let outcome = probe_paths(controller, paths, stdout);
    controller.shutdown()?;
    outcome
}

fn probe_paths<C, W>(
    controller: &AppController<C>,
    paths: &[String],
    stdout: &mut W,
) -> Result<ExitCode, AppError>
where
    C: HttpClient,
    C::Response: ProbeResponse,
    W: Write,
{
    let mut failed = 0;
    for path in paths {
        let line = match controller.fetch(path.as_str()) {
            Ok(response) => format!("GET {path} -> {}", response.describe()),
            Err(error) => {
                warn!(target: CLI_TARGET, path, %error, "probe request failed");
                failed += 1;
                format!("GET {path} -> error: {error}")
            }
        };
        writeln!(stdout, "{line}").map_err(AppError::WriteOutput)?;
    }
    if failed > 0 {
        return Err(AppError::ProbeFailed {
            failed,
            total: paths.len(),
        });
    }
    Ok(ExitCode::SUCCESS)
}

fn serve<C, W, S>(
    controller: &mut AppController<C>,
    options: &StartOptions,
    stdout: &mut W,
    signal: &mut S,
) -> Result<ExitCode, AppError>
where
    C: HttpClient,
    W: Write,
    S: ShutdownSignal,
{
    let origin = controller.start(options)?.origin().clone();
    writeln!(stdout, "ready at {origin}")
        .and_then(|()| stdout.flush())
        .map_err(AppError::WriteOutput)?;
    let waited = signal.wait();
    controller.shutdown()?;
    waited?;
    Ok(ExitCode::SUCCESS)
}
