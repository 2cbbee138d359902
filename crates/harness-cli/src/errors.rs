//! Error types for the CLI runtime.

use std::io;

use harness_core::HarnessError;
use thiserror::Error;

use crate::shutdown::ShutdownError;
use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to initialise telemetry: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Harness(#[from] HarnessError),
    #[error("failed to wait for a shutdown signal: {0}")]
    Shutdown(#[from] ShutdownError),
    #[error("failed to write output: {0}")]
    WriteOutput(io::Error),
    #[error("{failed} of {total} requests failed")]
    ProbeFailed { failed: usize, total: usize },
}
