//! Error surface of the harness.
//!
//! All errors use a `thiserror`-derived enum with structured context so test
//! code can match on the failure kind. I/O errors are wrapped in `Arc` to keep
//! the `Result` small and the error cloneable.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error produced by an [`HttpClient`](crate::HttpClient).
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while starting, probing, or stopping a target.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// `start` was called while a start cycle is still open.
    #[error("the application is already started; call shutdown() before starting again")]
    AlreadyStarted,

    /// The configured address is not an absolute URL with a host.
    #[error("invalid target address '{addr}': {reason}")]
    InvalidAddress {
        /// Address as supplied.
        addr: String,
        /// Why the address was rejected.
        reason: String,
    },

    /// The application root does not resolve to a usable directory.
    #[error("invalid application root '{app_root}': {reason}")]
    InvalidAppRoot {
        /// Application root as supplied.
        app_root: String,
        /// Why no directory could be derived.
        reason: String,
    },

    /// The operating system refused to create the process.
    #[error("failed to spawn '{command}' in {cwd:?}: {source}")]
    ProcessSpawn {
        /// Shell command that was launched.
        command: String,
        /// Working directory of the launch.
        cwd: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The process exited before reporting readiness.
    #[error("process exited before it was ready (exit code: {exit_code:?})")]
    ProcessExited {
        /// Exit code, when the process was not killed by a signal.
        exit_code: Option<i32>,
    },

    /// The process closed its output before reporting readiness.
    #[error("process closed its output before it was ready (exit code: {exit_code:?})")]
    ProcessClosed {
        /// Exit code, when the process had already terminated.
        exit_code: Option<i32>,
    },

    /// Readiness was not reached within the startup window.
    #[error("timed out after {timeout_ms} ms waiting for the application to become ready")]
    StartupTimeout {
        /// Configured startup window in milliseconds.
        timeout_ms: u64,
    },

    /// Querying the child's status failed.
    #[error("failed to monitor process {pid}: {source}")]
    MonitorProcess {
        /// Process being monitored.
        pid: u32,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// `fetch` was called without a successful `start`.
    #[error("the application is not started; call start() before fetch()")]
    NotStarted,

    /// The request resolved to a host other than the target's.
    #[error("fetch target {actual} does not match the application origin {expected}")]
    CrossOrigin {
        /// Origin recorded at start.
        expected: String,
        /// Host the request resolved to.
        actual: String,
    },

    /// The request URL could not be resolved against the origin.
    #[error("cannot resolve request URL '{input}': {source}")]
    InvalidRequestUrl {
        /// Request URL as supplied.
        input: String,
        /// Parser failure.
        #[source]
        source: url::ParseError,
    },

    /// The default HTTP client could not be constructed.
    #[error("failed to initialise the HTTP client: {source}")]
    HttpClientInit {
        /// Builder error.
        #[source]
        source: TransportError,
    },

    /// The HTTP client failed to perform the request.
    #[error("request to {url} failed: {source}")]
    Transport {
        /// Absolute request URL.
        url: String,
        /// Client error.
        #[source]
        source: TransportError,
    },

    /// Members of the process tree survived termination.
    #[error("process tree rooted at {pid} did not exit; surviving pids: {remaining:?}")]
    ShutdownIncomplete {
        /// Root of the tree.
        pid: u32,
        /// Processes still alive after escalation.
        remaining: Vec<u32>,
    },

    /// A termination signal could not be delivered.
    #[error("failed to signal process {pid}: {source}")]
    SignalFailed {
        /// Target process.
        pid: u32,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl HarnessError {
    /// Returns `true` for failures that mean the process ended early.
    pub const fn is_premature_exit(&self) -> bool {
        matches!(
            self,
            Self::ProcessExited { .. } | Self::ProcessClosed { .. }
        )
    }
}
