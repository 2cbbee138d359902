//! Shared configuration for the service fixture harness.
//!
//! The harness binary and the core library agree on defaults through this
//! crate. [`Config`] layers values in the order CLI flag, `HARNESS_*`
//! environment variable, then the built-in default, so tests and CI jobs can
//! point the harness at a project without editing invocations.

mod defaults;
mod logging;

use std::ffi::OsString;
use std::time::Duration;

use clap::{Args, Parser};

pub use defaults::{
    DEFAULT_ADDR, DEFAULT_LOG_FILTER, DEFAULT_SERVE_COMMAND, DEFAULT_START_TIMEOUT_MS,
    default_log_filter, default_log_format, default_serve_command, default_start_timeout,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Layered harness configuration.
///
/// Embed it in a CLI with `#[command(flatten)]`, or load it on its own with
/// [`Config::load_from_iter`].
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct Config {
    /// Origin the target is (or will be) reachable at.
    #[arg(long, env = "HARNESS_ADDR", default_value = DEFAULT_ADDR, global = true)]
    pub addr: String,
    /// Project directory (path or `file:` URL) the target is served from.
    #[arg(long, env = "HARNESS_APP_ROOT", global = true)]
    pub app_root: Option<String>,
    /// Shell command that launches the target, overriding the default.
    #[arg(long, env = "HARNESS_START_COMMAND", global = true)]
    pub start_command: Option<String>,
    /// Milliseconds to wait for readiness; `0` fails unless already ready.
    #[arg(
        long,
        env = "HARNESS_START_TIMEOUT_MS",
        default_value_t = DEFAULT_START_TIMEOUT_MS,
        global = true
    )]
    pub start_timeout_ms: u64,
    /// Tracing filter expression for the harness's own logs.
    #[arg(long, env = "HARNESS_LOG_FILTER", default_value = DEFAULT_LOG_FILTER, global = true)]
    pub log_filter: String,
    /// Output format for the harness's own logs.
    #[arg(long, env = "HARNESS_LOG_FORMAT", default_value_t = LogFormat::Compact, global = true)]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_owned(),
            app_root: None,
            start_command: None,
            start_timeout_ms: DEFAULT_START_TIMEOUT_MS,
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: default_log_format(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "harness-config", disable_help_subcommand = true)]
struct StandaloneConfig {
    #[command(flatten)]
    config: Config,
}

impl Config {
    /// Loads configuration from an argument iterator whose first item is the
    /// program name, consulting `HARNESS_*` variables for absent flags.
    ///
    /// # Errors
    ///
    /// Returns the clap error when a flag or environment value fails to parse.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        StandaloneConfig::try_parse_from(args).map(|standalone| standalone.config)
    }

    /// Startup window as a [`Duration`].
    pub const fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    /// Log filter expression.
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
