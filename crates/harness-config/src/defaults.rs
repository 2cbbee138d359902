use std::time::Duration;

/// Origin used when no address is configured.
pub const DEFAULT_ADDR: &str = "http://127.0.0.1:7676/";

/// Milliseconds to wait for the target to report readiness.
pub const DEFAULT_START_TIMEOUT_MS: u64 = 30_000;

/// Default log filter expression used by the binary.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Command template launched when only an application root is supplied.
///
/// `{host}` and `{port}` are replaced with the target origin's host and port.
pub const DEFAULT_SERVE_COMMAND: &str = "fastly compute serve --addr={host}:{port}";

/// Default startup window as a [`Duration`].
pub const fn default_start_timeout() -> Duration {
    Duration::from_millis(DEFAULT_START_TIMEOUT_MS)
}

/// Default log filter expression used by the binary.
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binary.
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::default()
}

/// Renders [`DEFAULT_SERVE_COMMAND`] for the given host and port.
pub fn default_serve_command(host: &str, port: u16) -> String {
    DEFAULT_SERVE_COMMAND
        .replace("{host}", host)
        .replace("{port}", &port.to_string())
}
