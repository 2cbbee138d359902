//! Start, probe, and stop one target.

use std::env;
use std::time::Duration;

use harness_config::{Config, DEFAULT_ADDR, default_serve_command, default_start_timeout};
use tracing::{debug, info, warn};
use url::Url;

use crate::app_root::resolve_app_root;
use crate::error::HarnessError;
use crate::fetch::{FetchInput, HttpClient, ReqwestClient, resolve_request};
use crate::process::{DiagnosticSink, ManagedProcess, TracingSink};
use crate::race::StartupRace;
use crate::target::{StartMode, Target, parse_origin};

const CONTROLLER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::controller");

/// Options for a single [`AppController::start`] call.
///
/// Every field is optional. With neither a command nor an application root the
/// controller attaches to an already-running target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartOptions {
    addr: Option<String>,
    app_root: Option<String>,
    start_command: Option<String>,
    start_timeout: Option<Duration>,
    env: Vec<(String, String)>,
}

impl StartOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the origin the target is reachable at.
    #[must_use]
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = Some(addr.into());
        self
    }

    /// Sets the project directory, as a path or `file:` URL.
    #[must_use]
    pub fn with_app_root(mut self, app_root: impl Into<String>) -> Self {
        self.app_root = Some(app_root.into());
        self
    }

    /// Sets the shell command that launches the target.
    #[must_use]
    pub fn with_start_command(mut self, start_command: impl Into<String>) -> Self {
        self.start_command = Some(start_command.into());
        self
    }

    /// Sets the readiness window.
    #[must_use]
    pub const fn with_start_timeout(mut self, start_timeout: Duration) -> Self {
        self.start_timeout = Some(start_timeout);
        self
    }

    /// Adds an environment variable for the launched process.
    ///
    /// Ignored when attaching.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Origin, falling back to the default address.
    pub fn addr(&self) -> &str {
        self.addr.as_deref().unwrap_or(DEFAULT_ADDR)
    }

    /// Readiness window, falling back to the default.
    pub fn start_timeout(&self) -> Duration {
        self.start_timeout.unwrap_or_else(default_start_timeout)
    }
}

impl From<&Config> for StartOptions {
    fn from(config: &Config) -> Self {
        Self {
            addr: Some(config.addr.clone()),
            app_root: config.app_root.clone(),
            start_command: config.start_command.clone(),
            start_timeout: Some(config.start_timeout()),
            env: Vec::new(),
        }
    }
}

/// Owns the lifecycle of one target.
///
/// A start cycle opens with [`start`](Self::start) and closes only with
/// [`shutdown`](Self::shutdown), even when the start failed. Dropping the
/// controller tears down any process it still owns.
#[derive(Debug)]
pub struct AppController<C = ReqwestClient, S = TracingSink> {
    client: C,
    sink: S,
    target: Option<Target>,
    process: Option<ManagedProcess>,
    cycle_open: bool,
}

impl AppController {
    /// Creates a controller using `reqwest` and tracing-based diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::HttpClientInit`] when the HTTP client cannot be
    /// built.
    pub fn new() -> Result<Self, HarnessError> {
        let client =
            ReqwestClient::new().map_err(|source| HarnessError::HttpClientInit { source })?;
        Ok(Self::with_parts(client, TracingSink))
    }
}

impl<C, S> AppController<C, S>
where
    C: HttpClient,
    S: DiagnosticSink,
{
    /// Creates a controller around explicit collaborators.
    pub const fn with_parts(client: C, sink: S) -> Self {
        Self {
            client,
            sink,
            target: None,
            process: None,
            cycle_open: false,
        }
    }

    /// Starts or attaches to the target and waits until it is ready.
    ///
    /// On failure any spawned process tree is terminated before the error is
    /// returned, and captured output is replayed to the diagnostic sink.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::AlreadyStarted`] when the previous cycle was
    /// not closed with [`shutdown`](Self::shutdown), otherwise the cause of
    /// the failed start.
    pub fn start(&mut self, options: &StartOptions) -> Result<&Target, HarnessError> {
        if self.cycle_open {
            return Err(HarnessError::AlreadyStarted);
        }
        self.cycle_open = true;

        match self.bring_up(options) {
            Ok(target) => {
                info!(
                    target: CONTROLLER_TARGET,
                    origin = %target.origin(),
                    mode = ?target.mode(),
                    pid = ?self.process_id(),
                    "application ready"
                );
                Ok(&*self.target.insert(target))
            }
            Err(error) => {
                warn!(target: CONTROLLER_TARGET, %error, "application failed to start");
                self.discard_failed_start();
                Err(error)
            }
        }
    }

    fn bring_up(&mut self, options: &StartOptions) -> Result<Target, HarnessError> {
        let origin = parse_origin(options.addr())?;
        let mode = StartMode::select(options.start_command.is_some(), options.app_root.is_some());
        if !mode.spawns_process() {
            info!(target: CONTROLLER_TARGET, %origin, "attaching to running application");
            return Ok(Target::new(origin, mode));
        }

        let cwd = match options.app_root.as_deref() {
            Some(app_root) => resolve_app_root(app_root)?,
            None => env::current_dir().map_err(|error| HarnessError::InvalidAppRoot {
                app_root: String::from("."),
                reason: error.to_string(),
            })?,
        };
        let command = options
            .start_command
            .clone()
            .unwrap_or_else(|| serve_command(&origin));
        info!(
            target: CONTROLLER_TARGET,
            %origin,
            mode = ?mode,
            command,
            cwd = %cwd.display(),
            "starting application"
        );

        let (spawned, events) = ManagedProcess::spawn_shell(&command, &cwd, &options.env)?;
        let process = self.process.insert(spawned);
        let race = StartupRace::new(options.start_timeout());
        if let Err(failure) = race.run(&events, process) {
            self.sink.replay(failure.output.chunks());
            return Err(failure.cause);
        }
        Ok(Target::new(origin, mode))
    }

    fn discard_failed_start(&mut self) {
        self.target = None;
        if let Some(mut process) = self.process.take() {
            if let Err(error) = process.terminate() {
                warn!(target: CONTROLLER_TARGET, %error, "cleanup after failed start was incomplete");
            }
        }
    }

    /// Stops the target and closes the start cycle.
    ///
    /// Safe to call repeatedly or without a prior start. The origin is always
    /// cleared.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ShutdownIncomplete`] when part of the process
    /// tree survived termination.
    pub fn shutdown(&mut self) -> Result<(), HarnessError> {
        self.cycle_open = false;
        self.target = None;
        let Some(mut process) = self.process.take() else {
            debug!(target: CONTROLLER_TARGET, "no application process to stop");
            return Ok(());
        };
        info!(target: CONTROLLER_TARGET, pid = process.pid(), "stopping application");
        process.terminate()?;
        info!(target: CONTROLLER_TARGET, pid = process.pid(), "application stopped");
        Ok(())
    }

    /// Sends a request to the target and returns the client's response as-is.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::NotStarted`] before a successful start,
    /// [`HarnessError::CrossOrigin`] or [`HarnessError::InvalidRequestUrl`]
    /// for requests that do not resolve onto the target, and
    /// [`HarnessError::Transport`] when the client fails.
    pub fn fetch(&self, input: impl Into<FetchInput>) -> Result<C::Response, HarnessError> {
        let target = self.target.as_ref().ok_or(HarnessError::NotStarted)?;
        let request = resolve_request(target.origin(), input.into())?;
        let url = request.url.to_string();
        debug!(target: CONTROLLER_TARGET, method = %request.method, url, "fetch");
        self.client
            .send(request)
            .map_err(|source| HarnessError::Transport { url, source })
    }

    /// Target of the current cycle, when started.
    pub const fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    /// Process identifier of the spawned target, when one is owned.
    pub fn process_id(&self) -> Option<u32> {
        self.process.as_ref().map(ManagedProcess::pid)
    }
}

impl<C, S> Drop for AppController<C, S> {
    fn drop(&mut self) {
        if let Some(mut process) = self.process.take() {
            warn!(
                target: CONTROLLER_TARGET,
                pid = process.pid(),
                "controller dropped without shutdown; terminating application"
            );
            if let Err(error) = process.terminate() {
                warn!(target: CONTROLLER_TARGET, %error, "teardown on drop was incomplete");
            }
        }
    }
}

fn serve_command(origin: &Url) -> String {
    default_serve_command(
        origin.host_str().unwrap_or_default(),
        origin.port_or_known_default().unwrap_or_default(),
    )
}
