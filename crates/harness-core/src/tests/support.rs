//! Shared fixtures for controller tests.
//!
//! Services are small `sh` scripts that record every pid they create in a
//! temporary directory, so tests can confirm the whole tree is gone even after
//! the controller has forgotten the process.

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use rstest::fixture;
use tempfile::TempDir;

use crate::error::{HarnessError, TransportError};
use crate::fetch::{HttpClient, ResolvedRequest};
use crate::process::{DiagnosticSink, OutputChunk};
use crate::{AppController, StartOptions, Target, process};

pub(super) const PROJECT_FILE: &str = "fastly.toml";
const PID_FILE: &str = "pids";

/// Answers every request with its absolute URL.
#[derive(Debug, Default)]
pub(super) struct EchoClient;

impl HttpClient for EchoClient {
    type Response = String;

    fn send(&self, request: ResolvedRequest) -> Result<Self::Response, TransportError> {
        Ok(request.url.to_string())
    }
}

/// Keeps every replay so scenarios can inspect them after the fact.
#[derive(Debug, Clone, Default)]
pub(super) struct RecordingSink {
    replays: Rc<RefCell<Vec<Vec<String>>>>,
}

impl RecordingSink {
    pub(super) fn replays(&self) -> Vec<Vec<String>> {
        self.replays.borrow().clone()
    }
}

impl DiagnosticSink for RecordingSink {
    fn replay(&self, chunks: &[OutputChunk]) {
        self.replays
            .borrow_mut()
            .push(chunks.iter().map(|chunk| chunk.content().to_owned()).collect());
    }
}

/// Renders a named service script that records its pids under `dir`.
pub(super) fn service_script(name: &str, dir: &std::path::Path) -> String {
    let pids = dir.join(PID_FILE).display().to_string();
    let markers = "echo 'Running local server'; echo 'compiling'; \
                   echo 'INFO: Command output:'; \
                   echo 'INFO Listening on http://127.0.0.1:7676'";
    let body = match name {
        "becomes ready" => format!("{markers}; sleep 30 & echo $! >> {pids}; wait"),
        "forks a grandchild" => format!(
            "sh -c 'sleep 30 & echo $! >> {pids}; wait' & echo $! >> {pids}; {markers}; wait"
        ),
        "requires the project file" => {
            format!("test -f {PROJECT_FILE} || exit 9; {markers}; sleep 30 & echo $! >> {pids}; wait")
        }
        "exits with code 3" => String::from(
            "echo 'Running local server'; echo 'fatal: port in use' >&2; exit 3",
        ),
        "exits after forking a child" => format!(
            "sleep 30 & echo $! >> {pids}; echo 'Running local server'; \
             echo 'fatal: config missing' >&2; exit 4"
        ),
        "prints markers out of order" => format!(
            "echo 'INFO: Command output:'; echo 'Running local server'; \
             echo 'INFO Listening on http://127.0.0.1:7676'; sleep 30 & echo $! >> {pids}; wait"
        ),
        other => panic!("unknown service {other}"),
    };
    format!("echo $$ >> {pids}; {body}")
}

/// Writes a stand-in for the default serve tool into `dir/bin` and returns
/// that directory.
///
/// The tool refuses to start unless it was invoked with the default origin's
/// address from a directory holding the project file.
pub(super) fn install_serve_tool(dir: &std::path::Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let bin = dir.join("bin");
    fs::create_dir_all(&bin).expect("create bin dir");
    let pids = dir.join(PID_FILE).display().to_string();
    let script = format!(
        "#!/bin/sh\n\
         echo $$ >> {pids}\n\
         [ \"$*\" = 'compute serve --addr=127.0.0.1:7676' ] || {{ echo \"unexpected arguments: $*\" >&2; exit 8; }}\n\
         test -f {PROJECT_FILE} || {{ echo 'not in the project directory' >&2; exit 9; }}\n\
         echo 'Running local server'\n\
         echo 'INFO: Command output:'\n\
         echo 'INFO Listening on http://127.0.0.1:7676'\n\
         sleep 30 & echo $! >> {pids}\n\
         wait\n"
    );
    let tool = bin.join("fastly");
    fs::write(&tool, script).expect("write serve tool");
    fs::set_permissions(&tool, fs::Permissions::from_mode(0o755))
        .expect("make serve tool executable");
    bin
}

/// Every pid a service script recorded.
pub(super) fn recorded_pids(dir: &std::path::Path) -> Vec<u32> {
    fs::read_to_string(dir.join(PID_FILE))
        .unwrap_or_default()
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

/// Waits briefly for reparented processes to be reaped.
pub(super) fn all_gone(pids: &[u32]) -> bool {
    for _ in 0..40 {
        if pids.iter().all(|pid| !process::is_alive(*pid)) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}

/// Short name of an error variant for scenario assertions.
pub(super) const fn error_kind(error: &HarnessError) -> &'static str {
    match error {
        HarnessError::AlreadyStarted => "AlreadyStarted",
        HarnessError::InvalidAddress { .. } => "InvalidAddress",
        HarnessError::InvalidAppRoot { .. } => "InvalidAppRoot",
        HarnessError::ProcessSpawn { .. } => "ProcessSpawn",
        HarnessError::ProcessExited { .. } => "ProcessExited",
        HarnessError::ProcessClosed { .. } => "ProcessClosed",
        HarnessError::StartupTimeout { .. } => "StartupTimeout",
        HarnessError::MonitorProcess { .. } => "MonitorProcess",
        HarnessError::NotStarted => "NotStarted",
        HarnessError::CrossOrigin { .. } => "CrossOrigin",
        HarnessError::InvalidRequestUrl { .. } => "InvalidRequestUrl",
        HarnessError::HttpClientInit { .. } => "HttpClientInit",
        HarnessError::Transport { .. } => "Transport",
        HarnessError::ShutdownIncomplete { .. } => "ShutdownIncomplete",
        HarnessError::SignalFailed { .. } => "SignalFailed",
    }
}

/// Scenario state shared between steps.
pub(super) struct TestWorld {
    pub(super) dir: TempDir,
    pub(super) options: StartOptions,
    pub(super) controller: AppController<EchoClient, RecordingSink>,
    pub(super) sink: RecordingSink,
    pub(super) last_start: Option<Result<Target, HarnessError>>,
}

impl TestWorld {
    fn new() -> Self {
        let sink = RecordingSink::default();
        Self {
            dir: tempfile::tempdir().expect("temp dir"),
            options: StartOptions::new().with_start_timeout(Duration::from_secs(10)),
            controller: AppController::with_parts(EchoClient, sink.clone()),
            sink,
            last_start: None,
        }
    }

    pub(super) fn dir_path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub(super) fn start(&mut self) {
        let result = self.controller.start(&self.options).cloned();
        self.last_start = Some(result);
    }

    pub(super) fn start_error(&self) -> &HarnessError {
        match self.last_start.as_ref() {
            Some(Err(error)) => error,
            Some(Ok(target)) => panic!("start unexpectedly succeeded: {target:?}"),
            None => panic!("start was not attempted"),
        }
    }
}

#[fixture]
pub(super) fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
