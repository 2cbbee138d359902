//! Handle to the spawned target and its descendant tree.
//!
//! The target is launched through the platform shell with both output streams
//! piped. Two pump threads forward each line as a [`ProcessEvent`] through a
//! single channel, so the startup race observes stdout and stderr in arrival
//! order. Once the race drops the receiver the pumps keep draining the pipes so
//! a long-running target never blocks on a full pipe.

mod output;
mod tree;

use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use tracing::{debug, info, warn};

use crate::error::HarnessError;

pub use output::{DiagnosticSink, OutputBuffer, OutputChunk, OutputStream, TracingSink};
pub use tree::{descendants, is_alive};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Something observed on the target's output pipes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A complete line arrived.
    Output(OutputChunk),
    /// The stream reached end of file.
    Closed(OutputStream),
}

/// Termination status of a process that has exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, or `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

/// Non-blocking view of whether a process has exited.
pub trait ExitProbe {
    /// Returns the exit status once the process has terminated.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::MonitorProcess`] when the status cannot be read.
    fn poll_exit(&mut self) -> Result<Option<ProcessExit>, HarnessError>;
}

/// A target launched through the shell, owning its whole process tree.
#[derive(Debug)]
pub struct ManagedProcess {
    child: Child,
    pid: u32,
}

impl ManagedProcess {
    /// Runs `command` through the platform shell in `cwd`, with `envs` added
    /// to the inherited environment.
    ///
    /// Returns the handle together with the receiving end of the output event
    /// channel.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ProcessSpawn`] when the shell cannot be started
    /// or its output cannot be captured.
    pub fn spawn_shell(
        command: &str,
        cwd: &Path,
        envs: &[(String, String)],
    ) -> Result<(Self, Receiver<ProcessEvent>), HarnessError> {
        let spawn_error = |source: io::Error| HarnessError::ProcessSpawn {
            command: command.to_owned(),
            cwd: cwd.to_path_buf(),
            source: Arc::new(source),
        };

        let mut shell = shell_command(command);
        shell
            .current_dir(cwd)
            .envs(envs.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Lead a fresh process group so the whole tree can be signalled.
            shell.process_group(0);
        }

        let mut child = shell.spawn().map_err(spawn_error)?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut process = Self {
            pid: child.id(),
            child,
        };
        info!(
            target: PROCESS_TARGET,
            pid = process.pid,
            command,
            cwd = %cwd.display(),
            "spawned application process"
        );

        let (sender, receiver) = mpsc::channel();
        if let Err(source) = start_pumps(stdout, stderr, &sender) {
            if let Err(cleanup) = process.terminate() {
                warn!(target: PROCESS_TARGET, pid = process.pid, %cleanup, "cleanup after capture failure failed");
            }
            return Err(spawn_error(source));
        }
        Ok((process, receiver))
    }

    /// Operating-system identifier of the shell at the root of the tree.
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Terminates the process and every descendant, returning once the whole
    /// tree is gone.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ShutdownIncomplete`] when members survive a
    /// forced kill.
    pub fn terminate(&mut self) -> Result<(), HarnessError> {
        tree::terminate_tree(&mut self.child)?;
        debug!(target: PROCESS_TARGET, pid = self.pid, "process tree terminated");
        Ok(())
    }
}

impl ExitProbe for ManagedProcess {
    fn poll_exit(&mut self) -> Result<Option<ProcessExit>, HarnessError> {
        self.child
            .try_wait()
            .map(|status| status.map(|exit| ProcessExit { code: exit.code() }))
            .map_err(|source| HarnessError::MonitorProcess {
                pid: self.pid,
                source: Arc::new(source),
            })
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut shell = Command::new("sh");
    shell.arg("-c").arg(command);
    shell
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut shell = Command::new("cmd");
    shell.arg("/C").arg(command);
    shell
}

fn start_pumps(
    stdout: Option<impl Read + Send + 'static>,
    stderr: Option<impl Read + Send + 'static>,
    sender: &Sender<ProcessEvent>,
) -> io::Result<()> {
    let missing = || io::Error::new(io::ErrorKind::BrokenPipe, "output pipe was not captured");
    spawn_pump(stdout.ok_or_else(missing)?, OutputStream::Stdout, sender.clone())?;
    spawn_pump(stderr.ok_or_else(missing)?, OutputStream::Stderr, sender.clone())?;
    Ok(())
}

fn spawn_pump(
    reader: impl Read + Send + 'static,
    stream: OutputStream,
    sender: Sender<ProcessEvent>,
) -> io::Result<()> {
    thread::Builder::new()
        .name(format!("harness-{stream}"))
        .spawn(move || pump_lines(reader, stream, &sender))
        .map(drop)
}

/// Forwards lines until end of file. Send failures mean the race has
/// resolved; reading continues so the pipe never fills.
fn pump_lines(reader: impl Read, stream: OutputStream, sender: &Sender<ProcessEvent>) {
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer) {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buffer);
                let line = text.trim_end_matches(['\n', '\r']);
                drop(sender.send(ProcessEvent::Output(OutputChunk::new(stream, line))));
            }
            Err(error) => {
                debug!(target: PROCESS_TARGET, %stream, %error, "output pipe read failed");
                break;
            }
        }
    }
    drop(sender.send(ProcessEvent::Closed(stream)));
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;

    fn collect_until_closed(events: &Receiver<ProcessEvent>) -> Vec<ProcessEvent> {
        let mut seen = Vec::new();
        let mut closed = 0;
        while closed < 2 {
            let event = events
                .recv_timeout(Duration::from_secs(5))
                .expect("event before timeout");
            if matches!(event, ProcessEvent::Closed(_)) {
                closed += 1;
            }
            seen.push(event);
        }
        seen
    }

    #[test]
    fn pumps_forward_lines_from_both_streams() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (mut process, events) =
            ManagedProcess::spawn_shell("echo out; echo err 1>&2", dir.path(), &[])
                .expect("spawn");
        let seen = collect_until_closed(&events);
        assert!(seen.contains(&ProcessEvent::Output(OutputChunk::new(
            OutputStream::Stdout,
            "out"
        ))));
        assert!(seen.contains(&ProcessEvent::Output(OutputChunk::new(
            OutputStream::Stderr,
            "err"
        ))));
        process.terminate().expect("terminate");
    }

    #[test]
    fn command_runs_in_requested_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let canonical = dir.path().canonicalize().expect("canonical dir");
        let (mut process, events) =
            ManagedProcess::spawn_shell("pwd -P", &canonical, &[]).expect("spawn");
        let seen = collect_until_closed(&events);
        let expected = canonical.display().to_string();
        assert!(
            seen.iter().any(|event| matches!(
                event,
                ProcessEvent::Output(chunk) if chunk.content() == expected
            )),
            "expected {expected} in {seen:?}"
        );
        process.terminate().expect("terminate");
    }

    #[test]
    fn exit_code_is_reported_by_probe() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (mut process, events) =
            ManagedProcess::spawn_shell("exit 7", dir.path(), &[]).expect("spawn");
        collect_until_closed(&events);
        let mut exit = None;
        for _ in 0..100 {
            exit = process.poll_exit().expect("poll");
            if exit.is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(exit, Some(ProcessExit { code: Some(7) }));
    }

    #[test]
    fn extra_environment_reaches_the_command() {
        let dir = tempfile::tempdir().expect("temp dir");
        let envs = [(String::from("HARNESS_FIXTURE_NAME"), String::from("orders"))];
        let (mut process, events) =
            ManagedProcess::spawn_shell("echo \"name=$HARNESS_FIXTURE_NAME\"", dir.path(), &envs)
                .expect("spawn");
        let seen = collect_until_closed(&events);
        assert!(seen.contains(&ProcessEvent::Output(OutputChunk::new(
            OutputStream::Stdout,
            "name=orders"
        ))));
        process.terminate().expect("terminate");
    }

    #[test]
    fn missing_working_directory_fails_to_spawn() {
        let result = ManagedProcess::spawn_shell("true", Path::new("/definitely/not/here"), &[]);
        assert!(matches!(result, Err(HarnessError::ProcessSpawn { .. })));
    }
}
