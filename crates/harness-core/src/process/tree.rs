//! Process-tree discovery and termination.
//!
//! Descendants are discovered by walking the OS process table rather than
//! trusting a signal to propagate: once the root dies its children are
//! reparented and become unreachable through parent links, so the tree is
//! snapshotted before anything is signalled.

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::process::Child;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};
use tracing::{debug, warn};

use super::PROCESS_TARGET;
use crate::error::HarnessError;

const TERMINATE_GRACE: Duration = Duration::from_secs(5);
const KILL_GRACE: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Signals used while tearing a tree down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TreeSignal {
    Terminate,
    Kill,
}

/// Snapshot of the OS process table.
pub(crate) struct ProcessTable {
    system: System,
}

impl ProcessTable {
    pub(crate) fn snapshot() -> Self {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        Self { system }
    }

    /// Every process transitively parented by `root`, excluding `root`.
    pub(crate) fn descendants(&self, root: u32) -> BTreeSet<u32> {
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for (pid, process) in self.system.processes() {
            if process.thread_kind().is_some() {
                continue;
            }
            if let Some(parent) = process.parent() {
                children
                    .entry(parent.as_u32())
                    .or_default()
                    .push(pid.as_u32());
            }
        }
        let mut found = BTreeSet::new();
        let mut frontier = vec![root];
        while let Some(current) = frontier.pop() {
            for &child in children.get(&current).into_iter().flatten() {
                if child != root && found.insert(child) {
                    frontier.push(child);
                }
            }
        }
        found
    }

    /// Whether `pid` is still running. Zombies count as gone.
    pub(crate) fn is_alive(&self, pid: u32) -> bool {
        self.system
            .process(Pid::from_u32(pid))
            .is_some_and(|process| {
                !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead)
            })
    }
}

/// Lists every live descendant of `root` from a fresh process-table snapshot.
pub fn descendants(root: u32) -> Vec<u32> {
    let table = ProcessTable::snapshot();
    table
        .descendants(root)
        .into_iter()
        .filter(|pid| table.is_alive(*pid))
        .collect()
}

/// Whether `pid` names a live process.
pub fn is_alive(pid: u32) -> bool {
    ProcessTable::snapshot().is_alive(pid)
}

/// Terminates `child` and every descendant, waiting until all are gone.
///
/// Sends a polite termination signal first and escalates to a forced kill
/// after [`TERMINATE_GRACE`]. The direct child is reaped so it does not
/// linger as a zombie.
pub(crate) fn terminate_tree(child: &mut Child) -> Result<(), HarnessError> {
    let root = child.id();
    let mut members = ProcessTable::snapshot().descendants(root);
    members.insert(root);
    debug!(
        target: PROCESS_TARGET,
        pid = root,
        members = members.len(),
        "terminating process tree"
    );

    signal_tree(root, &members, TreeSignal::Terminate);
    if wait_for_tree_exit(child, &mut members, TERMINATE_GRACE) {
        return Ok(());
    }

    warn!(
        target: PROCESS_TARGET,
        pid = root,
        remaining = ?members,
        "process tree ignored termination; killing"
    );
    signal_tree(root, &members, TreeSignal::Kill);
    if wait_for_tree_exit(child, &mut members, KILL_GRACE) {
        return Ok(());
    }
    Err(HarnessError::ShutdownIncomplete {
        pid: root,
        remaining: members.into_iter().collect(),
    })
}

fn signal_tree(root: u32, members: &BTreeSet<u32>, signal: TreeSignal) {
    signal_group(root, signal);
    for &pid in members {
        if let Err(error) = send_signal(pid, signal) {
            warn!(target: PROCESS_TARGET, %error, "failed to signal tree member");
        }
    }
}

/// Polls until every member has exited, reaping the direct child and adding
/// late descendants of surviving members as they appear.
fn wait_for_tree_exit(child: &mut Child, members: &mut BTreeSet<u32>, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        if let Err(error) = child.try_wait() {
            debug!(target: PROCESS_TARGET, %error, "failed to reap child");
        }
        let table = ProcessTable::snapshot();
        let late: Vec<u32> = members
            .iter()
            .filter(|pid| table.is_alive(**pid))
            .flat_map(|pid| table.descendants(*pid))
            .collect();
        members.extend(late);
        members.retain(|pid| table.is_alive(*pid));
        if members.is_empty() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn invalid_pid(pid: u32) -> HarnessError {
    HarnessError::SignalFailed {
        pid,
        source: Arc::new(io::Error::new(
            io::ErrorKind::InvalidInput,
            "pid does not name a single process",
        )),
    }
}

/// Delivers `signal` to one process. A process that is already gone is not
/// an error.
#[cfg(unix)]
pub(crate) fn send_signal(pid: u32, signal: TreeSignal) -> Result<(), HarnessError> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;

    let raw = i32::try_from(pid)
        .ok()
        .filter(|raw| *raw > 0)
        .ok_or_else(|| invalid_pid(pid))?;
    match kill(nix::unistd::Pid::from_raw(raw), unix_signal(signal)) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(HarnessError::SignalFailed {
            pid,
            source: Arc::new(io::Error::from(errno)),
        }),
    }
}

#[cfg(unix)]
fn signal_group(root: u32, signal: TreeSignal) {
    use nix::sys::signal::killpg;

    // The child leads its own process group, so its pid is the group id.
    let Some(raw) = i32::try_from(root).ok().filter(|raw| *raw > 0) else {
        return;
    };
    if let Err(errno) = killpg(nix::unistd::Pid::from_raw(raw), unix_signal(signal)) {
        debug!(target: PROCESS_TARGET, pgid = root, %errno, "process group signal not delivered");
    }
}

#[cfg(unix)]
const fn unix_signal(signal: TreeSignal) -> nix::sys::signal::Signal {
    match signal {
        TreeSignal::Terminate => nix::sys::signal::Signal::SIGTERM,
        TreeSignal::Kill => nix::sys::signal::Signal::SIGKILL,
    }
}

#[cfg(not(unix))]
pub(crate) fn send_signal(pid: u32, _signal: TreeSignal) -> Result<(), HarnessError> {
    if pid == 0 {
        return Err(invalid_pid(pid));
    }
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);
    if let Some(process) = system.process(Pid::from_u32(pid)) {
        if !process.kill() {
            debug!(target: PROCESS_TARGET, pid, "kill request was not delivered");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn signal_group(root: u32, _signal: TreeSignal) {
    let result = std::process::Command::new("taskkill")
        .args(["/PID", &root.to_string(), "/T", "/F"])
        .output();
    if let Err(error) = result {
        debug!(target: PROCESS_TARGET, pid = root, %error, "taskkill failed");
    }
}
