//! First-signal-wins coordination of a start attempt.
//!
//! Readiness, premature exit, and the startup deadline are observed by one
//! loop. Whichever resolves first decides the outcome; the loop returns
//! immediately so later signals are never acted upon.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::HarnessError;
use crate::process::{ExitProbe, OutputBuffer, OutputStream, ProcessEvent};
use crate::readiness::ReadinessDetector;

const RACE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::race");
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// A failed start attempt and everything the process printed during it.
#[derive(Debug)]
pub struct StartupFailure {
    /// Why the attempt failed.
    pub cause: HarnessError,
    /// Output captured before the failure, oldest first.
    pub output: OutputBuffer,
}

/// Races readiness against process failure and a deadline.
#[derive(Debug, Clone, Copy)]
pub struct StartupRace {
    timeout: Duration,
    close_grace: Duration,
}

impl StartupRace {
    /// Creates a race bounded by `timeout`. A zero timeout fails at once.
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            close_grace: CLOSE_GRACE,
        }
    }

    /// Overrides how long to wait for an exit code after stdout closes.
    #[must_use]
    pub const fn with_close_grace(mut self, close_grace: Duration) -> Self {
        self.close_grace = close_grace;
        self
    }

    /// Consumes output events until the target is ready or the attempt fails.
    ///
    /// Only standard output feeds the readiness detector; both streams are
    /// buffered for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns a [`StartupFailure`] carrying [`HarnessError::StartupTimeout`],
    /// [`HarnessError::ProcessExited`], [`HarnessError::ProcessClosed`], or
    /// [`HarnessError::MonitorProcess`].
    pub fn run<P>(&self, events: &Receiver<ProcessEvent>, probe: &mut P) -> Result<(), StartupFailure>
    where
        P: ExitProbe + ?Sized,
    {
        let mut state = RaceState::new(self.timeout);
        loop {
            let now = Instant::now();
            if state.deadline.is_some_and(|deadline| now >= deadline) {
                return Err(state.fail(HarnessError::StartupTimeout {
                    timeout_ms: millis(self.timeout),
                }));
            }

            let exit = match probe.poll_exit() {
                Ok(exit) => exit,
                Err(cause) => return Err(state.fail(cause)),
            };
            if let Some(closed_at) = state.stdout_closed_at {
                if let Some(exit) = exit {
                    state.drain(events, self.close_grace);
                    return Err(state.fail(HarnessError::ProcessClosed {
                        exit_code: exit.code,
                    }));
                }
                if now.duration_since(closed_at) >= self.close_grace {
                    return Err(state.fail(HarnessError::ProcessClosed { exit_code: None }));
                }
            } else if let Some(exit) = exit {
                state.drain(events, self.close_grace);
                return Err(state.fail(HarnessError::ProcessExited {
                    exit_code: exit.code,
                }));
            }

            let wait = state.remaining(now).min(POLL_INTERVAL);
            if state.pumps_done {
                thread::sleep(wait);
                continue;
            }
            match events.recv_timeout(wait) {
                Ok(event) => {
                    if state.apply(event) {
                        debug!(
                            target: RACE_TARGET,
                            elapsed_ms = millis(state.started.elapsed()),
                            "readiness reached"
                        );
                        return Ok(());
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    state.pumps_done = true;
                    state.stdout_closed_at.get_or_insert(now);
                }
            }
        }
    }
}

struct RaceState {
    started: Instant,
    deadline: Option<Instant>,
    detector: ReadinessDetector,
    output: OutputBuffer,
    stdout_closed_at: Option<Instant>,
    closed_streams: usize,
    pumps_done: bool,
}

impl RaceState {
    fn new(timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started.checked_add(timeout),
            detector: ReadinessDetector::new(),
            output: OutputBuffer::default(),
            stdout_closed_at: None,
            closed_streams: 0,
            pumps_done: false,
        }
    }

    fn remaining(&self, now: Instant) -> Duration {
        self.deadline
            .map_or(POLL_INTERVAL, |deadline| deadline.saturating_duration_since(now))
    }

    /// Records one event and reports whether it completed readiness.
    fn apply(&mut self, event: ProcessEvent) -> bool {
        match event {
            ProcessEvent::Output(chunk) => {
                let ready = chunk.stream() == OutputStream::Stdout
                    && self.stdout_closed_at.is_none()
                    && self.detector.observe(chunk.content());
                self.output.push(chunk);
                ready
            }
            ProcessEvent::Closed(stream) => {
                self.closed_streams += 1;
                if stream == OutputStream::Stdout {
                    debug!(target: RACE_TARGET, "stdout closed before readiness");
                    self.stdout_closed_at.get_or_insert_with(Instant::now);
                }
                false
            }
        }
    }

    /// Collects trailing output into the buffer without judging it, until both
    /// pipes close or `grace` elapses.
    fn drain(&mut self, events: &Receiver<ProcessEvent>, grace: Duration) {
        let until = Instant::now().checked_add(grace);
        while self.closed_streams < 2 && !self.pumps_done {
            let wait = until.map_or(Duration::MAX, |end| {
                end.saturating_duration_since(Instant::now())
            });
            match events.recv_timeout(wait) {
                Ok(ProcessEvent::Output(chunk)) => self.output.push(chunk),
                Ok(ProcessEvent::Closed(_)) => self.closed_streams += 1,
                Err(_) => break,
            }
        }
    }

    fn fail(self, cause: HarnessError) -> StartupFailure {
        debug!(
            target: RACE_TARGET,
            %cause,
            stage = ?self.detector.stage(),
            captured = self.output.chunks().len(),
            "start attempt failed"
        );
        StartupFailure {
            cause,
            output: self.output,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
