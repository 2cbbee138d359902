//! Staged readiness detection over the target's standard output.
//!
//! The launcher interleaves its own log lines with output from nested
//! processes, so a single "listening" line is not trustworthy on its own. The
//! detector only reports ready after three markers have been seen in order.

use tracing::debug;

const READINESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::readiness");

/// Marker printed when the local server begins starting.
pub const SERVER_RUNNING_MARKER: &str = "Running local server";
/// Marker printed before the downstream listener's own output.
pub const COMMAND_OUTPUT_MARKER: &str = "INFO: Command output:";
/// Marker printed once the listener has bound its address.
pub const LISTENING_MARKER: &str = "INFO Listening on";

/// Progress through the readiness markers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadinessStage {
    /// No marker seen yet.
    #[default]
    Launching,
    /// The local server announced itself.
    ServerRunning,
    /// The downstream listener started printing.
    CommandOutput,
    /// The listener bound its address; the target is ready.
    Listening,
}

impl ReadinessStage {
    /// Marker that moves this stage forward, or `None` once ready.
    pub const fn next_marker(self) -> Option<&'static str> {
        match self {
            Self::Launching => Some(SERVER_RUNNING_MARKER),
            Self::ServerRunning => Some(COMMAND_OUTPUT_MARKER),
            Self::CommandOutput => Some(LISTENING_MARKER),
            Self::Listening => None,
        }
    }

    /// Applies one output line, advancing by at most one stage.
    pub fn advance(self, line: &str) -> Self {
        match self.next_marker() {
            Some(marker) if line.contains(marker) => self.successor(),
            _ => self,
        }
    }

    const fn successor(self) -> Self {
        match self {
            Self::Launching => Self::ServerRunning,
            Self::ServerRunning => Self::CommandOutput,
            Self::CommandOutput | Self::Listening => Self::Listening,
        }
    }

    /// Whether this is the terminal stage.
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Listening)
    }
}

/// Consumes standard output lines until the target is ready.
#[derive(Debug, Default, Clone)]
pub struct ReadinessDetector {
    stage: ReadinessStage,
}

impl ReadinessDetector {
    /// Creates a detector at [`ReadinessStage::Launching`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stage.
    pub const fn stage(&self) -> ReadinessStage {
        self.stage
    }

    /// Whether every marker has been observed.
    pub const fn is_ready(&self) -> bool {
        self.stage.is_ready()
    }

    /// Feeds one line and returns `true` only for the line that completes
    /// readiness. Lines after that point are ignored.
    pub fn observe(&mut self, line: &str) -> bool {
        if self.stage.is_ready() {
            return false;
        }
        let next = self.stage.advance(line);
        if next == self.stage {
            return false;
        }
        debug!(
            target: READINESS_TARGET,
            from = ?self.stage,
            to = ?next,
            "readiness stage advanced"
        );
        self.stage = next;
        next.is_ready()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn feed(lines: &[&str]) -> (ReadinessDetector, usize) {
        let mut detector = ReadinessDetector::new();
        let fires = lines.iter().filter(|line| detector.observe(line)).count();
        (detector, fires)
    }

    #[test]
    fn ordered_markers_reach_ready_once() {
        let (detector, fires) = feed(&[
            "Running local server...",
            "INFO: Command output:",
            "2024-01-01 INFO Listening on http://127.0.0.1:7676",
        ]);
        assert!(detector.is_ready());
        assert_eq!(fires, 1);
    }

    #[rstest]
    #[case::out_of_order(&[COMMAND_OUTPUT_MARKER, SERVER_RUNNING_MARKER, LISTENING_MARKER])]
    #[case::skipping_middle(&[SERVER_RUNNING_MARKER, LISTENING_MARKER])]
    #[case::last_only(&[LISTENING_MARKER, LISTENING_MARKER])]
    fn markers_out_of_order_never_reach_ready(#[case] lines: &[&str]) {
        let (detector, fires) = feed(lines);
        assert!(!detector.is_ready());
        assert_eq!(fires, 0);
    }

    #[test]
    fn repeated_first_marker_does_not_double_advance() {
        let (detector, fires) = feed(&[
            SERVER_RUNNING_MARKER,
            SERVER_RUNNING_MARKER,
            COMMAND_OUTPUT_MARKER,
            LISTENING_MARKER,
        ]);
        assert!(detector.is_ready());
        assert_eq!(fires, 1);
    }

    #[test]
    fn unrelated_lines_are_ignored() {
        let (detector, _) = feed(&["compiling", SERVER_RUNNING_MARKER, "warning: unused"]);
        assert_eq!(detector.stage(), ReadinessStage::ServerRunning);
    }

    #[test]
    fn output_after_ready_is_not_consumed() {
        let (mut detector, _) = feed(&[
            SERVER_RUNNING_MARKER,
            COMMAND_OUTPUT_MARKER,
            LISTENING_MARKER,
        ]);
        assert!(!detector.observe(LISTENING_MARKER));
        assert!(!detector.observe(SERVER_RUNNING_MARKER));
        assert_eq!(detector.stage(), ReadinessStage::Listening);
    }

    #[test]
    fn stages_never_regress() {
        let mut detector = ReadinessDetector::new();
        detector.observe(SERVER_RUNNING_MARKER);
        detector.observe(COMMAND_OUTPUT_MARKER);
        let before = detector.stage();
        detector.observe(SERVER_RUNNING_MARKER);
        assert!(detector.stage() >= before);
    }
}
