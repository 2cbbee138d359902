//! Captured process output and its diagnostic replay.

use std::fmt;

use tracing::warn;

const DIAGNOSTICS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::diagnostics");

/// Which standard stream a line arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => formatter.write_str("stdout"),
            Self::Stderr => formatter.write_str("stderr"),
        }
    }
}

/// One line of captured output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    content: String,
    stream: OutputStream,
}

impl OutputChunk {
    /// Builds a chunk from a line of text.
    pub fn new(stream: OutputStream, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            stream,
        }
    }

    /// Line content without the trailing newline.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Stream the line arrived on.
    pub const fn stream(&self) -> OutputStream {
        self.stream
    }
}

/// Chronological record of everything a start attempt printed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OutputBuffer {
    chunks: Vec<OutputChunk>,
}

impl OutputBuffer {
    /// Appends a chunk in arrival order.
    pub fn push(&mut self, chunk: OutputChunk) {
        self.chunks.push(chunk);
    }

    /// Captured chunks, oldest first.
    pub fn chunks(&self) -> &[OutputChunk] {
        &self.chunks
    }
}

/// Receives captured output when a start attempt fails.
///
/// The controller calls [`DiagnosticSink::replay`] at most once per failed
/// start and never on success.
pub trait DiagnosticSink {
    /// Emits the captured chunks in the order they arrived.
    fn replay(&self, chunks: &[OutputChunk]);
}

/// Replays captured output as `warn` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn replay(&self, chunks: &[OutputChunk]) {
        if chunks.is_empty() {
            return;
        }
        warn!(
            target: DIAGNOSTICS_TARGET,
            lines = chunks.len(),
            "application output before failure follows"
        );
        for chunk in chunks {
            warn!(
                target: DIAGNOSTICS_TARGET,
                stream = %chunk.stream(),
                "{}",
                chunk.content()
            );
        }
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for &S {
    fn replay(&self, chunks: &[OutputChunk]) {
        (**self).replay(chunks);
    }
}
