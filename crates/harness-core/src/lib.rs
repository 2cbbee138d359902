//! Lifecycle management for a network service used as a test fixture.
//!
//! [`AppController`] starts the service (or attaches to one that is already
//! running), decides when it is ready by watching its standard output for an
//! ordered series of markers, routes test requests to it, and tears down the
//! whole process tree when the test is done.
//!
//! The crate is split into focused modules:
//! - [`controller`] drives the start, fetch, and shutdown flows.
//! - [`readiness`] holds the staged marker matcher.
//! - [`race`] combines readiness, process exit, and the startup deadline.
//! - [`process`] spawns the service and terminates its descendants.
//! - [`fetch`] normalises requests against the target origin.
//!
//! ```no_run
//! use harness_core::{AppController, StartOptions};
//!
//! let mut controller = AppController::new()?;
//! controller.start(&StartOptions::new().with_app_root("./fixtures/app"))?;
//! let response = controller.fetch("/")?;
//! assert!(response.status().is_success());
//! controller.shutdown()?;
//! # Ok::<(), harness_core::HarnessError>(())
//! ```

mod app_root;
pub mod controller;
mod error;
pub mod fetch;
pub mod process;
pub mod race;
pub mod readiness;
mod target;
#[cfg(test)]
mod tests;

pub use app_root::resolve_app_root;
pub use controller::{AppController, StartOptions};
pub use error::{HarnessError, TransportError};
pub use fetch::{
    FetchInput, FetchRequest, HttpClient, ReqwestClient, ReqwestResponse, ResolvedRequest,
};
pub use process::{
    DiagnosticSink, ExitProbe, ManagedProcess, OutputBuffer, OutputChunk, OutputStream,
    ProcessEvent, ProcessExit, TracingSink,
};
pub use race::{StartupFailure, StartupRace};
pub use readiness::{ReadinessDetector, ReadinessStage};
pub use target::{StartMode, Target, parse_origin};
