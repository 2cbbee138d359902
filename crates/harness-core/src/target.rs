//! The logical target under test.

use url::Url;

use crate::error::HarnessError;

/// How the target was brought up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Nothing was spawned; the target is already running somewhere.
    Attached,
    /// The default serve command was launched inside the application root.
    CommandInDirectory,
    /// A caller-supplied command was launched.
    CustomCommand,
}

impl StartMode {
    /// Picks the mode from which start options were supplied.
    pub const fn select(has_command: bool, has_app_root: bool) -> Self {
        match (has_command, has_app_root) {
            (true, _) => Self::CustomCommand,
            (false, true) => Self::CommandInDirectory,
            (false, false) => Self::Attached,
        }
    }

    /// Whether this mode owns a spawned process.
    pub const fn spawns_process(self) -> bool {
        !matches!(self, Self::Attached)
    }
}

/// Origin and mode of the current start cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    origin: Url,
    mode: StartMode,
}

impl Target {
    pub(crate) const fn new(origin: Url, mode: StartMode) -> Self {
        Self { origin, mode }
    }

    /// Scheme, host, and port every request is resolved against.
    pub const fn origin(&self) -> &Url {
        &self.origin
    }

    /// How the target was started.
    pub const fn mode(&self) -> StartMode {
        self.mode
    }
}

/// Parses `addr` into an origin URL with an explicit host and port.
///
/// Any path, query, or fragment is discarded.
///
/// # Errors
///
/// Returns [`HarnessError::InvalidAddress`] when `addr` is not an absolute
/// URL with a host and a known port.
pub fn parse_origin(addr: &str) -> Result<Url, HarnessError> {
    let invalid = |reason: String| HarnessError::InvalidAddress {
        addr: addr.to_owned(),
        reason,
    };
    let url = Url::parse(addr).map_err(|error| invalid(error.to_string()))?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid(String::from("address has no host")));
    }
    if url.port_or_known_default().is_none() {
        return Err(invalid(String::from("address has no port")));
    }
    Url::parse(&url.origin().ascii_serialization()).map_err(|error| invalid(error.to_string()))
}
