//! Unified error types for the bridge.
//!
//! Nothing in here is fatal: every variant is caught at the entry point that
//! produced it, logged, and (for link failures) surfaced to observers as a
//! transient status message.  The tick loop never sees an `Error`.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level bridge error
// ---------------------------------------------------------------------------

/// Every rejected request or failed device operation funnels into this type.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Wireless connect / read / write against a valve failed.
    Link(LinkError),
    /// A setpoint payload could not be parsed as a finite decimal number.
    MalformedCommand { topic: String, payload: String },
    /// The topic does not name a configured thermostat.
    UnknownDevice(String),
    /// A poll was requested while the same poll was still running.
    SchedulingConflict(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(e) => write!(f, "link: {e}"),
            Self::MalformedCommand { topic, payload } => {
                write!(f, "{topic}: {payload:?} is not a valid temperature")
            }
            Self::UnknownDevice(topic) => write!(f, "device {topic} not found"),
            Self::SchedulingConflict(target) => write!(f, "already polling {target}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Link errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// Could not establish a session with the valve.
    ConnectFailed,
    /// The session dropped or a characteristic read failed.
    ReadFailed,
    /// The setpoint write was not acknowledged.
    WriteFailed,
    /// The operation needs a session but the valve is not connected.
    Disconnected,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::ReadFailed => write!(f, "read failed"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::Disconnected => write!(f, "not connected"),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Bridge-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
