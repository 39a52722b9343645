//! Inbound requests to the scheduling core.
//!
//! Requests are produced by [`Intake`](crate::inbound::Intake) on the bus
//! delivery thread, queued, and interpreted by the
//! [`BridgeService`](super::service::BridgeService) at the start of each
//! tick.  Accepted requests become [`JobAction`]s in the job table.

use core::fmt;

/// Wildcard device segment meaning "every configured valve".
pub const POLL_ALL_SEGMENT: &str = "all";

/// What an ad-hoc poll request targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollTarget {
    Device(String),
    All,
}

impl PollTarget {
    /// Interpret the device segment of a `base/<device>/poll` topic.
    pub fn from_segment(segment: &str) -> Self {
        if segment == POLL_ALL_SEGMENT {
            Self::All
        } else {
            Self::Device(segment.to_owned())
        }
    }
}

impl fmt::Display for PollTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(topic) => f.write_str(topic),
            Self::All => f.write_str("all devices"),
        }
    }
}

/// Requests that external adapters hand to the core.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Debounced setpoint change for one valve.
    SetPoint { topic: String, celsius: f32 },

    /// Poll one valve or all of them as soon as possible.
    Poll(PollTarget),

    /// Run every scheduled job once (automation platform came back).
    Replay,
}

// ───────────────────────────────────────────────────────────────
// Scheduled work
// ───────────────────────────────────────────────────────────────

/// Grouping key for jobs in the bridge's
/// [`JobTable`](crate::scheduler::JobTable).  Each tag labels at most one
/// job at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobTag {
    /// The recurring poll of every valve.
    PollCycle,
    /// Ad-hoc poll of every valve.
    PollAll,
    /// Ad-hoc poll of one valve.
    PollDevice(String),
    /// Pending (debounced) setpoint write for one valve.
    Setpoint(String),
}

/// Deferred work, executed by the service when its job comes due.
#[derive(Debug, Clone, PartialEq)]
pub enum JobAction {
    PollCycle,
    PollAllOnce,
    PollDevice(String),
    ApplySetpoint { topic: String, celsius: f32 },
}
