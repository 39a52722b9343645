//! Connection gate.
//!
//! Decides, once per tick, whether jobs may run.  Job actions publish their
//! results, and a publish while the broker session is down is silently
//! lost, so nothing runs while disconnected.  On the way back up the gate
//! asks for a replay of every pending job so work accumulated while offline
//! is applied immediately instead of at its natural due time.
//!
//! ```text
//!   ┌──────────────┐  connected: Replay   ┌──────────────┐
//!   │ Disconnected │ ───────────────────▶ │  Connected   │ ──┐ connected:
//!   │    (Hold)    │ ◀─────────────────── │              │ ◀─┘ RunDue
//!   └──────────────┘   !connected: Hold   └──────────────┘
//! ```
//!
//! There is no push notification: the bus adapter's connectivity flag is
//! sampled every tick.

use core::time::Duration;

use log::{info, warn};

/// Tick period while the bus is up.
pub const CONNECTED_TICK: Duration = Duration::from_secs(1);

/// Tick period while the bus is down (slower; nothing runs anyway).
pub const DISCONNECTED_TICK: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Disconnected,
    Connected,
}

/// What the tick loop should do this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Bus down: run nothing.
    Hold,
    /// Bus up: run due jobs.
    RunDue,
    /// Bus just came up: run every job once, then due jobs.
    Replay,
}

#[derive(Debug)]
pub struct ConnectionGate {
    state: GateState,
}

impl Default for ConnectionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionGate {
    pub fn new() -> Self {
        Self {
            state: GateState::Disconnected,
        }
    }

    /// Feed this tick's connectivity sample and get the decision.
    pub fn observe(&mut self, connected: bool) -> GateDecision {
        match (self.state, connected) {
            (GateState::Disconnected, true) => {
                info!("Gate: bus connected, replaying pending jobs");
                self.state = GateState::Connected;
                GateDecision::Replay
            }
            (GateState::Connected, true) => GateDecision::RunDue,
            (GateState::Connected, false) => {
                warn!("Gate: bus connection lost, holding jobs");
                self.state = GateState::Disconnected;
                GateDecision::Hold
            }
            (GateState::Disconnected, false) => GateDecision::Hold,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == GateState::Connected
    }

    /// How long the tick loop sleeps before the next sample.
    pub fn tick_interval(&self) -> Duration {
        match self.state {
            GateState::Connected => CONNECTED_TICK,
            GateState::Disconnected => DISCONNECTED_TICK,
        }
    }
}
