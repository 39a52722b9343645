//! Port traits — the hexagonal boundary between the scheduling core and
//! the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ BridgeService (scheduling core)
//! ```
//!
//! | Port        | Driven by the core to…                       |
//! |-------------|----------------------------------------------|
//! | `ValvePort` | connect / read / write one radiator valve    |
//! | `BusPort`   | publish state + status, query connectivity   |
//! | `Clock`     | read monotonic time, sleep the tick loop     |
//!
//! Inbound bus traffic does not cross these traits: it arrives on the bus
//! adapter's own thread and is handed over through
//! [`Intake`](crate::inbound::Intake).

use core::time::Duration;

use crate::app::events::ValveReading;
use crate::error::LinkError;

// ───────────────────────────────────────────────────────────────
// Valve port (driven adapter: domain ↔ wireless valve)
// ───────────────────────────────────────────────────────────────

/// Synchronous operations on a single radiator valve.
///
/// Calls block the tick loop for as long as the wireless link takes.
/// Retries and timeouts are the adapter's business; the core treats every
/// `Err` as a final [`LinkError`] for that attempt.
pub trait ValvePort {
    /// Open a session with the valve.
    fn connect(&mut self) -> Result<(), LinkError>;

    /// Close the session.  Never fails from the caller's point of view.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Read battery, temperatures and the device's own name in one
    /// atomic operation.
    fn read(&mut self) -> Result<ValveReading, LinkError>;

    /// Write a new target temperature in °C.
    fn write_set_point(&mut self, celsius: f32) -> Result<(), LinkError>;
}

// ───────────────────────────────────────────────────────────────
// Bus port (driven adapter: domain → message bus)
// ───────────────────────────────────────────────────────────────

/// Outbound side of the message bus.
pub trait BusPort {
    /// Whether the broker session is currently established.
    fn is_connected(&self) -> bool;

    /// Publish `payload` on `topic`.  Adapters drop the message (and log
    /// it) when disconnected; delivery failures never reach the core.
    fn publish(&mut self, topic: &str, payload: &str, retain: bool);
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic time source for scheduling.
///
/// `now()` is the time elapsed since an arbitrary fixed origin (process
/// start for the real adapter).  Tests substitute a manual clock whose
/// `sleep` simply advances `now`.
pub trait Clock {
    fn now(&self) -> Duration;

    fn sleep(&self, duration: Duration);
}
