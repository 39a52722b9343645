//! Application core: scheduling and coordination, no direct I/O.
//!
//! This module decides when each valve is polled, how bursts of setpoint
//! commands are coalesced, and what happens while the bus is down.  All
//! interaction with valves, the message bus and time happens through the
//! **port traits** in [`ports`], so the core runs unchanged against the
//! mock adapters in the test suite.

pub mod commands;
pub mod debounce;
pub mod events;
pub mod gate;
pub mod poll;
pub mod ports;
pub mod service;
