//! etrv2mqtt library.
//!
//! Scheduling and coordination core of a bridge between battery-powered
//! radiator valves and an MQTT broker, plus the adapters the binary wires
//! into it.  The core ([`app`], [`scheduler`], [`registry`], [`inbound`])
//! only talks to the outside world through the port traits in
//! [`app::ports`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod inbound;
pub mod registry;
pub mod scheduler;
