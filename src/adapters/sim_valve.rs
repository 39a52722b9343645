//! Simulated radiator valve.
//!
//! Host-side stand-in for a Bluetooth valve so the bridge can run end to
//! end without radio hardware.  Behaviour is deterministic: every 10th link
//! attempt fails, which exercises the retry path and, once `retry_limit`
//! attempts in a row fail, the `connection error` status.  A valve whose
//! secret key is all zeros was never paired and refuses every connect.

use chrono::Utc;
use log::{debug, info, warn};

use crate::app::events::ValveReading;
use crate::app::ports::ValvePort;
use crate::error::LinkError;

pub struct SimulatedValve {
    name: String,
    address: [u8; 6],
    secret_key: [u8; 16],
    retry_limit: u32,
    connected: bool,
    /// Counts link attempts for deterministic failures.
    attempt_counter: u32,
    battery: u8,
    room_temp: f32,
    set_point: f32,
}

impl SimulatedValve {
    pub fn new(
        name: impl Into<String>,
        address: [u8; 6],
        secret_key: [u8; 16],
        retry_limit: u32,
    ) -> Self {
        Self {
            name: name.into(),
            address,
            secret_key,
            retry_limit: retry_limit.max(1),
            connected: false,
            attempt_counter: 0,
            battery: 100,
            room_temp: 19.5,
            set_point: 20.0,
        }
    }

    pub fn address(&self) -> String {
        self.address
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":")
    }

    pub fn is_paired(&self) -> bool {
        self.secret_key.iter().any(|&b| b != 0)
    }

    fn attempt(&mut self) -> bool {
        self.attempt_counter = self.attempt_counter.wrapping_add(1);
        if self.attempt_counter % 10 == 3 {
            warn!(
                "Valve(sim) {}: simulated link failure (attempt {})",
                self.name, self.attempt_counter
            );
            return false;
        }
        true
    }
}

impl ValvePort for SimulatedValve {
    fn connect(&mut self) -> Result<(), LinkError> {
        if !self.is_paired() {
            warn!("Valve(sim) {}: no secret key, not paired", self.name);
            return Err(LinkError::ConnectFailed);
        }
        for _ in 0..self.retry_limit {
            if self.attempt() {
                self.connected = true;
                info!("Valve(sim) {}: connected to {}", self.name, self.address());
                return Ok(());
            }
        }
        Err(LinkError::ConnectFailed)
    }

    fn disconnect(&mut self) {
        if self.connected {
            debug!("Valve(sim) {}: disconnected", self.name);
        }
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn read(&mut self) -> Result<ValveReading, LinkError> {
        if !self.connected {
            return Err(LinkError::Disconnected);
        }
        // Room drifts toward the target by a tenth of a degree per read.
        let delta = (self.set_point - self.room_temp).clamp(-0.1, 0.1);
        self.room_temp += delta;
        if self.attempt_counter % 25 == 0 {
            self.battery = self.battery.saturating_sub(1);
        }
        Ok(ValveReading {
            name: self.name.clone(),
            battery: self.battery,
            room_temp: self.room_temp,
            set_point: self.set_point,
            last_update: Utc::now(),
        })
    }

    fn write_set_point(&mut self, celsius: f32) -> Result<(), LinkError> {
        if !self.connected {
            return Err(LinkError::Disconnected);
        }
        self.set_point = celsius;
        Ok(())
    }
}
