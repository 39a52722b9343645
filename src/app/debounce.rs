//! Setpoint debouncing.
//!
//! A burst of setpoint requests for one valve collapses into a single write
//! of the last value, one debounce window after the last request.  Each
//! request clears the valve's pending [`JobTag::Setpoint`] job and inserts a
//! fresh one, so the countdown restarts every time.

use core::time::Duration;

use log::{error, info};

use crate::app::commands::{JobAction, JobTag};
use crate::app::events::{DeviceStatus, Topics};
use crate::app::poll::{BridgeJobs, PollCoordinator, ensure_connected, publish_status};
use crate::app::ports::{BusPort, ValvePort};
use crate::error::{Error, Result};
use crate::registry::{DeviceEntry, DeviceRegistry};
use crate::scheduler::{JobId, JobKind};

#[derive(Debug, Clone)]
pub struct DebounceCoordinator {
    window: Duration,
}

impl DebounceCoordinator {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Supersede any pending write for `topic` with `celsius`, due one
    /// window from `now`.
    pub fn request<D>(
        &self,
        jobs: &mut BridgeJobs,
        now: Duration,
        registry: &DeviceRegistry<D>,
        topic: &str,
        celsius: f32,
    ) -> Result<JobId> {
        if registry.lookup(topic).is_none() {
            return Err(Error::UnknownDevice(topic.to_owned()));
        }
        let tag = JobTag::Setpoint(topic.to_owned());
        if jobs.count_tag(&tag) > 0 {
            info!("{}: superseding pending setpoint with {}°C", topic, celsius);
        }
        Ok(jobs.replace(
            now,
            tag,
            JobKind::OneShot,
            self.window,
            JobAction::ApplySetpoint {
                topic: topic.to_owned(),
                celsius,
            },
        ))
    }

    /// Write `celsius` to the valve, then poll it so observers see the
    /// confirmed value.  A link failure skips the poll and is reported as a
    /// `connection error` status.
    pub fn apply<D, B>(
        &self,
        entry: &mut DeviceEntry<D>,
        celsius: f32,
        poll: &PollCoordinator,
        bus: &mut B,
        topics: &Topics,
    ) -> bool
    where
        D: ValvePort,
        B: BusPort,
    {
        let topic = entry.topic().to_owned();
        info!("Setting {} to {}°C", topic, celsius);

        let written = ensure_connected(entry.valve_mut())
            .and_then(|()| entry.valve_mut().write_set_point(celsius));
        match written {
            Ok(()) => poll.poll_device(entry, bus, topics),
            Err(e) => {
                error!("{}: setpoint write failed: {}", topic, e);
                publish_status(bus, topics, &topic, DeviceStatus::ConnectionError);
                false
            }
        }
    }
}
