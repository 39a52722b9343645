//! Poll coordinator.
//!
//! Owns the three ways a valve gets read: the recurring cycle over every
//! valve, an ad-hoc poll of one valve, and an ad-hoc poll of all of them.
//! All three end up as jobs in the bridge's job table; this module decides
//! which job, and runs the per-device poll sequence when one comes due.
//!
//! ```text
//!   Idle ──▶ Polling ── read ok ───▶ publish state, "updated" ──▶ Idle
//!   (publish "updating")  └─ link error ──▶ "connection error" ──▶ Idle
//! ```
//!
//! The interval of the cycle is measured from the end of the previous
//! cycle: every poll-all, recurring or ad-hoc, finishes by re-inserting the
//! [`JobTag::PollCycle`] job relative to its completion time.

use core::time::Duration;

use log::{debug, error, info};

use crate::app::commands::{JobAction, JobTag, PollTarget};
use crate::app::events::{DeviceStatus, Topics};
use crate::app::ports::{BusPort, Clock, ValvePort};
use crate::error::{Error, LinkError, Result};
use crate::registry::{DeviceEntry, DeviceRegistry};
use crate::scheduler::{JobId, JobKind, JobTable};

/// Delay before an accepted ad-hoc poll becomes due (i.e. the next tick).
pub const ADHOC_POLL_DELAY: Duration = Duration::from_secs(1);

pub type BridgeJobs = JobTable<JobTag, JobAction>;

#[derive(Debug, Clone)]
pub struct PollCoordinator {
    interval: Duration,
    stay_connected: bool,
}

impl PollCoordinator {
    pub fn new(interval: Duration, stay_connected: bool) -> Self {
        Self {
            interval,
            stay_connected,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Schedule the recurring cycle, first due one interval from `now`.
    pub fn start(&self, jobs: &mut BridgeJobs, now: Duration) -> JobId {
        info!("Poll cycle every {:?}", self.interval);
        self.restart_cycle(jobs, now)
    }

    /// Accept or reject an ad-hoc poll request.
    ///
    /// An accepted request replaces any pending ad-hoc poll with the same
    /// target.  Unknown devices and targets that are already being polled
    /// are rejected without touching the table.
    pub fn request<D>(
        &self,
        jobs: &mut BridgeJobs,
        now: Duration,
        registry: &DeviceRegistry<D>,
        target: PollTarget,
    ) -> Result<JobId> {
        match target {
            PollTarget::All => {
                if registry.is_polling_all() {
                    return Err(Error::SchedulingConflict(target.to_string()));
                }
                debug!("Scheduling poll of all devices");
                Ok(jobs.replace(
                    now,
                    JobTag::PollAll,
                    JobKind::OneShot,
                    ADHOC_POLL_DELAY,
                    JobAction::PollAllOnce,
                ))
            }
            PollTarget::Device(topic) => {
                let state = registry
                    .lookup(&topic)
                    .ok_or_else(|| Error::UnknownDevice(topic.clone()))?;
                if state.is_polling() {
                    return Err(Error::SchedulingConflict(topic));
                }
                debug!("Scheduling poll of {}", topic);
                Ok(jobs.replace(
                    now,
                    JobTag::PollDevice(topic.clone()),
                    JobKind::OneShot,
                    ADHOC_POLL_DELAY,
                    JobAction::PollDevice(topic),
                ))
            }
        }
    }

    /// Read one valve and publish the result.  Link failures are reported
    /// on the bus and in the log, never returned.  Returns whether the read
    /// succeeded.
    pub fn poll_device<D, B>(&self, entry: &mut DeviceEntry<D>, bus: &mut B, topics: &Topics) -> bool
    where
        D: ValvePort,
        B: BusPort,
    {
        let topic = entry.topic().to_owned();
        entry.state().set_polling(true);
        debug!("Polling data from {}", topic);
        publish_status(bus, topics, &topic, DeviceStatus::Updating);

        let outcome = ensure_connected(entry.valve_mut()).and_then(|()| entry.valve_mut().read());

        match outcome {
            Ok(reading) => {
                debug!("{}: {:?}", topic, reading);
                bus.publish(&topics.state(&topic), &reading.to_payload(), false);
                entry.state().set_polling(false);
                publish_status(bus, topics, &topic, DeviceStatus::Updated);
                if !self.stay_connected {
                    entry.valve_mut().disconnect();
                }
                true
            }
            Err(e) => {
                entry.state().set_polling(false);
                publish_status(bus, topics, &topic, DeviceStatus::ConnectionError);
                error!("{}: poll failed: {}", topic, e);
                false
            }
        }
    }

    /// Poll every registered valve in topic order, then restart the
    /// recurring cycle from the completion time.
    pub fn poll_all<D, B, C>(
        &self,
        registry: &mut DeviceRegistry<D>,
        bus: &mut B,
        topics: &Topics,
        clock: &C,
        jobs: &mut BridgeJobs,
    ) -> usize
    where
        D: ValvePort,
        B: BusPort,
        C: Clock + ?Sized,
    {
        registry.set_polling_all(true);
        let mut ok = 0;
        for entry in registry.iter_mut() {
            if self.poll_device(entry, bus, topics) {
                ok += 1;
            }
        }
        registry.set_polling_all(false);
        info!("Polled {}/{} device(s)", ok, registry.len());

        self.restart_cycle(jobs, clock.now());
        ok
    }

    fn restart_cycle(&self, jobs: &mut BridgeJobs, now: Duration) -> JobId {
        jobs.replace(
            now,
            JobTag::PollCycle,
            JobKind::Recurring,
            self.interval,
            JobAction::PollCycle,
        )
    }
}

/// Open a valve session unless one is already up.
pub(crate) fn ensure_connected<D: ValvePort + ?Sized>(valve: &mut D) -> core::result::Result<(), LinkError> {
    if !valve.is_connected() {
        valve.connect()?;
    }
    Ok(())
}

/// Retained status annotation on `base/<device>/attributes`.
pub(crate) fn publish_status<B: BusPort + ?Sized>(
    bus: &mut B,
    topics: &Topics,
    device: &str,
    status: DeviceStatus,
) {
    bus.publish(&topics.attributes(device), &status.to_payload(), true);
}
