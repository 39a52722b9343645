//! Bridge service: the tick loop that drives the scheduling core.
//!
//! [`BridgeService`] owns the job table, the connection gate and the
//! request queue.  Everything a job touches when it runs (valves, bus,
//! clock, coordinators) lives in the [`Engine`], which the job table calls
//! back through [`JobRunner`].  All I/O flows through port traits, so the
//! whole loop runs against mock adapters in tests.
//!
//! ```text
//!  RequestQueue ──▶ ┌──────────────────────────┐ ──▶ BusPort
//!                   │      BridgeService        │
//!     BusPort ────▶ │ Gate · JobTable · Engine  │ ◀─▶ ValvePort (×N)
//!  (connectivity)   └──────────────────────────┘
//! ```
//!
//! One tick:
//! 1. drain inbound requests into the job table,
//! 2. sample bus connectivity through the gate,
//! 3. while connected: replay every job if asked to, then run due jobs,
//! 4. report how long to sleep before the next tick.

use core::time::Duration;

use log::{info, warn};

use crate::inbound::{BirthMessage, Intake, RequestQueue};
use crate::registry::DeviceRegistry;
use crate::scheduler::{JobOutcome, JobRunner, JobTable};

use super::commands::{JobAction, JobTag, Request};
use super::debounce::DebounceCoordinator;
use super::events::Topics;
use super::gate::{ConnectionGate, GateDecision};
use super::poll::{BridgeJobs, PollCoordinator};
use super::ports::{BusPort, Clock, ValvePort};

/// Runtime parameters of the scheduling core.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    /// Bus topic prefix.
    pub base_topic: String,
    /// Recurring poll interval, measured from the end of the previous cycle.
    pub poll_interval: Duration,
    /// Quiet period before a setpoint is written.
    pub debounce_window: Duration,
    /// Keep the valve session open after a poll.
    pub stay_connected: bool,
    /// Gap between successive jobs during a replay.
    pub replay_stagger: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_topic: "etrv".into(),
            poll_interval: Duration::from_secs(3600),
            debounce_window: Duration::from_secs(5),
            stay_connected: false,
            replay_stagger: Duration::from_secs(1),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Engine (job execution)
// ───────────────────────────────────────────────────────────────

/// Executes job actions against the registered valves.
pub struct Engine<D, B, C> {
    registry: DeviceRegistry<D>,
    bus: B,
    clock: C,
    topics: Topics,
    poll: PollCoordinator,
    debounce: DebounceCoordinator,
}

impl<D, B, C> JobRunner<JobTag, JobAction> for Engine<D, B, C>
where
    D: ValvePort,
    B: BusPort,
    C: Clock,
{
    fn run(&mut self, action: &JobAction, jobs: &mut BridgeJobs) -> JobOutcome {
        match action {
            JobAction::PollCycle => {
                self.poll
                    .poll_all(&mut self.registry, &mut self.bus, &self.topics, &self.clock, jobs);
                JobOutcome::Keep
            }
            JobAction::PollAllOnce => {
                self.poll
                    .poll_all(&mut self.registry, &mut self.bus, &self.topics, &self.clock, jobs);
                JobOutcome::Remove
            }
            JobAction::PollDevice(topic) => {
                match self.registry.entry_mut(topic) {
                    Some(entry) => {
                        self.poll.poll_device(entry, &mut self.bus, &self.topics);
                    }
                    None => warn!("Device {} not found", topic),
                }
                JobOutcome::Remove
            }
            JobAction::ApplySetpoint { topic, celsius } => {
                match self.registry.entry_mut(topic) {
                    Some(entry) => {
                        self.debounce
                            .apply(entry, *celsius, &self.poll, &mut self.bus, &self.topics);
                    }
                    None => warn!("Device {} not found", topic),
                }
                JobOutcome::Remove
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// BridgeService
// ───────────────────────────────────────────────────────────────

pub struct BridgeService<D, B, C> {
    jobs: JobTable<JobTag, JobAction>,
    gate: ConnectionGate,
    queue: RequestQueue,
    replay_requested: bool,
    replay_stagger: Duration,
    clock: C,
    engine: Engine<D, B, C>,
    tick_count: u64,
}

impl<D, B, C> BridgeService<D, B, C>
where
    D: ValvePort,
    B: BusPort,
    C: Clock + Clone,
{
    /// Build the service and schedule the recurring poll cycle.
    ///
    /// The first cycle is due one interval from now; the replay on the
    /// first bus connection runs it right away.
    pub fn new(settings: ServiceSettings, registry: DeviceRegistry<D>, bus: B, clock: C) -> Self {
        let poll = PollCoordinator::new(settings.poll_interval, settings.stay_connected);
        let mut jobs = JobTable::new();
        poll.start(&mut jobs, clock.now());

        info!(
            "BridgeService started with {} device(s) under {}/",
            registry.len(),
            settings.base_topic
        );

        Self {
            jobs,
            gate: ConnectionGate::new(),
            queue: RequestQueue::new(),
            replay_requested: false,
            replay_stagger: settings.replay_stagger,
            clock: clock.clone(),
            engine: Engine {
                registry,
                bus,
                clock,
                topics: Topics::new(settings.base_topic),
                poll,
                debounce: DebounceCoordinator::new(settings.debounce_window),
            },
            tick_count: 0,
        }
    }

    /// Router for the bus delivery thread, wired to this service's queue
    /// and polling flags.
    pub fn intake(&self, birth: BirthMessage) -> Intake {
        Intake::new(
            self.engine.topics.clone(),
            birth,
            self.engine.registry.view(),
            self.queue.clone(),
        )
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one tick and return how long to sleep before the next.
    pub fn tick(&mut self) -> Duration {
        self.tick_count += 1;
        self.drain_requests();

        let decision = self.gate.observe(self.engine.bus.is_connected());
        if decision == GateDecision::Hold {
            return self.gate.tick_interval();
        }

        if decision == GateDecision::Replay || self.replay_requested {
            self.replay_requested = false;
            self.jobs
                .run_all(self.replay_stagger, &self.clock, &mut self.engine);
        }
        self.jobs.run_due(&self.clock, &mut self.engine);

        self.gate.tick_interval()
    }

    /// Tick forever.  Nothing in the core is fatal.
    pub fn run_forever(&mut self) -> ! {
        loop {
            let pause = self.tick();
            self.clock.sleep(pause);
        }
    }

    /// Interpret one request immediately (normally called from the drain).
    pub fn handle_request(&mut self, request: Request) {
        let now = self.clock.now();
        let engine = &self.engine;
        let result = match request {
            Request::SetPoint { topic, celsius } => engine
                .debounce
                .request(&mut self.jobs, now, &engine.registry, &topic, celsius)
                .map(drop),
            Request::Poll(target) => engine
                .poll
                .request(&mut self.jobs, now, &engine.registry, target)
                .map(drop),
            Request::Replay => {
                info!("Replay requested");
                self.replay_requested = true;
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!("Request rejected: {}", e);
        }
    }

    fn drain_requests(&mut self) {
        let queue = self.queue.clone();
        queue.drain(|request| self.handle_request(request));
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn jobs(&self) -> &JobTable<JobTag, JobAction> {
        &self.jobs
    }

    pub fn registry(&self) -> &DeviceRegistry<D> {
        &self.engine.registry
    }

    pub fn registry_mut(&mut self) -> &mut DeviceRegistry<D> {
        &mut self.engine.registry
    }

    pub fn bus(&self) -> &B {
        &self.engine.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.engine.bus
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    pub fn topics(&self) -> &Topics {
        &self.engine.topics
    }

    pub fn is_connected(&self) -> bool {
        self.gate.is_connected()
    }

    /// Ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}
