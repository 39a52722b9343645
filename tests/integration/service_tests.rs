//! End-to-end tests for the bus → intake → tick loop → valve pipeline.
//!
//! Every test drives a real [`BridgeService`] with mock adapters on a
//! manual clock, delivering bus messages through the same [`Intake`] the
//! MQTT event loop uses.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use etrv2mqtt::app::commands::JobTag;
use etrv2mqtt::app::ports::Clock;
use etrv2mqtt::app::service::{BridgeService, ServiceSettings};
use etrv2mqtt::error::Error;
use etrv2mqtt::inbound::{BirthMessage, Intake, QUEUE_DEPTH};
use etrv2mqtt::registry::DeviceRegistry;

use crate::mock_hw::{Fault, ManualClock, MockBus, MockValve};

type Service = BridgeService<MockValve, MockBus, ManualClock>;

const fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

struct Rig {
    svc: Service,
    clock: ManualClock,
    intake: Intake,
}

impl Rig {
    fn new(settings: ServiceSettings, valves: Vec<(&str, MockValve)>, clock: ManualClock) -> Self {
        let mut registry = DeviceRegistry::new();
        for (topic, valve) in valves {
            registry.insert(topic, valve);
        }
        let bus = MockBus::new(&clock);
        let svc = BridgeService::new(settings, registry, bus, clock.clone());
        let intake = svc.intake(BirthMessage {
            topic: "homeassistant/status".into(),
            payload: "online".into(),
        });
        Self { svc, clock, intake }
    }

    fn kitchen(settings: ServiceSettings) -> Self {
        let clock = ManualClock::new();
        let valve = MockValve::new(&clock);
        Self::new(settings, vec![("kitchen", valve)], clock)
    }

    /// Tick (sleeping the returned pause each time) through time `t`.
    fn run_through(&mut self, t: u64) {
        while self.clock.now() <= secs(t) {
            let pause = self.svc.tick();
            self.clock.sleep(pause);
        }
    }

    fn send(&self, topic: &str, payload: &str) {
        self.intake.on_message(topic, payload.as_bytes());
    }

    fn valve(&self, topic: &str) -> &MockValve {
        self.svc.registry().entry(topic).unwrap().valve()
    }

    fn valve_mut(&mut self, topic: &str) -> &mut MockValve {
        self.svc.registry_mut().entry_mut(topic).unwrap().valve_mut()
    }

    fn bus(&self) -> &MockBus {
        self.svc.bus()
    }
}

fn with_interval(poll_secs: u64) -> ServiceSettings {
    ServiceSettings {
        poll_interval: secs(poll_secs),
        ..ServiceSettings::default()
    }
}

// ── Recurring poll ────────────────────────────────────────────

#[test]
fn first_connection_polls_then_every_interval_after_completion() {
    let mut rig = Rig::kitchen(with_interval(300));

    rig.run_through(0);
    let sequence: Vec<_> = rig
        .bus()
        .published
        .iter()
        .map(|p| (p.at, p.topic.as_str(), p.retain))
        .collect();
    assert_eq!(
        sequence,
        [
            (secs(0), "etrv/kitchen/attributes", true),
            (secs(0), "etrv/kitchen/state", false),
            (secs(0), "etrv/kitchen/attributes", true),
        ]
    );
    assert_eq!(
        rig.bus().statuses("etrv/kitchen/attributes"),
        ["updating", "updated"]
    );

    rig.run_through(299);
    assert_eq!(rig.valve("kitchen").read_secs(), [0]);
    rig.run_through(600);
    assert_eq!(rig.valve("kitchen").read_secs(), [0, 300, 600]);
}

#[test]
fn slow_cycle_reschedules_from_completion() {
    let clock = ManualClock::new();
    let valve = MockValve::new(&clock).with_cost(secs(65));
    let mut rig = Rig::new(with_interval(60), vec![("kitchen", valve)], clock);

    rig.run_through(0);
    assert_eq!(rig.svc.jobs().next_due(&JobTag::PollCycle), Some(secs(125)));

    rig.run_through(200);
    assert_eq!(rig.valve("kitchen").read_secs(), [0, 125]);
}

#[test]
fn state_payload_carries_reading() {
    let mut rig = Rig::kitchen(with_interval(300));
    rig.run_through(0);

    let state = rig.bus().on_topic("etrv/kitchen/state");
    let json: serde_json::Value = serde_json::from_str(&state[0].payload).unwrap();
    assert_eq!(json["name"], "eTRV");
    assert_eq!(json["battery"], 80);
    assert_eq!(json["set_point"], 20.0);
    assert_eq!(json["last_update"], "2023-11-14T22:13:20Z");
}

#[test]
fn valve_disconnected_after_poll_unless_stay_connected() {
    let mut rig = Rig::kitchen(ServiceSettings::default());
    rig.run_through(0);
    assert!(!rig.valve("kitchen").connected);
    assert_eq!(rig.valve("kitchen").disconnects, 1);

    let mut rig = Rig::kitchen(ServiceSettings {
        stay_connected: true,
        ..ServiceSettings::default()
    });
    rig.run_through(0);
    assert!(rig.valve("kitchen").connected);
    assert_eq!(rig.valve("kitchen").disconnects, 0);
}

// ── Debounce ──────────────────────────────────────────────────

#[test]
fn setpoint_burst_writes_last_value_once() {
    let mut rig = Rig::kitchen(ServiceSettings::default());
    rig.run_through(0);

    rig.send("etrv/kitchen/set", "21.5");
    rig.run_through(1);
    rig.send("etrv/kitchen/set", "22.0");
    rig.run_through(20);

    assert_eq!(rig.valve("kitchen").writes, [(secs(7), 22.0)]);
    // The write is confirmed by a poll.
    assert_eq!(rig.valve("kitchen").read_secs(), [0, 7]);
    assert_eq!(
        rig.bus().statuses("etrv/kitchen/attributes"),
        ["updating", "updated", "updating", "updated"]
    );
    assert_eq!(rig.svc.jobs().len(), 1);
}

#[test]
fn setpoint_flood_during_busy_tick_keeps_last_value() {
    let mut rig = Rig::kitchen(ServiceSettings::default());
    rig.run_through(0);

    // The slider keeps moving while the tick loop is stuck in a valve read.
    let intake = rig.intake.clone();
    let mut flooded = false;
    rig.valve_mut("kitchen").during_read = Some(Box::new(move || {
        if flooded {
            return;
        }
        flooded = true;
        for value in 10..(10 + 2 * QUEUE_DEPTH) {
            intake.on_message("etrv/kitchen/set", value.to_string().as_bytes());
        }
        intake.on_message("etrv/all/poll", b"");
    }));

    rig.send("etrv/kitchen/poll", "");
    rig.run_through(30);

    let last = (10 + 2 * QUEUE_DEPTH - 1) as f32;
    assert_eq!(rig.valve("kitchen").writes, [(secs(8), last)]);
    // Ad-hoc poll at 2, poll-all queued behind the flood at 4, confirming
    // poll after the write at 8.
    assert_eq!(rig.valve("kitchen").read_secs(), [0, 2, 4, 8]);
    assert!(rig.svc.queue().is_empty());
}

#[test]
fn failed_write_reports_connection_error_without_poll() {
    let clock = ManualClock::new();
    let valve = MockValve::new(&clock).with_fault(Fault::Write);
    let mut rig = Rig::new(ServiceSettings::default(), vec![("kitchen", valve)], clock);
    rig.run_through(0);

    rig.send("etrv/kitchen/set", "21");
    rig.run_through(10);

    assert!(rig.valve("kitchen").writes.is_empty());
    assert_eq!(rig.valve("kitchen").read_secs(), [0]);
    assert_eq!(
        rig.bus().statuses("etrv/kitchen/attributes"),
        ["updating", "updated", "connection error"]
    );
}

// ── Ad-hoc polls ──────────────────────────────────────────────

#[test]
fn duplicate_poll_during_poll_is_rejected() {
    let mut rig = Rig::kitchen(ServiceSettings::default());
    rig.run_through(0);

    let rejections = Rc::new(RefCell::new(Vec::new()));
    let intake = rig.intake.clone();
    let seen = Rc::clone(&rejections);
    rig.valve_mut("kitchen").during_read = Some(Box::new(move || {
        seen.borrow_mut().push(intake.route("etrv/kitchen/poll", b""));
        intake.on_message("etrv/kitchen/poll", b"");
    }));

    rig.send("etrv/kitchen/poll", "");
    rig.run_through(30);

    assert_eq!(rig.valve("kitchen").read_secs(), [0, 2]);
    let rejections = rejections.borrow();
    assert_eq!(rejections.len(), 1);
    assert!(matches!(
        &rejections[0],
        Err(Error::SchedulingConflict(target)) if target == "kitchen"
    ));
    assert!(rig.svc.queue().is_empty());
    assert_eq!(rig.bus().on_topic("etrv/kitchen/state").len(), 2);
}

#[test]
fn poll_all_restarts_cycle_countdown() {
    let clock = ManualClock::new();
    let valves = vec![
        ("bedroom", MockValve::new(&clock)),
        ("kitchen", MockValve::new(&clock)),
    ];
    let mut rig = Rig::new(with_interval(300), valves, clock);
    rig.run_through(99);

    rig.send("etrv/all/poll", "");
    rig.run_through(101);
    assert_eq!(rig.valve("bedroom").read_secs(), [0, 101]);
    assert_eq!(rig.valve("kitchen").read_secs(), [0, 101]);
    assert_eq!(rig.svc.jobs().next_due(&JobTag::PollCycle), Some(secs(401)));

    rig.run_through(401);
    assert_eq!(rig.valve("kitchen").read_secs(), [0, 101, 401]);
}

#[test]
fn invalid_requests_schedule_nothing() {
    let mut rig = Rig::kitchen(ServiceSettings::default());
    rig.run_through(0);

    rig.send("etrv/attic/set", "20");
    rig.send("etrv/attic/poll", "");
    rig.send("etrv/kitchen/set", "warm");
    rig.send("etrv/kitchen/state", "{}");
    assert!(rig.svc.queue().is_empty());

    rig.run_through(60);
    assert_eq!(rig.svc.jobs().len(), 1);
    assert!(rig.valve("kitchen").writes.is_empty());
    assert_eq!(rig.valve("kitchen").read_secs(), [0]);
}

// ── Link failures ─────────────────────────────────────────────

#[test]
fn failing_valve_does_not_stop_others() {
    let clock = ManualClock::new();
    let valves = vec![
        ("bedroom", MockValve::new(&clock).with_fault(Fault::Connect)),
        ("kitchen", MockValve::new(&clock)),
    ];
    let mut rig = Rig::new(ServiceSettings::default(), valves, clock);
    rig.run_through(0);

    assert_eq!(
        rig.bus().statuses("etrv/bedroom/attributes"),
        ["updating", "connection error"]
    );
    assert!(rig.bus().on_topic("etrv/bedroom/state").is_empty());
    assert!(!rig.svc.registry().lookup("bedroom").unwrap().is_polling());
    assert_eq!(
        rig.bus().statuses("etrv/kitchen/attributes"),
        ["updating", "updated"]
    );
}

// ── Connectivity ──────────────────────────────────────────────

#[test]
fn nothing_runs_while_offline() {
    let clock = ManualClock::new();
    let mut registry = DeviceRegistry::new();
    registry.insert("kitchen", MockValve::new(&clock));
    let mut svc = BridgeService::new(
        with_interval(5),
        registry,
        MockBus::offline(&clock),
        clock.clone(),
    );

    for _ in 0..10 {
        let pause = svc.tick();
        assert_eq!(pause, secs(2));
        clock.sleep(pause);
    }
    assert!(!svc.is_connected());
    assert!(svc.registry().entry("kitchen").unwrap().valve().reads.is_empty());
    assert_eq!(svc.bus().dropped, 0);

    // Overdue since t=5; replayed on the first connected tick.
    svc.bus_mut().connected = true;
    assert_eq!(svc.tick(), secs(1));
    assert_eq!(
        svc.registry().entry("kitchen").unwrap().valve().read_secs(),
        [20]
    );
}

#[test]
fn reconnect_replays_every_pending_job_once() {
    let mut rig = Rig::kitchen(ServiceSettings::default());
    rig.run_through(0);

    rig.send("etrv/kitchen/set", "23");
    rig.run_through(1);
    rig.svc.bus_mut().connected = false;
    rig.run_through(30);

    assert!(rig.valve("kitchen").writes.is_empty());
    assert_eq!(rig.valve("kitchen").read_secs(), [0]);
    assert_eq!(rig.clock.secs(), 32);

    rig.svc.bus_mut().connected = true;
    rig.run_through(32);

    // Poll cycle at 32, then the setpoint one stagger later.
    assert_eq!(rig.valve("kitchen").writes, [(secs(33), 23.0)]);
    assert_eq!(rig.valve("kitchen").read_secs(), [0, 32, 33]);
    assert_eq!(rig.svc.jobs().len(), 1);
    assert_eq!(
        rig.svc.jobs().next_due(&JobTag::PollCycle),
        Some(secs(32 + 3600))
    );
}

#[test]
fn birth_message_triggers_replay() {
    let mut rig = Rig::kitchen(ServiceSettings::default());
    rig.run_through(0);

    rig.send("homeassistant/status", "offline");
    rig.run_through(5);
    assert_eq!(rig.valve("kitchen").read_secs(), [0]);

    rig.send("homeassistant/status", "online");
    rig.run_through(6);
    assert_eq!(rig.valve("kitchen").read_secs(), [0, 6]);
}

#[test]
fn birth_while_offline_replays_once_on_reconnect() {
    let mut rig = Rig::kitchen(ServiceSettings::default());
    rig.run_through(0);

    rig.svc.bus_mut().connected = false;
    rig.send("homeassistant/status", "online");
    rig.run_through(10);
    assert!(rig.svc.queue().is_empty());
    assert_eq!(rig.valve("kitchen").read_secs(), [0]);
    assert_eq!(rig.clock.secs(), 11);

    // Reconnect edge and pending birth replay collapse into one pass.
    rig.svc.bus_mut().connected = true;
    rig.run_through(30);
    assert_eq!(rig.valve("kitchen").read_secs(), [0, 11]);
    assert_eq!(
        rig.svc.jobs().next_due(&JobTag::PollCycle),
        Some(secs(11 + 3600))
    );
}
