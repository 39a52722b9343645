//! Mock adapters for integration tests.
//!
//! Records every valve and bus call so tests can assert on the full
//! history without radio hardware or a broker.  All of them share a
//! [`ManualClock`], so simulated link latency shows up on the scheduler's
//! timeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use etrv2mqtt::app::events::ValveReading;
use etrv2mqtt::app::ports::{BusPort, Clock, ValvePort};
use etrv2mqtt::error::LinkError;

// ── ManualClock ───────────────────────────────────────────────

/// Clock that only moves when slept on or advanced.  Clones share time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

#[allow(dead_code)]
impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn secs(&self) -> u64 {
        self.now().as_secs()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

// ── MockValve ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    Connect,
    Read,
    Write,
}

/// Scripted valve.  Each read and write costs `link_cost` on the clock.
pub struct MockValve {
    clock: ManualClock,
    pub link_cost: Duration,
    pub fault: Fault,
    pub connected: bool,
    pub set_point: f32,
    /// Clock time at the start of each read.
    pub reads: Vec<Duration>,
    /// Clock time and value of each write.
    pub writes: Vec<(Duration, f32)>,
    pub disconnects: usize,
    /// Runs in the middle of every read, e.g. to deliver bus traffic
    /// while the poll is in flight.
    pub during_read: Option<Box<dyn FnMut()>>,
}

#[allow(dead_code)]
impl MockValve {
    pub fn new(clock: &ManualClock) -> Self {
        Self {
            clock: clock.clone(),
            link_cost: Duration::ZERO,
            fault: Fault::None,
            connected: false,
            set_point: 20.0,
            reads: Vec::new(),
            writes: Vec::new(),
            disconnects: 0,
            during_read: None,
        }
    }

    pub fn with_cost(mut self, cost: Duration) -> Self {
        self.link_cost = cost;
        self
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = fault;
        self
    }

    pub fn read_secs(&self) -> Vec<u64> {
        self.reads.iter().map(Duration::as_secs).collect()
    }
}

impl ValvePort for MockValve {
    fn connect(&mut self) -> Result<(), LinkError> {
        if self.fault == Fault::Connect {
            return Err(LinkError::ConnectFailed);
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
        self.disconnects += 1;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn read(&mut self) -> Result<ValveReading, LinkError> {
        self.reads.push(self.clock.now());
        if let Some(hook) = self.during_read.as_mut() {
            hook();
        }
        self.clock.advance(self.link_cost);
        if self.fault == Fault::Read {
            return Err(LinkError::ReadFailed);
        }
        Ok(ValveReading {
            name: "eTRV".into(),
            battery: 80,
            room_temp: 19.0,
            set_point: self.set_point,
            last_update: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        })
    }

    fn write_set_point(&mut self, celsius: f32) -> Result<(), LinkError> {
        if self.fault == Fault::Write {
            return Err(LinkError::WriteFailed);
        }
        self.writes.push((self.clock.now(), celsius));
        self.clock.advance(self.link_cost);
        self.set_point = celsius;
        Ok(())
    }
}

// ── MockBus ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub at: Duration,
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

/// Records publications; drops them while disconnected like a real bus.
pub struct MockBus {
    clock: ManualClock,
    pub connected: bool,
    pub published: Vec<Published>,
    pub dropped: usize,
}

#[allow(dead_code)]
impl MockBus {
    pub fn new(clock: &ManualClock) -> Self {
        Self {
            clock: clock.clone(),
            connected: true,
            published: Vec::new(),
            dropped: 0,
        }
    }

    pub fn offline(clock: &ManualClock) -> Self {
        Self {
            connected: false,
            ..Self::new(clock)
        }
    }

    pub fn on_topic(&self, topic: &str) -> Vec<&Published> {
        self.published.iter().filter(|p| p.topic == topic).collect()
    }

    /// `status` values published on `topic`, in order.
    pub fn statuses(&self, topic: &str) -> Vec<String> {
        self.on_topic(topic)
            .into_iter()
            .filter_map(|p| {
                let json: serde_json::Value = serde_json::from_str(&p.payload).ok()?;
                json["status"].as_str().map(str::to_owned)
            })
            .collect()
    }
}

impl BusPort for MockBus {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn publish(&mut self, topic: &str, payload: &str, retain: bool) {
        if !self.connected {
            self.dropped += 1;
            return;
        }
        self.published.push(Published {
            at: self.clock.now(),
            topic: topic.into(),
            payload: payload.into(),
            retain,
        });
    }
}
