//! Bus → tick loop handoff.
//!
//! Inbound messages are delivered on the bus adapter's own thread.  They
//! never touch the job table directly: [`Intake`] validates and translates
//! each message into a [`Request`] and pushes it into a [`RequestQueue`],
//! which the tick loop drains at the start of every tick.
//!
//! ```text
//! ┌──────────────┐   Request   ┌──────────────────────┐   ┌──────────────────┐
//! │  Bus thread  │────────────▶│ RequestQueue         │──▶│ Tick loop        │
//! │  (Intake)    │             │  polls/replay: chan  │   │ drain → schedule │
//! └──────────────┘             │  setpoints: latest   │   └──────────────────┘
//!                              └──────────────────────┘
//! ```
//!
//! Setpoints never compete for channel slots.  They are kept one per
//! device, newest value wins, so a long valve exchange on the tick loop
//! cannot cause a burst of slider updates to lose its final value.
//!
//! Intake rejects overlapping poll requests on the spot by reading the
//! registry's atomic polling flags, so a request that arrives while that
//! same poll is running is dropped instead of queued behind it.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use log::{debug, warn};

use crate::app::commands::{PollTarget, Request};
use crate::app::events::{CommandVerb, Topics};
use crate::error::{Error, Result};
use crate::registry::RegistryView;

/// Channel depth for poll and replay requests.
pub const QUEUE_DEPTH: usize = 32;

type PendingSetpoints = Mutex<CriticalSectionRawMutex, RefCell<BTreeMap<String, f32>>>;

// ───────────────────────────────────────────────────────────────
// Request queue
// ───────────────────────────────────────────────────────────────

/// Request handoff shared between the bus thread and the tick loop.
/// Cloning yields another handle on the same queue.
#[derive(Clone)]
pub struct RequestQueue {
    channel: Arc<Channel<CriticalSectionRawMutex, Request, QUEUE_DEPTH>>,
    setpoints: Arc<PendingSetpoints>,
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestQueue {
    pub fn new() -> Self {
        Self {
            channel: Arc::new(Channel::new()),
            setpoints: Arc::new(Mutex::new(RefCell::new(BTreeMap::new()))),
        }
    }

    /// Enqueue a request.  Returns `false` if the channel is full (request
    /// dropped).  Setpoints always succeed and replace any value still
    /// pending for the same device.
    pub fn push(&self, request: Request) -> bool {
        let request = match request {
            Request::SetPoint { topic, celsius } => {
                let replaced = self
                    .setpoints
                    .lock(|pending| pending.borrow_mut().insert(topic.clone(), celsius));
                if let Some(old) = replaced {
                    debug!("Setpoint {} for {} superseded by {}", old, topic, celsius);
                }
                return true;
            }
            other => other,
        };
        match self.channel.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(request)) => {
                warn!("Request queue full, dropping {:?}", request);
                false
            }
        }
    }

    /// Hand every pending request to `handler`: channel traffic in FIFO
    /// order, then the latest setpoint of each device.
    pub fn drain(&self, mut handler: impl FnMut(Request)) {
        while let Ok(request) = self.channel.try_receive() {
            handler(request);
        }
        let setpoints = self.setpoints.lock(|pending| core::mem::take(&mut *pending.borrow_mut()));
        for (topic, celsius) in setpoints {
            handler(Request::SetPoint { topic, celsius });
        }
    }

    pub fn len(&self) -> usize {
        self.channel.len() + self.setpoints.lock(|pending| pending.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ───────────────────────────────────────────────────────────────
// Intake
// ───────────────────────────────────────────────────────────────

/// Birth announcement of the home-automation platform.  A matching
/// message triggers a replay of every scheduled job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BirthMessage {
    pub topic: String,
    pub payload: String,
}

/// Message router executed on the bus delivery thread.
#[derive(Clone)]
pub struct Intake {
    topics: Topics,
    birth: BirthMessage,
    registry: RegistryView,
    queue: RequestQueue,
}

impl Intake {
    pub fn new(topics: Topics, birth: BirthMessage, registry: RegistryView, queue: RequestQueue) -> Self {
        Self {
            topics,
            birth,
            registry,
            queue,
        }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn birth(&self) -> &BirthMessage {
        &self.birth
    }

    /// Entry point for every message the bus delivers.  Rejections are
    /// logged as warnings; nothing propagates back to the bus adapter.
    pub fn on_message(&self, topic: &str, payload: &[u8]) {
        match self.route(topic, payload) {
            Ok(Some(request)) => {
                debug!("Intake: {} -> {:?}", topic, request);
                self.queue.push(request);
            }
            Ok(None) => {}
            Err(e) => warn!("Intake: {}", e),
        }
    }

    /// Translate one message.  `Ok(None)` means the topic is not ours or
    /// carries nothing actionable.
    pub fn route(&self, topic: &str, payload: &[u8]) -> Result<Option<Request>> {
        if topic == self.birth.topic {
            // Payload can be arbitrary bytes.
            let matched = core::str::from_utf8(payload).is_ok_and(|p| p == self.birth.payload);
            return Ok(matched.then_some(Request::Replay));
        }

        let Some((device, verb)) = self.topics.parse_command(topic) else {
            return Ok(None);
        };

        match verb {
            CommandVerb::Set => {
                if self.registry.lookup(device).is_none() {
                    return Err(Error::UnknownDevice(device.to_owned()));
                }
                let celsius = parse_celsius(payload).ok_or_else(|| Error::MalformedCommand {
                    topic: device.to_owned(),
                    payload: String::from_utf8_lossy(payload).into_owned(),
                })?;
                Ok(Some(Request::SetPoint {
                    topic: device.to_owned(),
                    celsius,
                }))
            }
            CommandVerb::Poll => {
                debug!("Intake: poll request for {}", device);
                let target = PollTarget::from_segment(device);
                match &target {
                    PollTarget::All => {
                        if self.registry.is_polling_all() {
                            return Err(Error::SchedulingConflict(target.to_string()));
                        }
                    }
                    PollTarget::Device(topic) => {
                        let state = self
                            .registry
                            .lookup(topic)
                            .ok_or_else(|| Error::UnknownDevice(topic.clone()))?;
                        if state.is_polling() {
                            return Err(Error::SchedulingConflict(target.to_string()));
                        }
                    }
                }
                Ok(Some(Request::Poll(target)))
            }
        }
    }
}

/// Parse a setpoint payload: UTF-8 decimal, surrounding whitespace
/// ignored, finite values only.
pub fn parse_celsius(payload: &[u8]) -> Option<f32> {
    let text = core::str::from_utf8(payload).ok()?;
    let value: f32 = text.trim().parse().ok()?;
    value.is_finite().then_some(value)
}
