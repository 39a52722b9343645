//! Device registry.
//!
//! Maps a valve's bus topic to its coordination state and its
//! [`ValvePort`](crate::app::ports::ValvePort) adapter.  Built once at
//! startup from configuration and never shrinks.
//!
//! The polling flags live behind `Arc<AtomicBool>` so the bus delivery
//! thread can reject overlapping poll requests through a [`RegistryView`]
//! while the tick loop is busy inside that very poll.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-device coordination state (not sensor data).
#[derive(Debug)]
pub struct DeviceState {
    topic: String,
    is_polling: AtomicBool,
}

impl DeviceState {
    fn new(topic: String) -> Self {
        Self {
            topic,
            is_polling: AtomicBool::new(false),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// True strictly between poll start and poll completion.
    pub fn is_polling(&self) -> bool {
        self.is_polling.load(Ordering::Acquire)
    }

    pub(crate) fn set_polling(&self, polling: bool) {
        self.is_polling.store(polling, Ordering::Release);
    }
}

/// A registered valve: shared state plus the exclusively owned adapter.
pub struct DeviceEntry<D> {
    state: Arc<DeviceState>,
    valve: D,
}

impl<D> DeviceEntry<D> {
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn topic(&self) -> &str {
        self.state.topic()
    }

    pub fn valve(&self) -> &D {
        &self.valve
    }

    pub fn valve_mut(&mut self) -> &mut D {
        &mut self.valve
    }
}

pub struct DeviceRegistry<D> {
    entries: BTreeMap<String, DeviceEntry<D>>,
    polling_all: Arc<AtomicBool>,
}

impl<D> Default for DeviceRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> DeviceRegistry<D> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            polling_all: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a valve under `topic`.  Returns `false` (and keeps the
    /// existing entry) if the topic is already taken.
    pub fn insert(&mut self, topic: impl Into<String>, valve: D) -> bool {
        let topic = topic.into();
        if self.entries.contains_key(&topic) {
            return false;
        }
        let state = Arc::new(DeviceState::new(topic.clone()));
        self.entries.insert(topic, DeviceEntry { state, valve });
        true
    }

    pub fn lookup(&self, topic: &str) -> Option<&DeviceState> {
        self.entries.get(topic).map(DeviceEntry::state)
    }

    pub fn entry(&self, topic: &str) -> Option<&DeviceEntry<D>> {
        self.entries.get(topic)
    }

    pub fn entry_mut(&mut self, topic: &str) -> Option<&mut DeviceEntry<D>> {
        self.entries.get_mut(topic)
    }

    /// Entries in topic order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DeviceEntry<D>> {
        self.entries.values_mut()
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a poll of every device is in progress.
    pub fn is_polling_all(&self) -> bool {
        self.polling_all.load(Ordering::Acquire)
    }

    pub(crate) fn set_polling_all(&self, polling: bool) {
        self.polling_all.store(polling, Ordering::Release);
    }

    /// Thread-safe, read-only snapshot for the bus delivery thread.
    pub fn view(&self) -> RegistryView {
        let states = self
            .entries
            .iter()
            .map(|(topic, entry)| (topic.clone(), Arc::clone(&entry.state)))
            .collect();
        RegistryView {
            states: Arc::new(states),
            polling_all: Arc::clone(&self.polling_all),
        }
    }
}

/// Read-only handle on the registry's topics and polling flags.
///
/// Cheap to clone; shares the live flags with the registry it came from.
#[derive(Debug, Clone)]
pub struct RegistryView {
    states: Arc<BTreeMap<String, Arc<DeviceState>>>,
    polling_all: Arc<AtomicBool>,
}

impl RegistryView {
    pub fn lookup(&self, topic: &str) -> Option<&DeviceState> {
        self.states.get(topic).map(Arc::as_ref)
    }

    pub fn is_polling_all(&self) -> bool {
        self.polling_all.load(Ordering::Acquire)
    }
}
