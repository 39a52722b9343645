//! Fuzz target: `Intake::route` (bus message router)
//!
//! Splits the input into a topic and a payload and routes it the way the
//! MQTT event loop would.  Invariants checked:
//! - No panics under any topic or payload bytes
//! - An accepted setpoint always carries a finite value for a known device
//! - Nothing reaches the queue unless `route` accepted it
//!
//! cargo fuzz run fuzz_intake

#![no_main]

use etrv2mqtt::app::commands::Request;
use etrv2mqtt::app::events::Topics;
use etrv2mqtt::inbound::{BirthMessage, Intake, RequestQueue, parse_celsius};
use etrv2mqtt::registry::DeviceRegistry;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // First byte picks the split point between topic and payload.
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let split = usize::from(split).min(rest.len());
    let (topic_bytes, payload) = rest.split_at(split);
    let Ok(topic) = core::str::from_utf8(topic_bytes) else {
        return;
    };

    let mut registry = DeviceRegistry::new();
    registry.insert("kitchen", ());
    registry.insert("bedroom", ());
    let queue = RequestQueue::new();
    let intake = Intake::new(
        Topics::new("etrv"),
        BirthMessage {
            topic: "homeassistant/status".into(),
            payload: "online".into(),
        },
        registry.view(),
        queue.clone(),
    );

    let routed = intake.route(topic, payload);
    if let Ok(Some(Request::SetPoint { topic, celsius })) = &routed {
        assert!(celsius.is_finite());
        assert!(registry.lookup(topic).is_some());
        assert_eq!(parse_celsius(payload), Some(*celsius));
    }

    intake.on_message(topic, payload);
    let mut queued = 0;
    queue.drain(|_| queued += 1);
    let accepted = matches!(routed, Ok(Some(_)));
    assert_eq!(queued, usize::from(accepted));
});
