//! Outbound vocabulary: what the bridge publishes and where.
//!
//! The [`BridgeService`](super::service::BridgeService) turns poll results
//! into a [`ValveReading`] on `base/<device>/state` and brackets every poll
//! with transient [`DeviceStatus`] annotations on `base/<device>/attributes`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One complete read of a valve.  Serialised as the device's state payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValveReading {
    /// Name the valve reports for itself (not the bus topic).
    pub name: String,
    /// Battery level in percent.
    pub battery: u8,
    /// Room temperature in °C.
    pub room_temp: f32,
    /// Current target temperature in °C.
    pub set_point: f32,
    /// When the read completed (UTC, RFC 3339 on the wire).
    pub last_update: DateTime<Utc>,
}

impl ValveReading {
    pub fn to_payload(&self) -> String {
        // Plain struct of primitives; serialisation cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Transient status annotation published around device operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Updating,
    Updated,
    ConnectionError,
}

#[derive(Serialize)]
struct StatusPayload {
    status: &'static str,
}

impl DeviceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Updating => "updating",
            Self::Updated => "updated",
            Self::ConnectionError => "connection error",
        }
    }

    /// `{"status": "<text>"}`
    pub fn to_payload(self) -> String {
        serde_json::to_string(&StatusPayload {
            status: self.as_str(),
        })
        .unwrap_or_default()
    }
}

/// Inbound command verbs carried in the last topic segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandVerb {
    Set,
    Poll,
}

/// Bus topic scheme rooted at a configured base prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    base: String,
}

impl Topics {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// `base/<device>/state`
    pub fn state(&self, device: &str) -> String {
        format!("{}/{}/state", self.base, device)
    }

    /// `base/<device>/attributes`
    pub fn attributes(&self, device: &str) -> String {
        format!("{}/{}/attributes", self.base, device)
    }

    /// `base/state` — process liveness (`online` / `offline`).
    pub fn availability(&self) -> String {
        format!("{}/state", self.base)
    }

    /// `base/+/set`
    pub fn set_filter(&self) -> String {
        format!("{}/+/set", self.base)
    }

    /// `base/+/poll`
    pub fn poll_filter(&self) -> String {
        format!("{}/+/poll", self.base)
    }

    /// Split `base/<device>/<verb>` into its device segment and verb.
    /// Anything else (foreign prefix, extra levels, unknown verb) is `None`.
    pub fn parse_command<'t>(&self, topic: &'t str) -> Option<(&'t str, CommandVerb)> {
        let rest = topic.strip_prefix(self.base.as_str())?.strip_prefix('/')?;
        let (device, verb) = rest.split_once('/')?;
        if device.is_empty() || verb.contains('/') {
            return None;
        }
        let verb = match verb {
            "set" => CommandVerb::Set,
            "poll" => CommandVerb::Poll,
            _ => return None,
        };
        Some((device, verb))
    }
}
