//! Bridge configuration.
//!
//! Loaded once at startup from a JSON file.  Optional fields fall back to
//! the defaults below; out-of-range values are rejected by
//! [`BridgeConfig::validate`], never clamped.

use core::fmt;
use core::time::Duration;
use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::app::commands::POLL_ALL_SEGMENT;
use crate::app::service::ServiceSettings;
use crate::inbound::BirthMessage;

/// Broker connection and topic layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub server: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Prefix of every topic the bridge publishes or subscribes to.
    pub base_topic: String,
    pub client_id: String,
    /// Home-automation birth announcement that triggers a replay.
    pub hass_birth_topic: String,
    pub hass_birth_payload: String,
    pub keep_alive_secs: u16,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            server: "localhost".into(),
            port: 1883,
            user: None,
            password: None,
            base_topic: "etrv".into(),
            client_id: "etrv2mqtt".into(),
            hass_birth_topic: "homeassistant/status".into(),
            hass_birth_payload: "online".into(),
            keep_alive_secs: 30,
        }
    }
}

/// One radiator valve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThermostatConfig {
    /// Bus topic segment.  Defaults to the key in `thermostats`.
    #[serde(default)]
    pub topic: Option<String>,
    /// Bluetooth address, `AA:BB:CC:DD:EE:FF`.
    pub address: String,
    /// 16-byte device key as 32 hex digits.
    pub secret_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub mqtt: MqttConfig,
    pub thermostats: BTreeMap<String, ThermostatConfig>,
    /// Seconds between the end of one poll cycle and the start of the next.
    pub poll_interval_secs: u64,
    /// Quiet period before a setpoint is written.
    pub setpoint_debounce_secs: u64,
    /// Connection attempts per valve operation.
    pub retry_limit: u32,
    /// Keep valve sessions open between polls.
    pub stay_connected: bool,
    /// Gap between jobs replayed after a reconnect.
    pub replay_stagger_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig::default(),
            thermostats: BTreeMap::new(),
            poll_interval_secs: 3600,
            setpoint_debounce_secs: 5,
            retry_limit: 5,
            stay_connected: false,
            replay_stagger_ms: 1000,
        }
    }
}

/// A thermostat entry with its topic resolved and credentials decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thermostat {
    pub topic: String,
    pub address: [u8; 6],
    pub secret_key: [u8; 16],
}

impl BridgeConfig {
    /// Read, parse and validate a configuration file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_topic_level(&self.mqtt.base_topic, true) {
            return Err(ConfigError::ValidationFailed(
                "mqtt.base_topic must be non-empty and free of wildcards",
            ));
        }
        if self.mqtt.hass_birth_topic.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "mqtt.hass_birth_topic must not be empty",
            ));
        }
        if self.thermostats.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one thermostat is required",
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "poll_interval_secs must be > 0",
            ));
        }
        if self.retry_limit == 0 {
            return Err(ConfigError::ValidationFailed("retry_limit must be >= 1"));
        }

        let mut seen = std::collections::BTreeSet::new();
        for (key, thermostat) in &self.thermostats {
            let topic = thermostat.topic.as_deref().unwrap_or(key);
            if !is_valid_topic_level(topic, false) {
                return Err(ConfigError::ValidationFailed(
                    "thermostat topic must be a single non-empty level without wildcards",
                ));
            }
            if topic == POLL_ALL_SEGMENT {
                return Err(ConfigError::ValidationFailed(
                    "thermostat topic \"all\" is reserved",
                ));
            }
            if !seen.insert(topic) {
                return Err(ConfigError::ValidationFailed(
                    "thermostat topics must be unique",
                ));
            }
            if parse_mac(&thermostat.address).is_none() {
                return Err(ConfigError::ValidationFailed(
                    "thermostat address must be a MAC like 00:04:2F:00:00:01",
                ));
            }
            if parse_key(&thermostat.secret_key).is_none() {
                return Err(ConfigError::ValidationFailed(
                    "thermostat secret_key must be 32 hex digits",
                ));
            }
        }
        Ok(())
    }

    /// Thermostats in topic order with decoded credentials.  Entries that
    /// fail to decode are skipped; [`validate`](Self::validate) rejects them
    /// up front.
    pub fn thermostats(&self) -> impl Iterator<Item = Thermostat> + '_ {
        self.thermostats.iter().filter_map(|(key, t)| {
            Some(Thermostat {
                topic: t.topic.clone().unwrap_or_else(|| key.clone()),
                address: parse_mac(&t.address)?,
                secret_key: parse_key(&t.secret_key)?,
            })
        })
    }

    pub fn birth(&self) -> BirthMessage {
        BirthMessage {
            topic: self.mqtt.hass_birth_topic.clone(),
            payload: self.mqtt.hass_birth_payload.clone(),
        }
    }
}

impl From<&BridgeConfig> for ServiceSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            base_topic: config.mqtt.base_topic.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            debounce_window: Duration::from_secs(config.setpoint_debounce_secs),
            stay_connected: config.stay_connected,
            replay_stagger: Duration::from_millis(config.replay_stagger_ms),
        }
    }
}

/// `base_topic` may contain `/` separators; device topics may not.
fn is_valid_topic_level(topic: &str, allow_separator: bool) -> bool {
    !topic.is_empty()
        && !topic.contains(['+', '#'])
        && (allow_separator || !topic.contains('/'))
        && !topic.starts_with('/')
        && !topic.ends_with('/')
}

pub fn parse_mac(text: &str) -> Option<[u8; 6]> {
    let mut out = [0u8; 6];
    let mut parts = text.split(':');
    for byte in &mut out {
        let part = parts.next()?;
        *byte = hex_byte(part)?;
    }
    parts.next().is_none().then_some(out)
}

pub fn parse_key(text: &str) -> Option<[u8; 16]> {
    if text.len() != 32 || !text.is_ascii() {
        return None;
    }
    let mut out = [0u8; 16];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = hex_byte(&text[i * 2..i * 2 + 2])?;
    }
    Some(out)
}

fn hex_byte(pair: &str) -> Option<u8> {
    // from_str_radix alone would accept a leading '+'.
    if pair.len() != 2 || !pair.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(pair, 16).ok()
}

// ───────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io(std::io::Error),
    /// The file is not valid JSON for this schema.
    Parse(serde_json::Error),
    /// A field failed validation.  The message names the field and rule.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "cannot read config: {}", e),
            Self::Parse(e) => write!(f, "invalid config: {}", e),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
            Self::ValidationFailed(_) => None,
        }
    }
}
