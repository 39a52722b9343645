//! MQTT bus adapter.
//!
//! Implements [`BusPort`] on a synchronous `rumqttc` client.  The
//! connection's event loop runs on its own thread:
//!
//! ```text
//!   mqtt-rx thread                         tick loop
//!   ──────────────                         ─────────
//!   connection.iter()
//!     ConnAck  ─▶ connected = true    ◀──  is_connected()
//!                 publish base/state=online
//!                 subscribe set / poll / birth
//!     Publish  ─▶ Intake::on_message  ──▶  RequestQueue
//!     Err      ─▶ connected = false, back off 1 s
//!                                          publish() ─▶ client
//! ```
//!
//! The broker holds a retained last-will of `base/state = offline`.
//! Reconnection is handled by `rumqttc`: the next `iter()` step after an
//! error dials the broker again.

use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, info, warn};
use rumqttc::{Client, Connection, ConnectReturnCode, Event, LastWill, MqttOptions, Packet, QoS};

use crate::app::events::Topics;
use crate::app::ports::BusPort;
use crate::config::MqttConfig;
use crate::inbound::Intake;

/// Depth of the client → event loop request channel.
const REQUEST_CAPACITY: usize = 64;

/// Pause after a connection error before the event loop dials again.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

const ONLINE: &str = "online";
const OFFLINE: &str = "offline";

pub struct MqttBus {
    client: Client,
    connection: Option<Connection>,
    connected: Arc<AtomicBool>,
    availability_topic: String,
}

impl MqttBus {
    /// Configure the client.  Nothing is dialled until [`start`](Self::start).
    pub fn new(config: &MqttConfig, topics: &Topics) -> Self {
        let availability_topic = topics.availability();

        let mut options = MqttOptions::new(&config.client_id, &config.server, config.port);
        options.set_keep_alive(Duration::from_secs(u64::from(config.keep_alive_secs)));
        if let Some(user) = &config.user {
            options.set_credentials(user, config.password.as_deref().unwrap_or_default());
        }
        options.set_last_will(LastWill::new(
            &availability_topic,
            OFFLINE,
            QoS::AtLeastOnce,
            true,
        ));

        debug!("MQTT: broker {}:{}", config.server, config.port);
        let (client, connection) = Client::new(options, REQUEST_CAPACITY);

        Self {
            client,
            connection: Some(connection),
            connected: Arc::new(AtomicBool::new(false)),
            availability_topic,
        }
    }

    /// Spawn the event loop thread, routing inbound messages to `intake`.
    /// Calling it a second time is a no-op.
    pub fn start(&mut self, intake: Intake) -> std::io::Result<()> {
        let Some(connection) = self.connection.take() else {
            warn!("MQTT: event loop already running");
            return Ok(());
        };
        let worker = EventLoop {
            client: self.client.clone(),
            connected: Arc::clone(&self.connected),
            availability_topic: self.availability_topic.clone(),
            intake,
        };
        std::thread::Builder::new()
            .name("mqtt-rx".into())
            .spawn(move || worker.run(connection))?;
        Ok(())
    }
}

impl BusPort for MqttBus {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn publish(&mut self, topic: &str, payload: &str, retain: bool) {
        if !self.is_connected() {
            debug!("MQTT: offline, dropping publish to {}", topic);
            return;
        }
        if let Err(e) = self
            .client
            .try_publish(topic, QoS::AtMostOnce, retain, payload.as_bytes())
        {
            warn!("MQTT: publish to {} failed: {}", topic, e);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Event loop (runs on the mqtt-rx thread)
// ───────────────────────────────────────────────────────────────

struct EventLoop {
    client: Client,
    connected: Arc<AtomicBool>,
    availability_topic: String,
    intake: Intake,
}

impl EventLoop {
    fn run(self, mut connection: Connection) {
        for notification in connection.iter() {
            match notification {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        self.on_connected();
                    } else {
                        error!("MQTT: connection refused: {:?}", ack.code);
                    }
                }
                Ok(Event::Incoming(Packet::Publish(msg))) => {
                    self.intake.on_message(&msg.topic, &msg.payload);
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    self.set_connected(false);
                }
                Ok(_) => {}
                Err(e) => {
                    if self.connected.load(Ordering::Acquire) {
                        warn!("MQTT: connection lost: {}", e);
                    } else {
                        debug!("MQTT: connect attempt failed: {}", e);
                    }
                    self.set_connected(false);
                    std::thread::sleep(RECONNECT_BACKOFF);
                }
            }
        }
        self.set_connected(false);
        info!("MQTT: event loop stopped");
    }

    fn on_connected(&self) {
        info!("Connected to MQTT server");
        let topics = self.intake.topics();
        let filters = [
            topics.set_filter(),
            topics.poll_filter(),
            self.intake.birth().topic.clone(),
        ];
        for filter in &filters {
            if let Err(e) = self.client.try_subscribe(filter, QoS::AtMostOnce) {
                error!("MQTT: subscribe to {} failed: {}", filter, e);
            }
        }
        if let Err(e) = self
            .client
            .try_publish(&self.availability_topic, QoS::AtLeastOnce, true, ONLINE)
        {
            error!("MQTT: availability publish failed: {}", e);
        }
        self.set_connected(true);
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }
}
