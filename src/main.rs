//! etrv2mqtt: radiator valves ⇄ MQTT bridge.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  MqttBus / LogBus     SimulatedValve (×N)     MonotonicClock   │
//! │  (BusPort)            (ValvePort)             (Clock)          │
//! │       │ mqtt-rx thread                                         │
//! │       ▼                                                        │
//! │  Intake ──▶ RequestQueue                                       │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │             BridgeService (tick loop)                  │    │
//! │  │  ConnectionGate · JobTable · Poll · Debounce           │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use etrv2mqtt::adapters::log_bus::LogBus;
use etrv2mqtt::adapters::mqtt::MqttBus;
use etrv2mqtt::adapters::sim_valve::SimulatedValve;
use etrv2mqtt::adapters::time::MonotonicClock;
use etrv2mqtt::app::events::Topics;
use etrv2mqtt::app::service::{BridgeService, ServiceSettings};
use etrv2mqtt::config::BridgeConfig;
use etrv2mqtt::registry::DeviceRegistry;

#[derive(Debug, Parser)]
#[command(name = "etrv2mqtt", version, about)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(short, long, env = "ETRV2MQTT_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Log publications instead of connecting to the broker.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("╔══════════════════════════════════════╗");
    info!("║  etrv2mqtt v{:<25}║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let config = BridgeConfig::load_from_path(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let registry = build_registry(&config);
    let settings = ServiceSettings::from(&config);
    let clock = MonotonicClock::new();

    if args.dry_run {
        info!("Dry run: publications go to the log");
        let mut service = BridgeService::new(settings, registry, LogBus::new(), clock);
        service.run_forever()
    }

    let topics = Topics::new(&config.mqtt.base_topic);
    let bus = MqttBus::new(&config.mqtt, &topics);
    let mut service = BridgeService::new(settings, registry, bus, clock);
    let intake = service.intake(config.birth());
    service
        .bus_mut()
        .start(intake)
        .context("starting MQTT event loop")?;

    service.run_forever()
}

fn build_registry(config: &BridgeConfig) -> DeviceRegistry<SimulatedValve> {
    let mut registry = DeviceRegistry::new();
    for thermostat in config.thermostats() {
        let valve = SimulatedValve::new(
            &thermostat.topic,
            thermostat.address,
            thermostat.secret_key,
            config.retry_limit,
        );
        info!("Adding device {} MAC: {}", thermostat.topic, valve.address());
        registry.insert(thermostat.topic, valve);
    }
    registry
}
