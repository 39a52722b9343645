//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements | Connects to                       |
//! |-------------|------------|-----------------------------------|
//! | `mqtt`      | BusPort    | MQTT broker (`rumqttc`)           |
//! | `log_bus`   | BusPort    | Log output (`--dry-run`)          |
//! | `sim_valve` | ValvePort  | In-process simulated valve        |
//! | `time`      | Clock      | `std::time::Instant`              |

pub mod log_bus;
pub mod mqtt;
pub mod sim_valve;
pub mod time;
