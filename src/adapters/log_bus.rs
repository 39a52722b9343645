//! Log-based bus adapter.
//!
//! Implements [`BusPort`] by writing every publication to the log.  Used by
//! `--dry-run` to drive the scheduler without a broker; it reports itself
//! connected unless told otherwise.

use log::info;

use crate::app::ports::BusPort;

pub struct LogBus {
    connected: bool,
    published: u64,
}

impl Default for LogBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBus {
    pub fn new() -> Self {
        Self {
            connected: true,
            published: 0,
        }
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Publications logged so far.
    pub fn published(&self) -> u64 {
        self.published
    }
}

impl BusPort for LogBus {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn publish(&mut self, topic: &str, payload: &str, retain: bool) {
        self.published += 1;
        info!(
            "PUB | {}{} | {}",
            topic,
            if retain { " (retained)" } else { "" },
            payload
        );
    }
}
