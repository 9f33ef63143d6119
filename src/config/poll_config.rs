use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::constants::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_POLL_MAX_RETRIES};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Time between two reads of a polled characteristic
    pub interval_ms: u64,
    /// Consecutive failed reads tolerated before the timer stops
    pub max_retries: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_retries: DEFAULT_POLL_MAX_RETRIES,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}
