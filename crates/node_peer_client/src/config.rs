use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 10_000;

/// Deadlines for one peer-list request. Zero means "use the default".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

impl ClientConfig {
    pub fn new(connect_timeout_ms: u64, read_timeout_ms: u64) -> Self {
        Self {
            connect_timeout_ms,
            read_timeout_ms,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(or_default(self.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(or_default(self.read_timeout_ms, DEFAULT_READ_TIMEOUT_MS))
    }
}

fn or_default(value: u64, default: u64) -> u64 {
    if value == 0 {
        default
    } else {
        value
    }
}
