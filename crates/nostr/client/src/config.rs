//! Configuration for connections, pools and the manager.
//!
//! Durations are millisecond integers so the structs load straight from JSON.

use crate::FALLBACK_RELAYS;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Time allowed for the WebSocket handshake
    pub connect_timeout_ms: u64,
    /// Capacity of the incoming frame broadcast channel
    pub message_buffer: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            message_buffer: 1024,
        }
    }
}

impl RelayConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Per-pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub relay: RelayConfig,
    /// How long each relay gets to answer an EVENT with OK
    pub publish_timeout_ms: u64,
    /// Upper bound for collecting stored events in `RelayPool::query`
    pub query_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            relay: RelayConfig::default(),
            publish_timeout_ms: 10_000,
            query_timeout_ms: 10_000,
        }
    }
}

impl PoolConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub pool: PoolConfig,
    /// Relays of the fallback pool; the compiled-in list when not given
    pub fallback_relays: Vec<String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            fallback_relays: FALLBACK_RELAYS.iter().map(|url| url.to_string()).collect(),
        }
    }
}

impl ManagerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
