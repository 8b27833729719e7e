//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML. Every section
//! has defaults so a minimal file only names what differs.

use serde::{Deserialize, Serialize};

use crate::net::address::Network;

/// Root configuration for the relay door.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Forwarding inbound settings.
    pub door: DoorConfig,

    /// Outbound dialing settings.
    pub dispatcher: DispatcherConfig,

    /// Per-level timeouts and buffers.
    pub policy: PolicyConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:1080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:1080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Forwarding inbound: every accepted connection goes to one destination.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DoorConfig {
    /// Destination host. May be omitted when `follow_redirect` is set.
    pub address: Option<String>,

    /// Destination port.
    pub port: u16,

    /// Networks accepted by this inbound.
    pub networks: Vec<Network>,

    /// Prefer the destination announced by the connection itself.
    pub follow_redirect: bool,

    /// Idle timeout override in seconds, honored for user level 0 only.
    pub timeout_secs: u64,

    /// User level used to look up the session policy.
    pub user_level: u32,
}

impl Default for DoorConfig {
    fn default() -> Self {
        Self {
            address: None,
            port: 0,
            networks: vec![Network::Tcp],
            follow_redirect: false,
            timeout_secs: 0,
            user_level: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PolicyConfig {
    pub levels: Vec<LevelPolicyConfig>,
}

/// Timeouts and buffer size of one user level.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LevelPolicyConfig {
    pub level: u32,
    pub handshake_secs: u64,
    pub connection_idle_secs: u64,
    pub uplink_only_secs: u64,
    pub downlink_only_secs: u64,
    /// Bytes buffered per direction.
    pub buffer_size: usize,
}

impl Default for LevelPolicyConfig {
    fn default() -> Self {
        Self {
            level: 0,
            handshake_secs: 4,
            connection_idle_secs: 300,
            uplink_only_secs: 1,
            downlink_only_secs: 1,
            buffer_size: 512 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
