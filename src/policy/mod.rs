//! Per-level connection policies.
//!
//! # Responsibilities
//! - Name the timeout of every connection phase
//! - Size relay buffers
//! - Resolve a user level to its policy
//!
//! # Phases
//! ```text
//! Handshake → ConnectionIdle → UplinkOnly | DownlinkOnly → Closed
//! ```

use std::collections::HashMap;
use std::time::Duration;

use crate::config::PolicyConfig;

/// Timeouts applied across the phases of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Bound on a protocol handshake.
    pub handshake: Duration,
    /// Silence tolerated while both directions are open.
    pub connection_idle: Duration,
    /// Silence tolerated once the response side is done.
    pub uplink_only: Duration,
    /// Silence tolerated once the request side is done.
    pub downlink_only: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(4),
            connection_idle: Duration::from_secs(300),
            uplink_only: Duration::from_secs(1),
            downlink_only: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPolicy {
    /// Bytes buffered per direction before writers wait.
    pub per_connection: usize,
}

impl BufferPolicy {
    /// Size of one read from a client stream.
    pub fn chunk_size(&self) -> usize {
        self.per_connection.clamp(1, 16 * 1024)
    }
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self {
            per_connection: 512 * 1024,
        }
    }
}

/// Everything a relay needs to know about its user level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionPolicy {
    pub timeouts: Timeouts,
    pub buffer: BufferPolicy,
}

/// Resolves a user level to its session policy.
pub trait PolicyProvider: Send + Sync {
    fn for_level(&self, level: u32) -> SessionPolicy;
}

/// Policies loaded from configuration; unknown levels get the defaults.
#[derive(Debug, Clone, Default)]
pub struct LevelPolicies {
    levels: HashMap<u32, SessionPolicy>,
}

impl LevelPolicies {
    pub fn from_config(config: &PolicyConfig) -> Self {
        let levels = config
            .levels
            .iter()
            .map(|level| {
                let policy = SessionPolicy {
                    timeouts: Timeouts {
                        handshake: Duration::from_secs(level.handshake_secs),
                        connection_idle: Duration::from_secs(level.connection_idle_secs),
                        uplink_only: Duration::from_secs(level.uplink_only_secs),
                        downlink_only: Duration::from_secs(level.downlink_only_secs),
                    },
                    buffer: BufferPolicy {
                        per_connection: level.buffer_size,
                    },
                };
                (level.level, policy)
            })
            .collect();
        Self { levels }
    }

    pub fn insert(&mut self, level: u32, policy: SessionPolicy) {
        self.levels.insert(level, policy);
    }
}

impl PolicyProvider for LevelPolicies {
    fn for_level(&self, level: u32) -> SessionPolicy {
        self.levels.get(&level).copied().unwrap_or_default()
    }
}
