//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::net::{Node, Protocol};
use crate::pool::SelectionStrategy;
use crate::retry::BackoffConfig;

/// Root configuration for the client stack.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend nodes the pool may connect to.
    pub nodes: Vec<NodeConfig>,

    /// Connection pool sizing and selection.
    pub pool: PoolConfig,

    /// Retry backoff shape.
    pub backoff: BackoffConfig,

    /// Redirect following.
    pub redirect: RedirectConfig,

    /// Cookie jar bounds.
    pub cookies: CookieConfig,

    /// Transport timeouts.
    pub transport: TransportConfig,

    /// Server-side pipelining bounds.
    pub pipeline: PipelineConfig,
}

/// One backend endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    /// Protocol major version this node speaks.
    #[serde(default = "default_protocol")]
    pub protocol: Protocol,
    #[serde(default)]
    pub secure: bool,
}

fn default_protocol() -> Protocol {
    Protocol::Http1
}

impl NodeConfig {
    pub fn to_node(&self) -> Node {
        Node::new(self.host.clone(), self.port, self.protocol, self.secure)
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Concurrency limit; the counting semaphore is sized to this.
    pub max_connections: usize,

    /// How long `acquire` waits for a permit.
    pub acquire_timeout_ms: u64,

    /// Per-attempt dial budget, also used during `prepare`.
    pub connect_timeout_ms: u64,

    /// Node selection strategy.
    pub strategy: SelectionStrategy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 8,
            acquire_timeout_ms: 5_000,
            connect_timeout_ms: 3_000,
            strategy: SelectionStrategy::RoundRobin,
        }
    }
}

/// Redirect-following configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedirectConfig {
    pub enabled: bool,
    /// Hops after which following stops with a terminal error.
    pub max_hops: u32,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_hops: 5,
        }
    }
}

/// Cookie jar configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CookieConfig {
    /// Maximum stored cookies before LRU eviction.
    pub capacity: usize,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

/// Transport timeouts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// How long a multiplexed transport waits for peer settings.
    pub handshake_timeout_ms: u64,

    /// Per-exchange wait budget.
    pub exchange_timeout_ms: u64,

    /// Grace period for draining exchanges on close.
    pub close_grace_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 5_000,
            exchange_timeout_ms: 30_000,
            close_grace_ms: 1_000,
        }
    }
}

/// Server-side pipelining configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Completed-but-unwritten responses held per connection before the
    /// connection is closed to bound memory.
    pub capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { capacity: 32 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [[nodes]]
            host = "127.0.0.1"
            port = 8080
            "#,
        )
        .unwrap();

        assert_eq!(config.nodes.len(), 1);
        assert_eq!(config.nodes[0].protocol, Protocol::Http1);
        assert_eq!(config.pool.max_connections, 8);
        assert_eq!(config.backoff.initial_ms, 500);
        assert!(config.redirect.enabled);
    }

    #[test]
    fn protocol_parses_lowercase() {
        let node: NodeConfig = toml::from_str(
            r#"
            host = "h"
            port = 1
            protocol = "http2"
            secure = true
            "#,
        )
        .unwrap();
        assert_eq!(node.protocol, Protocol::Http2);
        assert!(node.secure);
    }
}
