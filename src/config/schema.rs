//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Local JSON-RPC listener.
    pub listener: ListenerConfig,

    /// Circuit provider settings.
    pub circuits: CircuitConfig,

    /// Ping baseline and derived timeouts.
    pub timeouts: TimeoutConfig,

    /// Stale-retry backoff.
    pub retries: RetryConfig,

    /// Chains served by the gateway, each with its own backend list.
    pub chains: Vec<ChainConfig>,

    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            circuits: CircuitConfig::default(),
            timeouts: TimeoutConfig::default(),
            retries: RetryConfig::default(),
            chains: vec![ChainConfig::default()],
            observability: ObservabilityConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Looks up a chain by name.
    pub fn chain(&self, name: &str) -> Option<&ChainConfig> {
        self.chains.iter().find(|chain| chain.name == name)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8545").
    pub bind_address: String,

    /// Largest accepted request body.
    pub max_body_bytes: usize,

    /// Upper bound on the time spent answering one gateway request.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8545".to_string(),
            max_body_bytes: 1024 * 1024,
            request_timeout_secs: 60,
        }
    }
}

/// Which circuit adapter to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitProvider {
    /// SOCKS5 proxy isolating streams by credentials (e.g. Tor).
    Socks5,
    /// Plain TCP, no anonymization.
    Direct,
}

/// Circuit provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitConfig {
    pub provider: CircuitProvider,

    /// SOCKS5 proxy address, used by the `socks5` provider.
    pub socks_address: String,

    /// Number of circuits kept open.
    pub count: usize,

    /// How often errored circuits are rebuilt, in seconds.
    pub supervise_interval_secs: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            provider: CircuitProvider::Socks5,
            socks_address: "127.0.0.1:9050".to_string(),
            count: 5,
            supervise_interval_secs: 30,
        }
    }
}

/// Timeout configuration derived from a single ping baseline.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Expected round-trip over a circuit, in milliseconds.
    pub ping_ms: u64,

    /// Request timeout as a multiple of the ping.
    pub request_multiplier: u32,

    /// Handshake timeout as a multiple of the ping.
    pub handshake_multiplier: u32,

    /// Minimum spacing between calls on one WebSocket, in milliseconds.
    pub cooldown_ms: u64,
}

impl TimeoutConfig {
    pub fn ping(&self) -> Duration {
        Duration::from_millis(self.ping_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            ping_ms: 2000,
            request_multiplier: 3,
            handshake_multiplier: 9,
            cooldown_ms: 100,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// One chain and the backends that serve it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    /// Name used in `/rpc/{chain}` and in metrics.
    pub name: String,

    /// EIP-155 chain id (e.g., 1 for Ethereum mainnet).
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// Backend endpoints: `http(s)://` or `ws(s)://`.
    pub urls: Vec<String>,

    /// Independent circuits queried per call. Defaults to the circuit count.
    #[serde(default)]
    pub fanout: Option<usize>,

    /// Largest backend response accepted, in bytes.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

fn default_chain_id() -> u64 {
    1
}

fn default_max_response_bytes() -> usize {
    16 * 1024 * 1024
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            name: "ethereum".to_string(),
            chain_id: 1,
            urls: vec!["http://localhost:8545".to_string()],
            fanout: None,
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
