//! Per-chain fetch context.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::{CancellationToken, DropGuard};

use crate::circuit::CircuitPool;
use crate::config::{ChainConfig, GatewayConfig, RetryConfig};
use crate::connection::ConnectionSettings;
use crate::consensus::{RandomSource, ThreadRandom};
use crate::ethereum::pools::{circuit_pools, spawn_rearm_watcher, CircuitPools};
use crate::resilience::{Generation, TimeoutPolicy};

/// Tunables shared by every chain.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub timeouts: TimeoutPolicy,
    pub cooldown: Duration,
    pub retries: RetryConfig,
    pub random: Arc<dyn RandomSource>,
}

impl ContextOptions {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            timeouts: TimeoutPolicy::from(&config.timeouts),
            cooldown: config.timeouts.cooldown(),
            retries: config.retries.clone(),
            random: Arc::new(ThreadRandom),
        }
    }
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

/// A chain's configuration plus its pool-of-pools.
///
/// Dropping the context stops its re-arm watcher and tears down every
/// connection built for the chain.
pub struct EthereumContext {
    chain: ChainConfig,
    pools: CircuitPools,
    timeouts: TimeoutPolicy,
    generation: Generation,
    random: Arc<dyn RandomSource>,
    _watcher: DropGuard,
}

impl EthereumContext {
    pub fn new(chain: ChainConfig, circuits: &CircuitPool, options: ContextOptions) -> Self {
        let fanout = chain.fanout.unwrap_or_else(|| circuits.capacity());
        let urls: Arc<[String]> = chain.urls.clone().into();
        let settings = ConnectionSettings {
            handshake_timeout: options.timeouts.handshake(),
            cooldown: options.cooldown,
            max_response_bytes: chain.max_response_bytes,
        };
        let generation = Generation::new();

        let pools = circuit_pools(
            &chain.name,
            circuits.clone(),
            urls,
            settings,
            fanout,
            generation.clone(),
            options.retries,
        );

        let watcher = CancellationToken::new();
        spawn_rearm_watcher(&chain.name, circuits, pools.downgrade(), generation.clone(), watcher.clone());

        tracing::info!(
            chain = %chain.name,
            chain_id = chain.chain_id,
            backends = chain.urls.len(),
            fanout,
            "Chain context ready"
        );

        Self {
            chain,
            pools,
            timeouts: options.timeouts,
            generation,
            random: options.random,
            _watcher: watcher.drop_guard(),
        }
    }

    pub fn chain(&self) -> &ChainConfig {
        &self.chain
    }

    pub fn name(&self) -> &str {
        &self.chain.name
    }

    pub fn pools(&self) -> &CircuitPools {
        &self.pools
    }

    /// Number of independent workers per fetch.
    pub fn fanout(&self) -> usize {
        self.pools.capacity()
    }

    pub fn timeouts(&self) -> TimeoutPolicy {
        self.timeouts
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    pub fn random(&self) -> Arc<dyn RandomSource> {
        Arc::clone(&self.random)
    }
}

impl std::fmt::Debug for EthereumContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthereumContext")
            .field("chain", &self.chain.name)
            .field("fanout", &self.fanout())
            .field("generation", &self.generation.current())
            .finish()
    }
}
