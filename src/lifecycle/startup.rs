//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the circuit pool from configuration
//! - Start the circuit supervisor
//! - Build one fetch context per chain
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Circuit construction is asynchronous; startup does not wait for it

use std::sync::Arc;
use std::time::Duration;

use crate::circuit::{build_circuit_pool, CircuitPool, CircuitSupervisor};
use crate::config::GatewayConfig;
use crate::error::Result;
use crate::ethereum::{ChainRegistry, ContextOptions};
use crate::lifecycle::Shutdown;

/// Everything the gateway serves from.
#[derive(Debug, Clone)]
pub struct Services {
    pub config: Arc<GatewayConfig>,
    pub circuits: CircuitPool,
    pub chains: Arc<ChainRegistry>,
}

/// Builds circuits and chains from configuration and starts the supervisor.
pub fn build_services(config: GatewayConfig, shutdown: &Shutdown) -> Result<Services> {
    let options = ContextOptions::from_config(&config);
    let circuits = build_circuit_pool(&config.circuits, options.timeouts.handshake())?;
    Ok(assemble(config, circuits, options, shutdown))
}

/// Wires an existing circuit pool into a full set of services.
pub fn assemble(
    config: GatewayConfig,
    circuits: CircuitPool,
    options: ContextOptions,
    shutdown: &Shutdown,
) -> Services {
    let supervisor = CircuitSupervisor::new(
        circuits.clone(),
        Duration::from_secs(config.circuits.supervise_interval_secs.max(1)),
    );
    tokio::spawn(supervisor.run(shutdown.subscribe()));

    let chains = ChainRegistry::build(&config.chains, &circuits, &options);
    tracing::info!(
        circuits = circuits.capacity(),
        chains = chains.len(),
        "Services initialized"
    );

    Services {
        config: Arc::new(config),
        circuits,
        chains: Arc::new(chains),
    }
}
