//! Circuit pool construction from configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::circuit::{Circuit, DirectCircuit, SharedCircuit, Socks5Circuit};
use crate::config::{CircuitConfig, CircuitProvider};
use crate::error::{Error, Result};
use crate::pool::{ResourcePool, SlotContext};

/// Pool of circuits indexed `0..count`.
pub type CircuitPool = ResourcePool<SharedCircuit>;

/// Builds the circuit pool for the configured provider.
///
/// Every construction of a slot yields a fresh circuit; each circuit's close
/// signal restarts its own slot.
pub fn build_circuit_pool(config: &CircuitConfig, handshake_timeout: Duration) -> Result<CircuitPool> {
    match config.provider {
        CircuitProvider::Socks5 => {
            let proxy: SocketAddr = config.socks_address.parse().map_err(|_| {
                Error::Config(format!("invalid proxy address '{}'", config.socks_address))
            })?;
            tracing::info!(proxy = %proxy, count = config.count, "Building SOCKS5 circuits");

            Ok(ResourcePool::new("circuits", config.count, move |slot: SlotContext| async move {
                let isolation = isolation_token(slot.index());
                let circuit = Socks5Circuit::connect(proxy, isolation, handshake_timeout).await?;
                tracing::debug!(index = slot.index(), circuit = %circuit.id(), "Circuit built");
                let circuit: SharedCircuit = Arc::new(circuit);
                slot.restart_on(circuit.closed());
                Ok(circuit)
            }))
        }
        CircuitProvider::Direct => {
            tracing::warn!(count = config.count, "Using direct circuits: traffic is not anonymized");

            Ok(ResourcePool::new("circuits", config.count, move |slot: SlotContext| async move {
                let circuit: SharedCircuit = Arc::new(DirectCircuit::new(handshake_timeout));
                slot.restart_on(circuit.closed());
                Ok(circuit)
            }))
        }
    }
}

/// SOCKS credentials unique to one construction of one slot.
fn isolation_token(index: usize) -> String {
    format!("circuit-rpc-{index}-{:016x}", rand::random::<u64>())
}
