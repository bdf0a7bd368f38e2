//! Connection pools and the circuit-indexed pool-of-pools.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::circuit::{CircuitPool, SharedCircuit};
use crate::config::RetryConfig;
use crate::connection::{Connection, ConnectionSettings};
use crate::error::{Error, Result};
use crate::pool::{PoolEvent, ResourcePool, SlotContext, WeakResourcePool};
use crate::resilience::backoff::backoff_for;
use crate::resilience::{retry_until_superseded, Generation};
use crate::rpc::RpcConnection;

/// Connections to every backend URL over one circuit.
pub type RpcPool = ResourcePool<Arc<RpcConnection>>;

/// One connection pool per circuit index.
pub type CircuitPools = ResourcePool<RpcPool>;

/// Builds a pool with one connection per URL, all over `circuit`.
///
/// A WebSocket slot restarts itself when its socket closes. A slot whose
/// connection fails to open restarts after a growing backoff.
pub fn connection_pool(
    name: impl Into<String>,
    circuit: SharedCircuit,
    urls: Arc<[String]>,
    settings: ConnectionSettings,
    retries: RetryConfig,
) -> RpcPool {
    let capacity = urls.len();
    let failures: Arc<[AtomicU32]> = (0..capacity).map(|_| AtomicU32::new(0)).collect();
    ResourcePool::new(name, capacity, move |slot: SlotContext| {
        let circuit = Arc::clone(&circuit);
        let urls = Arc::clone(&urls);
        let failures = Arc::clone(&failures);
        let retries = retries.clone();
        async move {
            let index = slot.index();
            let url = &urls[index];
            match Connection::open(circuit, url, &settings).await {
                Ok(connection) => {
                    failures[index].store(0, Ordering::Relaxed);
                    if let Some(closed) = connection.closed() {
                        slot.restart_on(closed);
                    }
                    Ok(Arc::new(RpcConnection::new(connection)))
                }
                Err(err) => {
                    if !matches!(err, Error::UnknownProtocol(_)) {
                        let attempt = failures[index].fetch_add(1, Ordering::Relaxed).saturating_add(1);
                        let delay = backoff_for(attempt, &retries);
                        debug!(
                            url = %url,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Connection failed, reconnect scheduled"
                        );
                        slot.restart_on(tokio::time::sleep(delay));
                    }
                    Err(err)
                }
            }
        }
    })
}

/// Builds the pool-of-pools for one chain.
///
/// Slot `i` is bound to circuit `i mod M`. Its construction retries while
/// the circuit pool re-arms underneath it, and its entry restarts when that
/// circuit closes. Errored connections inside a ready slot heal on their
/// own (see [`connection_pool`]) so healthy siblings stay up.
pub fn circuit_pools(
    chain: &str,
    circuits: CircuitPool,
    urls: Arc<[String]>,
    settings: ConnectionSettings,
    fanout: usize,
    generation: Generation,
    retries: RetryConfig,
) -> CircuitPools {
    let chain = chain.to_string();
    ResourcePool::new(format!("{chain}/circuits"), fanout, move |slot: SlotContext| {
        let chain = chain.clone();
        let circuits = circuits.clone();
        let urls = Arc::clone(&urls);
        let generation = generation.clone();
        let retries = retries.clone();
        async move {
            let cancel = slot.cancel_token();
            let index = slot.index();

            let (subpool, circuit) = retry_until_superseded(&generation, &cancel, &retries, || {
                build_subpool(&chain, index, &circuits, &urls, settings, &retries, &cancel)
            })
            .await?;

            slot.restart_on(circuit.closed());
            Ok(subpool)
        }
    })
}

async fn build_subpool(
    chain: &str,
    index: usize,
    circuits: &CircuitPool,
    urls: &Arc<[String]>,
    settings: ConnectionSettings,
    retries: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<(RpcPool, SharedCircuit)> {
    let capacity = circuits.capacity();
    if capacity == 0 {
        return Err(Error::connection("circuit pool is empty"));
    }

    let circuit = circuits.get(index % capacity).await?;
    let subpool = connection_pool(
        format!("{chain}/{index}"),
        Arc::clone(&circuit),
        Arc::clone(urls),
        settings,
        retries.clone(),
    );

    // Every backend failing still yields the subpool; callers see the
    // per-connection errors.
    if subpool.wait_any_ok(cancel).await.is_none() && !cancel.is_cancelled() {
        debug!(chain, index, circuit = %circuit.id(), "No backend reachable over circuit");
    }

    Ok((subpool, circuit))
}

/// Re-evaluates the pool-of-pools whenever the circuit pool re-arms.
///
/// Each `Started` event (or a lagged subscription, which may have hidden
/// one) bumps the generation, restarts every errored outer slot, and
/// restarts errored connections inside the ready ones.
pub(crate) fn spawn_rearm_watcher(
    chain: &str,
    circuits: &CircuitPool,
    pools: WeakResourcePool<RpcPool>,
    generation: Generation,
    cancel: CancellationToken,
) {
    let chain = chain.to_string();
    let mut events = circuits.subscribe();

    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                event = events.recv() => event,
                _ = cancel.cancelled() => break,
            };

            match event {
                Ok(PoolEvent::Started) => {}
                Ok(PoolEvent::Created { .. }) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(chain = %chain, skipped, "Circuit events lagged, re-arming");
                }
                Err(RecvError::Closed) => break,
            }

            let Some(pools) = pools.upgrade() else {
                break;
            };
            let generation = generation.bump();
            let errored = pools.err_entries();
            if !errored.is_empty() {
                debug!(chain = %chain, generation, errored = errored.len(), "Re-arming errored circuit slots");
            }
            for (index, _) in errored {
                let _ = pools.restart(index);
            }
            for (_, subpool) in pools.ok_entries() {
                for (index, _) in subpool.err_entries() {
                    let _ = subpool.restart(index);
                }
            }
        }
        debug!(chain = %chain, "Re-arm watcher stopped");
    });
}
