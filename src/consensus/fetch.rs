//! Fan-out fetch with reconciliation.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::consensus::random::RandomSource;
use crate::consensus::tally::{Agreement, Tally};
use crate::error::{Error, Result};
use crate::ethereum::{CircuitPools, EthereumContext, RpcPool};
use crate::observability::metrics;
use crate::resilience::TimeoutPolicy;
use crate::rpc::{RpcConnection, RpcRequestInit};

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Cancels the fetch and every worker.
    pub cancel: Option<CancellationToken>,
    /// Return the first success without cross-checking.
    pub no_check: bool,
}

/// How a fetched value was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub agreement: Agreement,
    /// Size of the group that supplied the value.
    pub agreeing: usize,
    pub workers: usize,
    pub successes: usize,
    pub failures: usize,
    /// Workers still running when the result was decided.
    pub abandoned: usize,
    /// Pool-of-pools index whose answer was returned.
    pub circuit: usize,
}

/// A trusted value and its provenance.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub value: Value,
    pub provenance: Provenance,
}

/// Sends `init` through every circuit of the context and reconciles the
/// answers.
///
/// Fails only when every worker failed, with
/// [`Error::ConsensusUnavailable`] carrying each worker's error, or when
/// cancelled.
pub async fn fetch_or_fail(ctx: &EthereumContext, init: &RpcRequestInit, options: FetchOptions) -> Result<Fetched> {
    let start = Instant::now();
    let cancel = options.cancel.unwrap_or_default();
    // Workers observe this scope; it is cancelled as soon as we return.
    let scope = cancel.child_token();
    let _scope_guard = scope.clone().drop_guard();

    let workers = ctx.fanout();
    let random = ctx.random();
    let mut set = JoinSet::new();
    for index in 0..workers {
        let worker = Worker {
            index,
            pools: ctx.pools().clone(),
            init: init.clone(),
            timeouts: ctx.timeouts(),
            random: Arc::clone(&random),
            cancel: scope.clone(),
        };
        set.spawn(async move { (index, worker.run().await) });
    }

    trace!(chain = %ctx.name(), method = %init.method, workers, "Fetch started");

    let mut tally = Tally::new();
    let mut settled = 0;
    loop {
        let joined = tokio::select! {
            joined = set.join_next() => joined,
            _ = cancel.cancelled() => {
                debug!(chain = %ctx.name(), method = %init.method, "Fetch cancelled");
                return Err(Error::Cancelled);
            }
        };
        let Some(joined) = joined else {
            break;
        };
        settled += 1;

        match joined {
            Ok((index, Ok(value))) => {
                if options.no_check {
                    let provenance = Provenance {
                        agreement: Agreement::Unchecked,
                        agreeing: 1,
                        workers,
                        successes: 1,
                        failures: tally.failures().len(),
                        abandoned: workers - settled,
                        circuit: index,
                    };
                    metrics::record_fetch(ctx.name(), Agreement::Unchecked.as_str(), start);
                    return Ok(Fetched { value, provenance });
                }
                tally.record_success(index, value);
            }
            Ok((index, Err(err))) => {
                debug!(chain = %ctx.name(), method = %init.method, index, error = %err, "Worker failed");
                tally.record_failure(err);
            }
            Err(e) => {
                tally.record_failure(Error::connection(format!("worker aborted: {e}")));
            }
        }

        if !options.no_check && tally.decided(workers - settled) {
            break;
        }
    }

    let abandoned = workers - settled;
    match tally.resolve(random.as_ref()) {
        Some(resolution) => {
            let provenance = Provenance {
                agreement: resolution.agreement,
                agreeing: resolution.agreeing,
                workers,
                successes: tally.successes(),
                failures: tally.failures().len(),
                abandoned,
                circuit: resolution.worker,
            };
            debug!(
                chain = %ctx.name(),
                method = %init.method,
                agreement = %provenance.agreement,
                agreeing = provenance.agreeing,
                groups = tally.group_count(),
                successes = provenance.successes,
                failures = provenance.failures,
                abandoned,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Fetch resolved"
            );
            metrics::record_fetch(ctx.name(), resolution.agreement.as_str(), start);
            Ok(Fetched {
                value: resolution.value,
                provenance,
            })
        }
        None => {
            metrics::record_fetch_failure(ctx.name(), start);
            tracing::warn!(chain = %ctx.name(), method = %init.method, workers, "Every worker failed");
            Err(Error::ConsensusUnavailable {
                workers,
                errors: tally.into_failures(),
            })
        }
    }
}

/// One independent attempt through one pool-of-pools slot.
struct Worker {
    index: usize,
    pools: CircuitPools,
    init: RpcRequestInit,
    timeouts: TimeoutPolicy,
    random: Arc<dyn RandomSource>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) -> Result<Value> {
        let handshake = self.timeouts.handshake();
        let acquire = async {
            let subpool = self.pools.get(self.index).await?;
            pick_connection(&subpool, self.random.as_ref(), &self.cancel).await
        };
        let connection = tokio::select! {
            acquired = tokio::time::timeout(handshake, acquire) => {
                acquired.map_err(|_| Error::timeout(handshake))??
            }
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
        };

        tokio::select! {
            result = connection.request(&self.init, self.timeouts.request()) => result,
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
        }
    }
}

/// A uniformly chosen healthy connection, waiting for one if needed.
async fn pick_connection(
    subpool: &RpcPool,
    random: &dyn RandomSource,
    cancel: &CancellationToken,
) -> Result<Arc<RpcConnection>> {
    loop {
        let mut healthy = subpool.ok_entries();
        if !healthy.is_empty() {
            let (_, connection) = healthy.swap_remove(random.pick(healthy.len()));
            return Ok(connection);
        }

        if subpool.wait_any_ok(cancel).await.is_none() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            return Err(subpool
                .err_entries()
                .into_iter()
                .next()
                .map(|(_, error)| error)
                .unwrap_or_else(|| Error::connection("no backend connection available")));
        }
    }
}
