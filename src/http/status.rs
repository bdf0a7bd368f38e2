//! Pool health snapshot served on `GET /status`.

use serde::Serialize;

use crate::lifecycle::Services;
use crate::pool::{EntryState, ResourcePool};

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub circuits: PoolStatus,
    pub chains: Vec<ChainStatus>,
}

#[derive(Debug, Serialize)]
pub struct PoolStatus {
    pub name: String,
    pub capacity: usize,
    pub ready: usize,
    pub pending: usize,
    pub errored: usize,
    pub slots: Vec<SlotStatus>,
}

#[derive(Debug, Serialize)]
pub struct SlotStatus {
    pub index: usize,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Calls awaiting a reply on a ready connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_flight: Option<usize>,
    /// Connections of a ready pool-of-pools slot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connections: Option<PoolStatus>,
}

#[derive(Debug, Serialize)]
pub struct ChainStatus {
    pub name: String,
    pub chain_id: u64,
    pub fanout: usize,
    pub generation: u64,
    pub stale_retries: u64,
    pub pools: PoolStatus,
}

pub fn snapshot(services: &Services) -> StatusReport {
    let circuits = pool_status(&services.circuits, |circuit, slot| {
        slot.detail = Some(circuit.id().to_string());
    });

    let chains = services
        .chains
        .iter()
        .map(|ctx| ChainStatus {
            name: ctx.name().to_string(),
            chain_id: ctx.chain().chain_id,
            fanout: ctx.fanout(),
            generation: ctx.generation().current(),
            stale_retries: ctx.generation().stale_retries(),
            pools: pool_status(ctx.pools(), |subpool, slot| {
                slot.connections = Some(pool_status(subpool, |connection, inner| {
                    let connection = connection.connection();
                    inner.detail = Some(format!("{} {}", connection.kind(), connection.url()));
                    inner.in_flight = Some(connection.in_flight());
                }));
            }),
        })
        .collect();

    StatusReport { circuits, chains }
}

fn pool_status<T, F>(pool: &ResourcePool<T>, describe: F) -> PoolStatus
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&T, &mut SlotStatus),
{
    let mut status = PoolStatus {
        name: pool.name().to_string(),
        capacity: pool.capacity(),
        ready: 0,
        pending: 0,
        errored: 0,
        slots: Vec::with_capacity(pool.capacity()),
    };

    for entry in pool.entries() {
        let mut slot = SlotStatus {
            index: entry.index,
            state: entry.state.label(),
            detail: None,
            error: None,
            in_flight: None,
            connections: None,
        };
        match &entry.state {
            EntryState::Pending => status.pending += 1,
            EntryState::Ok(value) => {
                status.ready += 1;
                describe(value, &mut slot);
            }
            EntryState::Err(err) => {
                status.errored += 1;
                slot.error = Some(err.to_string());
            }
        }
        status.slots.push(slot);
    }

    status
}
