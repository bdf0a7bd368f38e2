//! Per-chain pool hierarchy.
//!
//! # Data Flow
//! ```text
//! CircuitPool (M circuits)
//!     │  Started events ──► re-arm watcher ──► generation.bump()
//!     │                                      └► restart errored outer slots
//!     ▼
//! CircuitPools (N slots, slot i bound to circuit i mod M)
//!     │  retry_until_superseded(generation)
//!     ▼
//! RpcPool (one slot per backend URL)
//!     ▼
//! RpcConnection ──► Connection (Url | WebSocket)
//! ```
//!
//! # Design Decisions
//! - A closed circuit restarts only the outer slot built on it
//! - A closed WebSocket restarts only its own inner slot
//! - The watcher holds a weak handle and dies with the context

pub mod context;
pub mod pools;
pub mod registry;

pub use context::{ContextOptions, EthereumContext};
pub use pools::{circuit_pools, connection_pool, CircuitPools, RpcPool};
pub use registry::ChainRegistry;
