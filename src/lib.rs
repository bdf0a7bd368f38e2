//! Consensus JSON-RPC fetching over anonymizing circuits.
//!
//! # Architecture Overview
//!
//! ```text
//!   caller / gateway
//!         │
//!         ▼
//!   ┌──────────────┐   one worker per circuit index
//!   │  consensus   │──────────────┬──────────────┬─────────────┐
//!   └──────────────┘              ▼              ▼             ▼
//!                          ┌────────────┐ ┌────────────┐ ┌────────────┐
//!   ethereum (pool-of-     │ slot 0     │ │ slot 1     │ │ slot N-1   │
//!   pools per chain)       │ RpcPool    │ │ RpcPool    │ │ RpcPool    │
//!                          └─────┬──────┘ └─────┬──────┘ └─────┬──────┘
//!                                ▼              ▼              ▼
//!   connection             Url / WebSocket connections, one per backend URL
//!                                │              │              │
//!   circuit                 circuit 0      circuit 1      circuit M-1
//!                                └──────────────┴──────────────┘
//!                                        backends
//! ```
//!
//! Every level is a [`pool::ResourcePool`]: a fixed set of slots, each built
//! asynchronously and restartable on its own.

// Core
pub mod error;
pub mod pool;

// Transport
pub mod circuit;
pub mod connection;
pub mod rpc;

// Fetching
pub mod consensus;
pub mod ethereum;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

// Gateway
pub mod http;

pub use config::GatewayConfig;
pub use consensus::{fetch_or_fail, FetchOptions, Fetched, Provenance};
pub use error::{Error, Result};
pub use ethereum::EthereumContext;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
pub use pool::ResourcePool;
