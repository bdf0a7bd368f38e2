//! Anonymizing circuit abstraction and provider adapters.
//!
//! A circuit is an isolated path to the network. Every stream opened through
//! the same circuit shares its exit; streams on different circuits do not.
//!
//! # Data Flow
//! ```text
//! CircuitConfig ──► build_circuit_pool ──► ResourcePool<SharedCircuit>
//!                                              │
//!                      Socks5Circuit / DirectCircuit
//!                                              │
//!                     open(host, port) ──► CircuitStream
//! ```
//!
//! # Design Decisions
//! - Circuits are trait objects so tests can pin circuits to local backends
//! - `closed()` is a detached future; the pool slot owning the circuit turns
//!   it into a restart through `SlotContext::restart_on`

pub mod direct;
pub mod provider;
pub mod socks;
pub mod supervisor;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

pub use direct::DirectCircuit;
pub use provider::{build_circuit_pool, CircuitPool};
pub use socks::Socks5Circuit;
pub use supervisor::CircuitSupervisor;

/// Global counter for circuit IDs.
static CIRCUIT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CircuitId(u64);

impl CircuitId {
    /// Generate a new unique circuit ID.
    pub fn new() -> Self {
        Self(CIRCUIT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for CircuitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "circuit-{}", self.0)
    }
}

/// Byte stream usable by the HTTP and WebSocket transports.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<S> AsyncStream for S where S: AsyncRead + AsyncWrite + Unpin + Send {}

/// Boxed stream opened through a circuit.
pub type CircuitStream = Box<dyn AsyncStream>;

/// An isolated network path.
#[async_trait]
pub trait Circuit: Send + Sync + fmt::Debug {
    fn id(&self) -> CircuitId;

    /// Opens a TCP byte stream to `host:port` through this circuit.
    async fn open(&self, host: &str, port: u16) -> Result<CircuitStream>;

    /// Resolves once the circuit is no longer usable.
    fn closed(&self) -> BoxFuture<'static, ()>;

    fn is_closed(&self) -> bool;
}

/// Circuit shared between every connection built over it.
pub type SharedCircuit = Arc<dyn Circuit>;
