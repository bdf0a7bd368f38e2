//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → circuit pool → supervisor → one context per chain
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop accepting → drain requests → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: circuits first, then chains, then the listener
//! - Pools shut down by being dropped; no explicit teardown step

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{build_services, Services};
