//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pools, fetcher and gateway produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, histograms via the metrics facade)
//!
//! Consumers:
//!     → stdout (pretty for development, JSON for machines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields on every event (chain, pool, index, circuit)
//! - Request ID flows from the gateway into fetch logs
//! - Metrics are cheap; without an installed recorder they are no-ops

pub mod logging;
pub mod metrics;
