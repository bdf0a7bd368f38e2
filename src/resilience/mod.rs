//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Pool-of-pools slot construction:
//!     → retries.rs (retry while a re-arm superseded the attempt)
//!     → backoff.rs (jittered delay between stale attempts)
//!
//! Consensus worker:
//!     → timeouts.rs (handshake class for acquisition, request class for the call)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Every timeout derives from one ping baseline
//! - Only stale failures retry; a failure under the current generation surfaces
//! - Jittered backoff prevents thundering herd after a re-arm

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use retries::{retry_until_superseded, Generation};
pub use timeouts::{CallClass, TimeoutPolicy};
