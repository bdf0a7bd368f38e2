//! Cross-validated fetching.
//!
//! # Data Flow
//! ```text
//! fetch_or_fail(ctx, request)
//!     → one worker per pool-of-pools slot (JoinSet)
//!         → pools.get(i) → random healthy RpcConnection → call
//!     → settlements recorded in arrival order (tally.rs)
//!     → early decision once the leader cannot be caught
//!     → unanimous | majority | coin-flip | ConsensusUnavailable
//! ```
//!
//! # Design Decisions
//! - Results are grouped by canonical JSON (object keys sorted)
//! - Disagreement is never an error; only total failure is
//! - A tie between the two largest groups is broken by an injected coin
//! - `no_check` races for the first success and skips reconciliation

pub mod fetch;
pub mod random;
pub mod tally;

pub use fetch::{fetch_or_fail, FetchOptions, Fetched, Provenance};
pub use random::{RandomSource, ThreadRandom};
pub use tally::{Agreement, Resolution, Tally};
