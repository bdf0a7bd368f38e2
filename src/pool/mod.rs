//! Fixed-capacity resource pools.
//!
//! # Data Flow
//! ```text
//! ResourcePool::new(capacity, factory)
//!     → one construction task per slot (factory(SlotContext))
//!     → slot settles to Ok(T) or Err(error)
//!     → events: Created { index, ok }, Started
//!
//! restart(index)
//!     → cancel the slot's token (in-flight construction + entry scope)
//!     → slot back to Pending, fresh construction
//! ```
//!
//! # Design Decisions
//! - Capacity never changes; a slot is always Pending, Ok or Err
//! - A slot is written only by `restart` and by its current construction
//!   (generation-checked), so stale constructions can never land
//! - Errors stay confined to their slot; callers retry with `restart`
//! - Subscriptions are broadcast receivers, released on drop

pub mod entry;
pub mod events;
pub mod resource;

pub use entry::{EntryState, PoolEntry};
pub use events::PoolEvent;
pub use resource::{ResourcePool, SlotContext, WeakResourcePool};
