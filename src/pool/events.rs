//! Pool lifecycle events.

/// Event broadcast to pool subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEvent {
    /// A slot finished construction, successfully or not.
    Created { index: usize, ok: bool },
    /// The set of usable entries changed: the pool was armed or re-armed,
    /// or a slot became healthy.
    Started,
}

/// Buffered events per subscriber before it starts lagging.
pub(crate) const EVENT_CAPACITY: usize = 64;
