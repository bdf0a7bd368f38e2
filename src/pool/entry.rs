//! Pool slot state.

use crate::error::{Error, Result};

/// State of a single pool slot.
#[derive(Debug, Clone)]
pub enum EntryState<T> {
    /// Construction is in flight.
    Pending,
    /// Construction succeeded.
    Ok(T),
    /// Construction failed; the slot stays failed until restarted.
    Err(Error),
}

impl<T: Clone> EntryState<T> {
    /// Returns the settled result, or `None` while pending.
    pub fn settled(&self) -> Option<Result<T>> {
        match self {
            Self::Pending => None,
            Self::Ok(value) => Some(Ok(value.clone())),
            Self::Err(err) => Some(Err(err.clone())),
        }
    }

    /// Short label used in logs and status output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ok(_) => "ready",
            Self::Err(_) => "errored",
        }
    }
}

/// Snapshot of one slot.
#[derive(Debug, Clone)]
pub struct PoolEntry<T> {
    pub index: usize,
    pub state: EntryState<T>,
}
