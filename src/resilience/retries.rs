//! Retry-until-superseded.
//!
//! # Responsibilities
//! - Track a generation bumped whenever every pool entry must be re-evaluated
//! - Retry an attempt whose failure predates the latest generation
//! - Surface failures that happened under the current generation
//!
//! # Design Decisions
//! - A generation counter, not timestamps: equal clocks cannot alias
//! - Stale retries back off with jitter and observe cancellation

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::observability::metrics;
use crate::resilience::backoff::backoff_for;

/// Shared re-arm counter, plus a tally of the stale failures it caused.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    current: Arc<AtomicU64>,
    stale_retries: Arc<AtomicU64>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Advances the generation, returning the new value.
    pub fn bump(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Failures discarded and retried because a re-arm superseded them.
    pub fn stale_retries(&self) -> u64 {
        self.stale_retries.load(Ordering::Relaxed)
    }
}

/// Runs `attempt` until it succeeds, fails under the current generation, or
/// `cancel` fires.
pub async fn retry_until_superseded<T, F, Fut>(
    generation: &Generation,
    cancel: &CancellationToken,
    retries: &RetryConfig,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut stale_attempts = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let started_under = generation.current();
        let outcome = tokio::select! {
            outcome = attempt() => outcome,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if generation.current() != started_under => {
                stale_attempts += 1;
                generation.stale_retries.fetch_add(1, Ordering::Relaxed);
                metrics::record_stale_retry();
                let delay = backoff_for(stale_attempts, retries);
                debug!(
                    error = %err,
                    attempt = stale_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Discarding stale failure, retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                }
            }
            Err(err) => return Err(err),
        }
    }
}
