//! Serialized call pacing.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{sleep_until, Instant};

/// Spaces accesses at least `interval` apart, in reservation order.
///
/// Each waiter reserves the next free slot synchronously, so concurrent
/// callers queue behind each other instead of all waking at once.
#[derive(Debug)]
pub struct Cooldown {
    interval: Duration,
    next: Mutex<Option<Instant>>,
}

impl Cooldown {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Mutex::new(None),
        }
    }

    /// Waits for this caller's slot.
    pub async fn wait(&self) {
        let slot = self.reserve();
        sleep_until(slot).await;
    }

    fn reserve(&self) -> Instant {
        let now = Instant::now();
        let mut next = self.next.lock();
        let slot = match *next {
            Some(reserved) if reserved > now => reserved,
            _ => now,
        };
        *next = Some(slot + self.interval);
        slot
    }
}
