//! Generic fixed-capacity pool with per-slot restart.
//!
//! # Example
//!
//! ```ignore
//! let pool = ResourcePool::new("sockets", 4, |slot: SlotContext| async move {
//!     let socket = connect(slot.index()).await?;
//!     slot.restart_on(socket.closed());
//!     Ok(Arc::new(socket))
//! });
//!
//! let socket = pool.get(2).await?;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::observability::metrics;
use crate::pool::entry::{EntryState, PoolEntry};
use crate::pool::events::{PoolEvent, EVENT_CAPACITY};

type Factory<T> = Arc<dyn Fn(SlotContext) -> BoxFuture<'static, Result<T>> + Send + Sync>;

// ============================================================================
// SlotContext
// ============================================================================

/// Handle given to the factory for one construction of one slot.
///
/// The cancellation token covers both the construction and the lifetime of
/// the entry it produces: it fires when the slot is restarted or the pool is
/// dropped.
#[derive(Clone)]
pub struct SlotContext {
    index: usize,
    cancel: CancellationToken,
    restarter: Arc<dyn Fn() + Send + Sync>,
}

impl SlotContext {
    /// Index of the slot being constructed.
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Token cancelled when this entry is invalidated.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Waits until this entry is invalidated.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Restarts this slot when `signal` resolves.
    ///
    /// The subscription lives exactly as long as the entry: it is dropped
    /// when the slot is restarted for any other reason or the pool goes
    /// away, and it never restarts a newer entry.
    pub fn restart_on<F>(&self, signal: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let restarter = Arc::clone(&self.restarter);
        tokio::spawn(async move {
            tokio::select! {
                _ = signal => restarter(),
                _ = cancel.cancelled() => {}
            }
        });
    }
}

impl fmt::Debug for SlotContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotContext")
            .field("index", &self.index)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

// ============================================================================
// ResourcePool
// ============================================================================

/// Fixed-capacity indexed pool whose slots are built by an async factory.
///
/// Cloning is cheap and yields a handle to the same pool. The pool shuts
/// down (cancelling every construction and entry scope) when the last handle
/// is dropped.
pub struct ResourcePool<T> {
    inner: Arc<Inner<T>>,
}

/// Non-owning pool handle, used by background tasks that must not keep the
/// pool alive.
pub struct WeakResourcePool<T> {
    inner: Weak<Inner<T>>,
}

struct Inner<T> {
    name: String,
    slots: Vec<Slot<T>>,
    factory: Factory<T>,
    events: broadcast::Sender<PoolEvent>,
    /// Bumped on every slot transition.
    revision: watch::Sender<u64>,
}

struct Slot<T> {
    state: watch::Sender<EntryState<T>>,
    lease: Mutex<Lease>,
}

/// Identity of the slot's current construction.
struct Lease {
    generation: u64,
    cancel: CancellationToken,
}

impl<T> Clone for ResourcePool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Clone for WeakResourcePool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> WeakResourcePool<T> {
    /// Returns the pool if it is still alive.
    pub fn upgrade(&self) -> Option<ResourcePool<T>> {
        self.inner.upgrade().map(|inner| ResourcePool { inner })
    }
}

impl<T> fmt::Debug for ResourcePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("name", &self.inner.name)
            .field("capacity", &self.inner.slots.len())
            .finish()
    }
}

impl<T> ResourcePool<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a pool and starts constructing every slot.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<F, Fut>(name: impl Into<String>, capacity: usize, factory: F) -> Self
    where
        F: Fn(SlotContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let factory: Factory<T> = Arc::new(move |slot| Box::pin(factory(slot)));
        let slots = (0..capacity)
            .map(|_| Slot {
                state: watch::channel(EntryState::Pending).0,
                lease: Mutex::new(Lease {
                    generation: 0,
                    cancel: CancellationToken::new(),
                }),
            })
            .collect();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (revision, _) = watch::channel(0);

        let inner = Arc::new(Inner {
            name: name.into(),
            slots,
            factory,
            events,
            revision,
        });

        for index in 0..capacity {
            inner.relaunch(index, None);
        }

        debug!(pool = %inner.name, capacity, "Pool armed");
        inner.emit(PoolEvent::Started);

        Self { inner }
    }

    /// Name used in logs and metrics.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Fixed number of slots.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.slots.len()
    }

    /// Returns the slot's result, waiting while it is pending.
    ///
    /// An errored slot yields its error; nothing is retried.
    pub async fn get(&self, index: usize) -> Result<T> {
        let mut state = self.inner.slot(index)?.state.subscribe();
        loop {
            if let Some(result) = state.borrow_and_update().settled() {
                return result;
            }
            state.changed().await.map_err(|_| Error::Cancelled)?;
        }
    }

    /// Resolves once the slot holds a value. Slot errors are never surfaced
    /// here; a failed slot simply keeps this future waiting until it is
    /// restarted successfully.
    pub async fn ok(&self, index: usize) -> Result<T> {
        let mut state = self.inner.slot(index)?.state.subscribe();
        loop {
            if let EntryState::Ok(value) = &*state.borrow_and_update() {
                return Ok(value.clone());
            }
            state.changed().await.map_err(|_| Error::Cancelled)?;
        }
    }

    /// Waits until at least one slot is healthy, returning its index, or
    /// until every slot has errored (or `cancel` fires), returning `None`.
    pub async fn wait_any_ok(&self, cancel: &CancellationToken) -> Option<usize> {
        let mut revision = self.inner.revision.subscribe();
        loop {
            revision.borrow_and_update();

            let mut all_errored = true;
            for (index, slot) in self.inner.slots.iter().enumerate() {
                match &*slot.state.borrow() {
                    EntryState::Ok(_) => return Some(index),
                    EntryState::Err(_) => {}
                    EntryState::Pending => all_errored = false,
                }
            }
            if all_errored {
                return None;
            }

            tokio::select! {
                changed = revision.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Invalidates the slot and constructs it again.
    ///
    /// Any construction in flight for the slot is cancelled and its result
    /// discarded.
    pub fn restart(&self, index: usize) -> Result<()> {
        self.inner.slot(index)?;
        metrics::record_slot_restart(&self.inner.name);
        debug!(pool = %self.inner.name, index, "Restarting slot");
        self.inner.relaunch(index, None);
        Ok(())
    }

    /// Signals subscribers that the set of usable entries changed.
    pub fn rearm(&self) {
        debug!(pool = %self.inner.name, "Pool re-armed");
        self.inner.emit(PoolEvent::Started);
    }

    /// Subscribes to lifecycle events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.inner.events.subscribe()
    }

    /// Snapshot of every slot.
    pub fn entries(&self) -> Vec<PoolEntry<T>> {
        self.inner
            .slots
            .iter()
            .enumerate()
            .map(|(index, slot)| PoolEntry {
                index,
                state: slot.state.borrow().clone(),
            })
            .collect()
    }

    /// Snapshot of errored slots.
    pub fn err_entries(&self) -> Vec<(usize, Error)> {
        self.inner
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match &*slot.state.borrow() {
                EntryState::Err(err) => Some((index, err.clone())),
                _ => None,
            })
            .collect()
    }

    /// Snapshot of healthy slots.
    pub fn ok_entries(&self) -> Vec<(usize, T)> {
        self.inner
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match &*slot.state.borrow() {
                EntryState::Ok(value) => Some((index, value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Returns a handle that does not keep the pool alive.
    pub fn downgrade(&self) -> WeakResourcePool<T> {
        WeakResourcePool {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl<T> Inner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn slot(&self, index: usize) -> Result<&Slot<T>> {
        self.slots.get(index).ok_or(Error::IndexOutOfRange {
            index,
            capacity: self.slots.len(),
        })
    }

    /// Starts a fresh construction for the slot.
    ///
    /// With `expected` set, only relaunches if the slot still runs that
    /// generation. Returns whether a construction was started.
    fn relaunch(self: &Arc<Self>, index: usize, expected: Option<u64>) -> bool {
        let slot = &self.slots[index];
        let (generation, cancel, previous) = {
            let mut lease = slot.lease.lock();
            if let Some(expected) = expected {
                if lease.generation != expected || lease.cancel.is_cancelled() {
                    return false;
                }
            }
            lease.cancel.cancel();
            lease.generation += 1;
            lease.cancel = CancellationToken::new();
            let previous = slot.state.send_replace(EntryState::Pending);
            (lease.generation, lease.cancel.clone(), previous)
        };
        drop(previous);
        self.bump_revision();

        let weak = Arc::downgrade(self);
        let restarter: Arc<dyn Fn() + Send + Sync> = {
            let weak = Weak::clone(&weak);
            Arc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    if inner.relaunch(index, Some(generation)) {
                        metrics::record_slot_restart(&inner.name);
                        debug!(pool = %inner.name, index, "Entry closed, slot restarted");
                    }
                }
            })
        };
        let context = SlotContext {
            index,
            cancel: cancel.clone(),
            restarter,
        };
        let construction = (self.factory)(context);

        tokio::spawn(async move {
            let result = tokio::select! {
                result = construction => result,
                _ = cancel.cancelled() => Err(Error::Cancelled),
            };
            if let Some(inner) = weak.upgrade() {
                inner.complete(index, generation, result);
            }
        });

        true
    }

    /// Stores a construction result if it belongs to the current generation.
    fn complete(&self, index: usize, generation: u64, result: Result<T>) {
        let slot = &self.slots[index];
        let ok = result.is_ok();
        {
            let lease = slot.lease.lock();
            if lease.generation != generation {
                trace!(pool = %self.name, index, generation, "Discarding superseded construction");
                return;
            }
            match result {
                Ok(value) => {
                    slot.state.send_replace(EntryState::Ok(value));
                }
                Err(err) => {
                    warn!(pool = %self.name, index, error = %err, "Slot construction failed");
                    slot.state.send_replace(EntryState::Err(err));
                }
            }
        }
        self.bump_revision();

        self.emit(PoolEvent::Created { index, ok });
        if ok {
            self.emit(PoolEvent::Started);
        }
    }

    fn bump_revision(&self) {
        self.revision.send_modify(|revision| *revision = revision.wrapping_add(1));
    }

    fn emit(&self, event: PoolEvent) {
        // No receivers just means nobody subscribed yet.
        let _ = self.events.send(event);
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        for slot in &self.slots {
            slot.lease.lock().cancel.cancel();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;
    use tokio::time::{sleep, timeout};

    #[tokio::test]
    async fn test_capacity_invariant() {
        let pool = ResourcePool::new("numbers", 4, |slot: SlotContext| async move {
            Ok(slot.index() * 10)
        });

        assert_eq!(pool.entries().len(), 4);
        for index in 0..4 {
            assert_eq!(pool.get(index).await.unwrap(), index * 10);
        }

        for index in 0..4 {
            pool.restart(index).unwrap();
            assert_eq!(pool.entries().len(), 4);
        }
        for index in 0..4 {
            assert_eq!(pool.get(index).await.unwrap(), index * 10);
        }
        assert_eq!(pool.capacity(), 4);
    }

    #[tokio::test]
    async fn test_error_confined_to_slot() {
        let pool = ResourcePool::new("flaky", 3, |slot: SlotContext| async move {
            if slot.index() == 1 {
                Err(Error::connection("circuit refused"))
            } else {
                Ok(slot.index())
            }
        });

        assert_eq!(pool.get(0).await.unwrap(), 0);
        assert!(matches!(pool.get(1).await, Err(Error::Connection(_))));
        assert_eq!(pool.get(2).await.unwrap(), 2);

        let errored: Vec<usize> = pool.err_entries().into_iter().map(|(i, _)| i).collect();
        assert_eq!(errored, vec![1]);
        assert_eq!(pool.ok_entries().len(), 2);
    }

    #[tokio::test]
    async fn test_restart_twice_leaves_one_live_construction() {
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let pool = {
            let started = Arc::clone(&started);
            let finished = Arc::clone(&finished);
            ResourcePool::new("slow", 1, move |_slot: SlotContext| {
                let started = Arc::clone(&started);
                let finished = Arc::clone(&finished);
                async move {
                    let ordinal = started.fetch_add(1, Ordering::SeqCst) + 1;
                    sleep(Duration::from_millis(50)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(ordinal)
                }
            })
        };

        pool.restart(0).unwrap();
        pool.restart(0).unwrap();

        assert_eq!(pool.get(0).await.unwrap(), 3);
        sleep(Duration::from_millis(100)).await;

        assert_eq!(started.load(Ordering::SeqCst), 3);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(pool.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_events() {
        let pool = ResourcePool::new("events", 2, |slot: SlotContext| async move {
            if slot.index() == 0 {
                Ok(())
            } else {
                Err(Error::Cancelled)
            }
        });
        let mut events = pool.subscribe();

        let mut created = Vec::new();
        let mut started = 0;
        while created.len() < 2 {
            match timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap() {
                PoolEvent::Created { index, ok } => created.push((index, ok)),
                PoolEvent::Started => started += 1,
            }
        }
        created.sort();
        assert_eq!(created, vec![(0, true), (1, false)]);

        // Success on slot 0 also re-arms the pool.
        if started == 0 {
            let event = timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
            assert_eq!(event, PoolEvent::Started);
        }

        pool.rearm();
        let event = timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
        assert_eq!(event, PoolEvent::Started);
    }

    #[tokio::test]
    async fn test_wait_any_ok() {
        let pool = ResourcePool::new("mixed", 2, |slot: SlotContext| async move {
            if slot.index() == 0 {
                Err(Error::connection("dead"))
            } else {
                sleep(Duration::from_millis(20)).await;
                Ok(slot.index())
            }
        });
        let cancel = CancellationToken::new();
        assert_eq!(pool.wait_any_ok(&cancel).await, Some(1));

        let dead = ResourcePool::new("dead", 3, |_slot: SlotContext| async move {
            Err::<(), _>(Error::connection("dead"))
        });
        assert_eq!(dead.wait_any_ok(&cancel).await, None);

        let empty = ResourcePool::new("empty", 0, |_slot: SlotContext| async move { Ok(()) });
        assert_eq!(empty.wait_any_ok(&cancel).await, None);
    }

    #[tokio::test]
    async fn test_wait_any_ok_observes_cancel() {
        let pool = ResourcePool::new("stuck", 1, |slot: SlotContext| async move {
            slot.cancelled().await;
            Ok(())
        });
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(pool.wait_any_ok(&cancel).await, None);
    }

    #[tokio::test]
    async fn test_restart_on_signal() {
        let closed = Arc::new(Notify::new());
        let built = Arc::new(AtomicUsize::new(0));

        let pool = {
            let closed = Arc::clone(&closed);
            let built = Arc::clone(&built);
            ResourcePool::new("sockets", 1, move |slot: SlotContext| {
                let closed = Arc::clone(&closed);
                let built = Arc::clone(&built);
                async move {
                    slot.restart_on(async move { closed.notified().await });
                    Ok(built.fetch_add(1, Ordering::SeqCst) + 1)
                }
            })
        };

        assert_eq!(pool.get(0).await.unwrap(), 1);
        closed.notify_one();

        let rebuilt = timeout(Duration::from_secs(1), async {
            loop {
                if let Ok(2) = pool.get(0).await {
                    break;
                }
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(rebuilt.is_ok());
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ok_skips_errors() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let pool = {
            let attempts = Arc::clone(&attempts);
            ResourcePool::new("retry", 1, move |_slot: SlotContext| {
                let attempts = Arc::clone(&attempts);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(Error::connection("first attempt fails"))
                    } else {
                        Ok("ready")
                    }
                }
            })
        };

        assert!(pool.get(0).await.is_err());
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.ok(0).await })
        };
        sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        pool.restart(0).unwrap();
        let value = timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap().unwrap();
        assert_eq!(value, "ready");
    }

    #[tokio::test]
    async fn test_out_of_range() {
        let pool = ResourcePool::new("small", 1, |_slot: SlotContext| async move { Ok(()) });
        assert!(matches!(
            pool.restart(3),
            Err(Error::IndexOutOfRange { index: 3, capacity: 1 })
        ));
        assert!(pool.get(1).await.is_err());
    }

    #[tokio::test]
    async fn test_drop_cancels_constructions() {
        let cancelled = Arc::new(Notify::new());
        let pool = {
            let cancelled = Arc::clone(&cancelled);
            ResourcePool::new("doomed", 1, move |slot: SlotContext| {
                let cancelled = Arc::clone(&cancelled);
                async move {
                    let token = slot.cancel_token();
                    tokio::spawn(async move {
                        token.cancelled().await;
                        cancelled.notify_one();
                    });
                    Ok(())
                }
            })
        };
        pool.get(0).await.unwrap();
        drop(pool);

        assert!(timeout(Duration::from_secs(1), cancelled.notified()).await.is_ok());
    }
}
