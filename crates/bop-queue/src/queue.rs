//! The shared queue core.
//!
//! A [`Queue`] owns the storage engine, the liveness of both sides and the
//! two events tasks park on. It is always held in an [`Arc`]: every handle
//! keeps a reference, so the core outlives any handle that may still flip a
//! liveness flag or wake a waiter.
//!
//! # Liveness
//!
//! Each side keeps a single atomic word: the number of live handles plus a
//! `CLOSED` bit. Minting a handle increments the count; dropping one
//! decrements it, and the decrement that would reach zero sets `CLOSED`
//! instead, in the same compare-and-swap. Once closed a side never reopens
//! and no handle can be minted for it.
//!
//! ```text
//!   count=0 ──mint──▶ count=1 ──mint──▶ count=2      (multi-party only)
//!                        ▲ │              │
//!                        │ └────drop──────┘
//!                        │
//!                      drop ──▶ CLOSED  (terminal; both events notified)
//! ```
//!
//! A side that never had a handle is alive: a consumer waits for a producer
//! that has not been minted yet.
//!
//! # Waiting
//!
//! Push and pop take an [`EventKey`](crate::event::EventKey) *before* probing
//! the storage, then check the opposite side's liveness, then park. Any
//! state change after the key was taken (a push, a pop, a side closing) bumps
//! the event, so the park returns at once and the loop re-probes.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tracing::{debug, trace, warn};

use crate::config::QueueConfig;
use crate::consumer::Consumer;
use crate::deadline::Deadline;
use crate::error::{QueueError, QueueResult, Side};
use crate::event::{Event, WaitOutcome};
use crate::producer::Producer;
use crate::storage::{MpmcArray, SpscRing, Storage, Topology};

/// Set once the last handle of a side is gone.
const CLOSED: usize = 1 << (usize::BITS - 1);

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

/// Queue over the single-producer, single-consumer ring.
pub type SpscQueue<T> = Queue<T, SpscRing<T>>;

/// Queue over the multi-producer, multi-consumer array.
pub type MpmcQueue<T> = Queue<T, MpmcArray<T>>;

/// Why a side refused a new handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MintRefused {
    Closed,
    Limit,
}

/// Live-handle count and `CLOSED` bit of one side.
struct Liveness {
    state: AtomicUsize,
}

impl Liveness {
    const fn new() -> Self {
        Self {
            state: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn is_alive(&self) -> bool {
        self.state.load(Ordering::SeqCst) & CLOSED == 0
    }

    #[inline]
    fn count(&self) -> usize {
        self.state.load(Ordering::SeqCst) & !CLOSED
    }

    /// Checks whether a handle could be minted right now.
    fn check(&self, multi: bool) -> Result<(), MintRefused> {
        Self::admits(self.state.load(Ordering::SeqCst), multi)
    }

    fn admits(state: usize, multi: bool) -> Result<(), MintRefused> {
        if state & CLOSED != 0 {
            Err(MintRefused::Closed)
        } else if !multi && state != 0 {
            Err(MintRefused::Limit)
        } else {
            Ok(())
        }
    }

    /// Registers a new live handle.
    fn acquire(&self, multi: bool) -> Result<(), MintRefused> {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            Self::admits(current, multi)?;
            match self.state.compare_exchange_weak(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Unregisters a live handle. Returns `true` if this was the last one and
    /// the side is now closed.
    fn release(&self) -> bool {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            debug_assert!(current & CLOSED == 0, "released a handle of a closed side");
            debug_assert!(current > 0, "released more handles than were minted");

            let last = current == 1;
            let next = if last { CLOSED } else { current - 1 };
            match self.state.compare_exchange_weak(
                current,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return last,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Shared state of a bounded producer/consumer queue.
///
/// Create one with [`Queue::new`] (or the [`SpscQueue`] / [`MpmcQueue`]
/// aliases), then mint handles with [`Queue::get_producer`] and
/// [`Queue::get_consumer`]. Everything else on the core is read-only
/// diagnostics, plus the soft size limit.
///
/// ```
/// use bop_queue::{Deadline, SpscQueue};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let queue = SpscQueue::<&str>::new(16).unwrap();
/// let mut producer = queue.get_producer().unwrap();
/// let mut consumer = queue.get_consumer().unwrap();
///
/// producer.push("hello", Deadline::unbounded()).await.unwrap();
/// drop(producer);
///
/// assert_eq!(consumer.pop(Deadline::unbounded()).await, Some("hello"));
/// // Producer gone and nothing left: end of stream.
/// assert_eq!(consumer.pop(Deadline::unbounded()).await, None);
/// # }
/// ```
pub struct Queue<T, S: Storage<T> = SpscRing<T>> {
    storage: S,
    topology: Topology,
    producers: Liveness,
    consumers: Liveness,
    /// Notified after every push and when the producer side closes.
    non_empty: Event,
    /// Notified after every pop, when the consumer side closes, and when the
    /// soft size limit is raised.
    non_full: Event,
    soft_max_size: AtomicUsize,
    id: u64,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T, S: Storage<T>> Queue<T, S> {
    /// Creates a queue holding at most `capacity` values, with the engine's
    /// own topology.
    pub fn new(capacity: usize) -> QueueResult<Arc<Self>> {
        Self::with_topology(S::with_capacity(capacity)?, S::TOPOLOGY)
    }

    /// Wraps an existing engine, with the engine's own topology.
    pub fn with_storage(storage: S) -> Arc<Self> {
        Self::build(storage, S::TOPOLOGY)
    }

    /// Wraps an existing engine, restricting how many handles each side may
    /// have. Fails if the engine cannot serve `topology`.
    pub fn with_topology(storage: S, topology: Topology) -> QueueResult<Arc<Self>> {
        if !S::TOPOLOGY.supports(topology) {
            return Err(QueueError::invalid_config(format!(
                "{topology:?} topology is not supported by a {:?} storage engine",
                S::TOPOLOGY
            )));
        }
        Ok(Self::build(storage, topology))
    }

    /// Builds a queue from a validated configuration.
    pub fn from_config(config: &QueueConfig) -> QueueResult<Arc<Self>> {
        config.validate()?;
        let queue = Self::with_topology(S::with_capacity(config.capacity)?, config.topology)?;
        if let Some(limit) = config.soft_max_size {
            queue.set_soft_max_size(limit);
        }
        Ok(queue)
    }

    fn build(storage: S, topology: Topology) -> Arc<Self> {
        let queue = Arc::new(Self {
            soft_max_size: AtomicUsize::new(storage.capacity()),
            storage,
            topology,
            producers: Liveness::new(),
            consumers: Liveness::new(),
            non_empty: Event::new(),
            non_full: Event::new(),
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            _marker: PhantomData,
        });
        debug!(
            queue = queue.id,
            capacity = queue.capacity(),
            ?topology,
            "queue created"
        );
        queue
    }

    /// Mints a producer handle.
    ///
    /// Fails once the producer side is closed, since a closed side never
    /// reopens, or if the topology already has its one producer.
    pub fn get_producer(self: &Arc<Self>) -> QueueResult<Producer<T, S>> {
        let multi = self.topology.multi_producer();
        self.admit(Side::Producer, self.producers.check(multi))?;
        let token = self.storage.producer_token()?;
        self.admit(Side::Producer, self.producers.acquire(multi))?;
        trace!(queue = self.id, count = self.producers.count(), "producer minted");
        Ok(Producer::new(Arc::clone(self), token))
    }

    /// Mints a consumer handle.
    ///
    /// Fails once the consumer side is closed, or if the topology already has
    /// its one consumer.
    pub fn get_consumer(self: &Arc<Self>) -> QueueResult<Consumer<T, S>> {
        let multi = self.topology.multi_consumer();
        self.admit(Side::Consumer, self.consumers.check(multi))?;
        let token = self.storage.consumer_token()?;
        self.admit(Side::Consumer, self.consumers.acquire(multi))?;
        trace!(queue = self.id, count = self.consumers.count(), "consumer minted");
        Ok(Consumer::new(Arc::clone(self), token))
    }

    fn admit(&self, side: Side, result: Result<(), MintRefused>) -> QueueResult<()> {
        match result {
            Ok(()) => Ok(()),
            Err(MintRefused::Closed) => {
                warn!(queue = self.id, %side, "refusing handle for a closed side");
                Err(QueueError::SideClosed(side))
            }
            Err(MintRefused::Limit) => Err(QueueError::HandleLimit(side)),
        }
    }

    /// Identifier used in log records.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Handle topology of this queue.
    pub fn topology(&self) -> Topology {
        self.topology
    }

    /// Maximum number of values the storage holds.
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// Number of queued values. Approximate while handles are active.
    pub fn size_approximate(&self) -> usize {
        self.storage.len()
    }

    /// Returns `false` once the producer side is closed for good.
    pub fn is_producer_alive(&self) -> bool {
        self.producers.is_alive()
    }

    /// Returns `false` once the consumer side is closed for good.
    pub fn is_consumer_alive(&self) -> bool {
        self.consumers.is_alive()
    }

    /// Number of live producer handles.
    pub fn producer_count(&self) -> usize {
        self.producers.count()
    }

    /// Number of live consumer handles.
    pub fn consumer_count(&self) -> usize {
        self.consumers.count()
    }

    /// Admission limit for pushes, at most [`capacity`](Self::capacity).
    pub fn soft_max_size(&self) -> usize {
        self.soft_max_size.load(Ordering::Acquire)
    }

    /// Changes the admission limit. The value is clamped to
    /// `1..=capacity`. Producers parked on a full queue re-check the limit
    /// when it is raised.
    ///
    /// Values already queued above a lowered limit stay queued; pushes fail
    /// until the queue drains below it.
    pub fn set_soft_max_size(&self, limit: usize) {
        let limit = limit.clamp(1, self.capacity());
        let previous = self.soft_max_size.swap(limit, Ordering::AcqRel);
        debug!(queue = self.id, previous, limit, "soft max size changed");
        if limit > previous {
            self.non_full.notify();
        }
    }

    #[inline]
    fn is_over_soft_limit(&self) -> bool {
        let limit = self.soft_max_size();
        limit < self.storage.capacity() && self.storage.len() >= limit
    }

    pub(crate) fn try_push(&self, token: &mut S::ProducerToken, value: T) -> Result<(), T> {
        if self.is_over_soft_limit() {
            return Err(value);
        }
        self.storage.try_push(token, value)?;
        self.non_empty.notify();
        Ok(())
    }

    pub(crate) fn try_pop(&self, token: &mut S::ConsumerToken) -> Option<T> {
        let value = self.storage.try_pop(token)?;
        self.non_full.notify();
        Some(value)
    }

    pub(crate) async fn push(
        &self,
        token: &mut S::ProducerToken,
        mut value: T,
        deadline: Deadline,
    ) -> Result<(), T> {
        loop {
            let key = self.non_full.key();

            value = match self.try_push(token, value) {
                Ok(()) => return Ok(()),
                Err(value) => value,
            };

            // Nobody will ever drain a full queue once the consumers are gone.
            if !self.consumers.is_alive() {
                trace!(queue = self.id, "push abandoned, consumer side closed");
                return Err(value);
            }

            trace!(queue = self.id, ?deadline, "queue full, producer parking");
            match self.non_full.wait(key, deadline).await {
                WaitOutcome::Signalled => continue,
                WaitOutcome::TimedOut => {
                    trace!(queue = self.id, "push timed out");
                    return Err(value);
                }
                WaitOutcome::Cancelled => {
                    trace!(queue = self.id, "push cancelled");
                    return Err(value);
                }
            }
        }
    }

    pub(crate) async fn pop(&self, token: &mut S::ConsumerToken, deadline: Deadline) -> Option<T> {
        loop {
            let key = self.non_empty.key();

            if let Some(value) = self.try_pop(token) {
                return Some(value);
            }

            if !self.producers.is_alive() {
                // The last push happened before the side closed; one more
                // probe picks up a value that raced with the first one.
                let last = self.try_pop(token);
                if last.is_none() {
                    trace!(queue = self.id, "pop found end of stream");
                }
                return last;
            }

            trace!(queue = self.id, ?deadline, "queue empty, consumer parking");
            match self.non_empty.wait(key, deadline).await {
                WaitOutcome::Signalled => continue,
                WaitOutcome::TimedOut => {
                    trace!(queue = self.id, "pop timed out");
                    return None;
                }
                WaitOutcome::Cancelled => {
                    trace!(queue = self.id, "pop cancelled");
                    return None;
                }
            }
        }
    }

    pub(crate) fn mark_producer_dead(&self) {
        if self.producers.release() {
            debug!(queue = self.id, side = %Side::Producer, "side closed");
            self.notify_both();
        }
    }

    pub(crate) fn mark_consumer_dead(&self) {
        if self.consumers.release() {
            debug!(queue = self.id, side = %Side::Consumer, "side closed");
            self.notify_both();
        }
    }

    fn notify_both(&self) {
        self.non_empty.notify();
        self.non_full.notify();
    }

    #[cfg(test)]
    pub(crate) fn parked_consumers(&self) -> usize {
        self.non_empty.waiter_count()
    }

    #[cfg(test)]
    pub(crate) fn parked_producers(&self) -> usize {
        self.non_full.waiter_count()
    }
}

impl<T, S: Storage<T>> fmt::Debug for Queue<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("id", &self.id)
            .field("topology", &self.topology)
            .field("capacity", &self.capacity())
            .field("size", &self.size_approximate())
            .field("producers", &self.producers.count())
            .field("producer_alive", &self.producers.is_alive())
            .field("consumers", &self.consumers.count())
            .field("consumer_alive", &self.consumers.is_alive())
            .finish()
    }
}
