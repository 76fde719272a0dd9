//! Wakeable event used to park tasks until a queue can make progress.
//!
//! The event is an eventcount: every [`Event::notify`] bumps an epoch and
//! wakes the parked waiters. A waiter takes an [`EventKey`] (the current
//! epoch) *before* probing the state it is interested in, and hands the key to
//! [`Event::wait`]. If a notification landed in between, `wait` returns
//! immediately, so a signal raised after the probe but before the task parks
//! is never lost.
//!
//! ```text
//! waiter                              notifier
//! ──────────────────────              ──────────────────────
//! key = event.key()
//! probe state -> not ready            change state
//!                                     event.notify()  (epoch += 1)
//! event.wait(key, deadline)
//!   epoch != key -> Signalled
//! ```
//!
//! `wait` multiplexes three wake causes into one [`WaitOutcome`]: a
//! notification, the deadline, and cancellation of the current task (see
//! [`crate::task`]).
//!
//! ## Memory Ordering
//!
//! The epoch bump and the emptiness check in `notify` are both `SeqCst`, as
//! are the emptiness store and the epoch re-check in the waiter. In the total
//! order either the waiter's re-check observes the new epoch, or the notifier
//! observes a non-empty wait list and wakes the waiter (or both).

use std::fmt;
use std::future::{self, Future};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll, Waker};

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::deadline::Deadline;
use crate::task;

/// Why [`Event::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitOutcome {
    /// The event was notified after the key was taken. The awaited state may
    /// already have been consumed by someone else; re-check it.
    Signalled,
    /// The deadline passed first.
    TimedOut,
    /// The current task was cancelled.
    Cancelled,
}

/// Snapshot of an event's epoch taken before probing the guarded state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventKey(u64);

/// An event tasks can park on until it is notified.
pub struct Event {
    epoch: CachePadded<AtomicU64>,
    wait_set: WaitSet,
}

impl Event {
    /// Creates a new event.
    pub const fn new() -> Self {
        Self {
            epoch: CachePadded::new(AtomicU64::new(0)),
            wait_set: WaitSet::new(),
        }
    }

    /// Takes a key to wait on. Must be taken before probing the guarded state.
    #[inline]
    pub fn key(&self) -> EventKey {
        EventKey(self.epoch.load(Ordering::SeqCst))
    }

    /// Returns `true` if the event was notified since `key` was taken.
    #[inline]
    pub fn is_signalled_since(&self, key: EventKey) -> bool {
        self.epoch.load(Ordering::SeqCst) != key.0
    }

    /// Notifies the event, waking every parked waiter.
    ///
    /// Cheap when nobody waits: one atomic increment and one load.
    #[inline]
    pub fn notify(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);

        if self.wait_set.is_empty.load(Ordering::SeqCst) {
            return;
        }

        self.wait_set.wake_all();
    }

    /// Number of tasks currently parked on the event.
    pub fn waiter_count(&self) -> usize {
        self.wait_set.waiters.lock().entries.len()
    }

    /// Parks the current task until the event is notified after `key` was
    /// taken, `deadline` is reached, or the task is cancelled.
    ///
    /// When several causes are ready at once, cancellation wins over a
    /// notification, and a notification wins over the deadline.
    pub async fn wait(&self, key: EventKey, deadline: Deadline) -> WaitOutcome {
        let token = task::current::cancellation_token();

        if token.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return WaitOutcome::Cancelled;
        }
        if self.is_signalled_since(key) {
            return WaitOutcome::Signalled;
        }
        if deadline.is_reached() {
            return WaitOutcome::TimedOut;
        }

        let cancelled = async {
            match &token {
                Some(token) => token.cancelled().await,
                None => future::pending().await,
            }
        };
        let expired = async {
            match deadline.instant() {
                Some(at) => tokio::time::sleep_until(at).await,
                None => future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = cancelled => WaitOutcome::Cancelled,
            () = self.notified(key) => WaitOutcome::Signalled,
            () = expired => WaitOutcome::TimedOut,
        }
    }

    /// A future resolving once the event is notified after `key` was taken.
    pub fn notified(&self, key: EventKey) -> Notified<'_> {
        Notified {
            event: self,
            key,
            slot: None,
        }
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("epoch", &self.epoch.load(Ordering::Relaxed))
            .field("wait_set", &self.wait_set)
            .finish()
    }
}

/// Future returned by [`Event::notified`].
///
/// Dropping it before completion removes its waker from the wait list.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Notified<'a> {
    event: &'a Event,
    key: EventKey,
    /// Id of our entry in the wait list, once registered.
    slot: Option<u64>,
}

impl Future for Notified<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = &mut *self;

        if this.event.is_signalled_since(this.key) {
            this.unregister();
            return Poll::Ready(());
        }

        match this.slot {
            Some(id) => this.event.wait_set.update(id, cx.waker()),
            None => this.slot = Some(this.event.wait_set.insert(cx.waker())),
        }

        // Double-check: a notify racing with the registration above either
        // bumped the epoch before this load or saw the wait list non-empty.
        if this.event.is_signalled_since(this.key) {
            this.unregister();
            return Poll::Ready(());
        }

        Poll::Pending
    }
}

impl Notified<'_> {
    fn unregister(&mut self) {
        if let Some(id) = self.slot.take() {
            self.event.wait_set.remove(id);
        }
    }
}

impl Drop for Notified<'_> {
    fn drop(&mut self) {
        self.unregister();
    }
}

impl fmt::Debug for Notified<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notified")
            .field("key", &self.key)
            .field("registered", &self.slot.is_some())
            .finish()
    }
}

struct Waiters {
    next_id: u64,
    entries: Vec<(u64, Waker)>,
}

/// Parked wakers, with a lock-free emptiness flag so that `notify` skips the
/// lock in the common case where nobody waits.
struct WaitSet {
    waiters: Mutex<Waiters>,
    is_empty: AtomicBool,
}

impl WaitSet {
    const fn new() -> Self {
        Self {
            waiters: Mutex::new(Waiters {
                next_id: 0,
                entries: Vec::new(),
            }),
            is_empty: AtomicBool::new(true),
        }
    }

    fn insert(&self, waker: &Waker) -> u64 {
        let mut waiters = self.waiters.lock();
        let id = waiters.next_id;
        waiters.next_id += 1;
        waiters.entries.push((id, waker.clone()));
        self.is_empty.store(false, Ordering::SeqCst);
        id
    }

    /// Refreshes the waker of entry `id`, re-inserting it if a notification
    /// already took it off the list.
    fn update(&self, id: u64, waker: &Waker) {
        let mut waiters = self.waiters.lock();
        match waiters.entries.iter_mut().find(|(entry, _)| *entry == id) {
            Some((_, current)) => {
                if !current.will_wake(waker) {
                    *current = waker.clone();
                }
            }
            None => {
                waiters.entries.push((id, waker.clone()));
                self.is_empty.store(false, Ordering::SeqCst);
            }
        }
    }

    fn remove(&self, id: u64) {
        let mut waiters = self.waiters.lock();
        if let Some(index) = waiters.entries.iter().position(|(entry, _)| *entry == id) {
            waiters.entries.swap_remove(index);
            if waiters.entries.is_empty() {
                self.is_empty.store(true, Ordering::SeqCst);
            }
        }
    }

    fn wake_all(&self) {
        let entries = {
            let mut waiters = self.waiters.lock();
            self.is_empty.store(true, Ordering::SeqCst);
            std::mem::take(&mut waiters.entries)
        };

        // Wake outside the lock.
        for (_, waker) in entries {
            waker.wake();
        }
    }
}

impl fmt::Debug for WaitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitSet")
            .field("is_empty", &self.is_empty.load(Ordering::Relaxed))
            .finish()
    }
}
