use std::fmt;
use std::sync::Arc;

use crate::deadline::Deadline;
use crate::queue::Queue;
use crate::storage::{SpscRing, Storage};

/// Sending half of a [`Queue`].
///
/// Minted by [`Queue::get_producer`]. Dropping the producer (or calling
/// [`release`](Self::release)) gives up its share of the producer side; when
/// the last producer is gone, consumers drain what is left and then see end
/// of stream.
///
/// Methods take `&mut self`: a producer is owned by one task at a time.
/// Topologies with several producers mint one handle per task.
pub struct Producer<T, S: Storage<T> = SpscRing<T>> {
    queue: Arc<Queue<T, S>>,
    token: S::ProducerToken,
}

impl<T, S: Storage<T>> Producer<T, S> {
    pub(crate) fn new(queue: Arc<Queue<T, S>>, token: S::ProducerToken) -> Self {
        Self { queue, token }
    }

    /// Pushes `value`, waiting for free space until `deadline`.
    ///
    /// Returns the value back if the deadline passes, the task is cancelled,
    /// or every consumer is gone while the queue is full.
    pub async fn push(&mut self, value: T, deadline: Deadline) -> Result<(), T> {
        self.queue.push(&mut self.token, value, deadline).await
    }

    /// Pushes `value` if there is room right now.
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        self.queue.try_push(&mut self.token, value)
    }

    /// Gives up this producer. Same as dropping it.
    pub fn release(self) {
        drop(self);
    }

    /// The queue this producer feeds.
    pub fn queue(&self) -> &Queue<T, S> {
        &self.queue
    }
}

impl<T, S: Storage<T>> Drop for Producer<T, S> {
    fn drop(&mut self) {
        self.queue.mark_producer_dead();
    }
}

impl<T, S: Storage<T>> fmt::Debug for Producer<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("queue", &self.queue.id())
            .finish_non_exhaustive()
    }
}
