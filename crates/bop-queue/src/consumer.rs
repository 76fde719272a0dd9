use std::fmt;
use std::sync::Arc;

use futures::Stream;
use futures::stream;

use crate::deadline::Deadline;
use crate::queue::Queue;
use crate::storage::{SpscRing, Storage};

/// Receiving half of a [`Queue`].
///
/// Minted by [`Queue::get_consumer`]. Once every producer is gone, pops keep
/// returning queued values until the queue is empty and then return `None`
/// without waiting.
///
/// Dropping the consumer (or calling [`release`](Self::release)) gives up its
/// share of the consumer side. When the last consumer is gone, producers
/// blocked on a full queue give up.
pub struct Consumer<T, S: Storage<T> = SpscRing<T>> {
    queue: Arc<Queue<T, S>>,
    token: S::ConsumerToken,
}

impl<T, S: Storage<T>> Consumer<T, S> {
    pub(crate) fn new(queue: Arc<Queue<T, S>>, token: S::ConsumerToken) -> Self {
        Self { queue, token }
    }

    /// Pops the oldest value, waiting for one until `deadline`.
    ///
    /// Returns `None` if the deadline passes, the task is cancelled, or the
    /// queue is empty with every producer gone.
    pub async fn pop(&mut self, deadline: Deadline) -> Option<T> {
        self.queue.pop(&mut self.token, deadline).await
    }

    /// Pops the oldest value if one is queued right now.
    pub fn try_pop(&mut self) -> Option<T> {
        self.queue.try_pop(&mut self.token)
    }

    /// Gives up this consumer. Same as dropping it.
    pub fn release(self) {
        drop(self);
    }

    /// The queue this consumer drains.
    pub fn queue(&self) -> &Queue<T, S> {
        &self.queue
    }

    /// Turns the consumer into a stream of values that ends once the producer
    /// side is closed and the queue is drained, or the task is cancelled.
    ///
    /// ```
    /// use bop_queue::{Deadline, MpmcQueue};
    /// use futures::StreamExt;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let queue = MpmcQueue::<u32>::new(8).unwrap();
    /// let mut producer = queue.get_producer().unwrap();
    /// let consumer = queue.get_consumer().unwrap();
    ///
    /// for i in 0..3 {
    ///     producer.push(i, Deadline::unbounded()).await.unwrap();
    /// }
    /// drop(producer);
    ///
    /// let values: Vec<u32> = consumer.into_stream().collect().await;
    /// assert_eq!(values, [0, 1, 2]);
    /// # }
    /// ```
    pub fn into_stream(self) -> impl Stream<Item = T> + 'static
    where
        T: 'static,
        S: 'static,
    {
        stream::unfold(self, |mut consumer| async move {
            let value = consumer.pop(Deadline::unbounded()).await?;
            Some((value, consumer))
        })
    }
}

impl<T, S: Storage<T>> Drop for Consumer<T, S> {
    fn drop(&mut self) {
        self.queue.mark_consumer_dead();
    }
}

impl<T, S: Storage<T>> fmt::Debug for Consumer<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("queue", &self.queue.id())
            .finish_non_exhaustive()
    }
}
