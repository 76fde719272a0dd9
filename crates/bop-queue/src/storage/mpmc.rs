use crossbeam_queue::ArrayQueue;

use super::{NoToken, Storage, Topology};
use crate::error::{QueueError, QueueResult};

/// Multi-producer, multi-consumer engine over `crossbeam_queue::ArrayQueue`.
///
/// Any number of tokens can be minted; they carry no state.
#[derive(Debug)]
pub struct MpmcArray<T> {
    queue: ArrayQueue<T>,
}

impl<T: Send> Storage<T> for MpmcArray<T> {
    const TOPOLOGY: Topology = Topology::Mpmc;

    type ProducerToken = NoToken;
    type ConsumerToken = NoToken;

    fn with_capacity(capacity: usize) -> QueueResult<Self> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        // ArrayQueue keeps a lap counter above the index bits.
        if capacity > isize::MAX as usize / 2 {
            return Err(QueueError::CapacityTooLarge(capacity));
        }
        Ok(Self {
            queue: ArrayQueue::new(capacity),
        })
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    #[inline]
    fn len(&self) -> usize {
        self.queue.len()
    }

    fn producer_token(&self) -> QueueResult<NoToken> {
        Ok(NoToken)
    }

    fn consumer_token(&self) -> QueueResult<NoToken> {
        Ok(NoToken)
    }

    #[inline]
    fn try_push(&self, _token: &mut NoToken, value: T) -> Result<(), T> {
        self.queue.push(value)
    }

    #[inline]
    fn try_pop(&self, _token: &mut NoToken) -> Option<T> {
        self.queue.pop()
    }
}
