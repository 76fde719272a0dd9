//! A bounded SPSC ring with the index caches kept in the access tokens.
//!
//! The producer only writes `head` and the consumer only writes `tail`. Each
//! side remembers the last value it saw of the other side's index in its
//! token and reloads the shared atomic only when the cached value says the
//! ring is full (producer) or empty (consumer). In steady state neither side
//! touches the other's cache line.
//!
//! The buffer length is rounded up to a power of two for branchless
//! indexing, but the ring admits exactly `capacity` values.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use super::{Storage, Topology};
use crate::error::{QueueError, QueueResult, Side};

/// Largest capacity the ring accepts.
const MAX_CAPACITY: usize = 1 << (usize::BITS - 2);

/// Source of ring identities stamped into tokens.
static NEXT_RING_ID: AtomicUsize = AtomicUsize::new(0);

struct Slot<T> {
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Single-producer, single-consumer bounded ring.
pub struct SpscRing<T> {
    /// Position of the next write. Only written by the producer.
    head: CachePadded<AtomicUsize>,
    /// Position of the next read. Only written by the consumer.
    tail: CachePadded<AtomicUsize>,
    buffer: Box<[Slot<T>]>,
    index_mask: usize,
    capacity: usize,
    /// Identity stamped into tokens so a token cannot be used on another ring.
    id: usize,
    producer_minted: AtomicBool,
    consumer_minted: AtomicBool,
}

/// Producer token of an [`SpscRing`]: the producer's cached view of `tail`.
#[derive(Debug)]
pub struct SpscProducerToken {
    ring: usize,
    tail_cache: usize,
}

/// Consumer token of an [`SpscRing`]: the consumer's cached view of `head`.
#[derive(Debug)]
pub struct SpscConsumerToken {
    ring: usize,
    head_cache: usize,
}

// Safety: values move between threads through the ring, and the token
// discipline guarantees a single writer per index.
unsafe impl<T: Send> Send for SpscRing<T> {}
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T: Send> Storage<T> for SpscRing<T> {
    const TOPOLOGY: Topology = Topology::Spsc;

    type ProducerToken = SpscProducerToken;
    type ConsumerToken = SpscConsumerToken;

    fn with_capacity(capacity: usize) -> QueueResult<Self> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        if capacity > MAX_CAPACITY {
            return Err(QueueError::CapacityTooLarge(capacity));
        }

        let buffer: Box<[Slot<T>]> = (0..capacity.next_power_of_two())
            .map(|_| Slot {
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();

        Ok(Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            index_mask: buffer.len() - 1,
            buffer,
            capacity,
            id: NEXT_RING_ID.fetch_add(1, Ordering::Relaxed),
            producer_minted: AtomicBool::new(false),
            consumer_minted: AtomicBool::new(false),
        })
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn len(&self) -> usize {
        // Tail first: head read afterwards can only be further ahead.
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        head.wrapping_sub(tail).min(self.capacity)
    }

    fn producer_token(&self) -> QueueResult<SpscProducerToken> {
        if self.producer_minted.swap(true, Ordering::AcqRel) {
            return Err(QueueError::TokenExhausted(Side::Producer));
        }
        Ok(SpscProducerToken {
            ring: self.id,
            tail_cache: self.tail.load(Ordering::Acquire),
        })
    }

    fn consumer_token(&self) -> QueueResult<SpscConsumerToken> {
        if self.consumer_minted.swap(true, Ordering::AcqRel) {
            return Err(QueueError::TokenExhausted(Side::Consumer));
        }
        Ok(SpscConsumerToken {
            ring: self.id,
            head_cache: self.head.load(Ordering::Acquire),
        })
    }

    #[inline]
    fn try_push(&self, token: &mut SpscProducerToken, value: T) -> Result<(), T> {
        assert_eq!(token.ring, self.id, "producer token belongs to another ring");

        let head = self.head.load(Ordering::Relaxed);

        if head.wrapping_sub(token.tail_cache) >= self.capacity {
            // Cache says full: reload the consumer's position.
            token.tail_cache = self.tail.load(Ordering::Acquire);
            if head.wrapping_sub(token.tail_cache) >= self.capacity {
                return Err(value);
            }
        }

        // SAFETY: only the holder of the single producer token writes slots
        // in [tail, tail + capacity), and the slot at `head` is free.
        unsafe {
            let slot = self.buffer.get_unchecked(head & self.index_mask);
            (*slot.value.get()).write(value);
        }

        // Publish the write.
        self.head.store(head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    #[inline]
    fn try_pop(&self, token: &mut SpscConsumerToken) -> Option<T> {
        assert_eq!(token.ring, self.id, "consumer token belongs to another ring");

        let tail = self.tail.load(Ordering::Relaxed);

        if tail == token.head_cache {
            // Cache says empty: reload the producer's position.
            token.head_cache = self.head.load(Ordering::Acquire);
            if tail == token.head_cache {
                return None;
            }
        }

        // SAFETY: the slot at `tail` was published by the producer's release
        // store of `head`, and only the single consumer token reads it.
        let value = unsafe {
            let slot = self.buffer.get_unchecked(tail & self.index_mask);
            (*slot.value.get()).assume_init_read()
        };

        // Hand the slot back to the producer.
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Some(value)
    }
}

impl<T> Drop for SpscRing<T> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        let mut tail = *self.tail.get_mut();

        while tail != head {
            let slot = &mut self.buffer[tail & self.index_mask];
            // SAFETY: slots in [tail, head) hold initialised values.
            unsafe { slot.value.get_mut().assume_init_drop() };
            tail = tail.wrapping_add(1);
        }
    }
}

impl<T> fmt::Debug for SpscRing<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpscRing")
            .field("capacity", &self.capacity)
            .field("head", &self.head.load(Ordering::Relaxed))
            .field("tail", &self.tail.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn ring<T: Send>(
        capacity: usize,
    ) -> (SpscRing<T>, SpscProducerToken, SpscConsumerToken) {
        let ring = SpscRing::with_capacity(capacity).unwrap();
        let producer = ring.producer_token().unwrap();
        let consumer = ring.consumer_token().unwrap();
        (ring, producer, consumer)
    }

    #[test]
    fn rejects_bad_capacity() {
        assert!(matches!(
            SpscRing::<u8>::with_capacity(0),
            Err(QueueError::ZeroCapacity)
        ));
        assert!(matches!(
            SpscRing::<u8>::with_capacity(MAX_CAPACITY + 1),
            Err(QueueError::CapacityTooLarge(_))
        ));
    }

    #[test]
    fn capacity_is_exact() {
        let (ring, mut producer, mut consumer) = ring::<u32>(3);
        assert_eq!(ring.capacity(), 3);

        for i in 0..3 {
            ring.try_push(&mut producer, i).unwrap();
        }
        assert_eq!(ring.try_push(&mut producer, 99), Err(99));
        assert_eq!(ring.len(), 3);

        assert_eq!(ring.try_pop(&mut consumer), Some(0));
        ring.try_push(&mut producer, 3).unwrap();
        assert_eq!(ring.try_push(&mut producer, 4), Err(4));
    }

    #[test]
    fn wraps_around() {
        let (ring, mut producer, mut consumer) = ring::<usize>(4);

        for i in 0..1000 {
            ring.try_push(&mut producer, i).unwrap();
            ring.try_push(&mut producer, i + 1).unwrap();
            assert_eq!(ring.try_pop(&mut consumer), Some(i));
            assert_eq!(ring.try_pop(&mut consumer), Some(i + 1));
        }
        assert!(ring.is_empty());
        assert_eq!(ring.try_pop(&mut consumer), None);
    }

    #[test]
    fn tokens_are_minted_once() {
        let ring = SpscRing::<u8>::with_capacity(2).unwrap();
        ring.producer_token().unwrap();
        ring.consumer_token().unwrap();

        assert!(matches!(
            ring.producer_token(),
            Err(QueueError::TokenExhausted(Side::Producer))
        ));
        assert!(matches!(
            ring.consumer_token(),
            Err(QueueError::TokenExhausted(Side::Consumer))
        ));
    }

    #[test]
    #[should_panic(expected = "another ring")]
    fn foreign_token_panics() {
        let (_first, mut producer, _consumer) = ring::<u8>(2);
        let (second, _, _) = ring::<u8>(2);
        let _ = second.try_push(&mut producer, 1);
    }

    #[test]
    fn drops_remaining_values() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        struct Counted;
        impl Drop for Counted {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }

        let (ring, mut producer, mut consumer) = ring::<Counted>(8);
        for _ in 0..5 {
            assert!(ring.try_push(&mut producer, Counted).is_ok());
        }
        drop(ring.try_pop(&mut consumer));
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);

        drop(ring);
        assert_eq!(DROPS.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn cross_thread_fifo() {
        const COUNT: usize = 100_000;

        let ring = Arc::new(SpscRing::<usize>::with_capacity(64).unwrap());
        let mut producer = ring.producer_token().unwrap();
        let mut consumer = ring.consumer_token().unwrap();

        let writer = {
            let ring = ring.clone();
            thread::spawn(move || {
                for i in 0..COUNT {
                    let mut value = i;
                    while let Err(v) = ring.try_push(&mut producer, value) {
                        value = v;
                        std::hint::spin_loop();
                    }
                }
            })
        };

        let mut expected = 0;
        while expected < COUNT {
            if let Some(v) = ring.try_pop(&mut consumer) {
                assert_eq!(v, expected);
                expected += 1;
            } else {
                std::hint::spin_loop();
            }
        }

        writer.join().unwrap();
        assert!(ring.is_empty());
    }
}
