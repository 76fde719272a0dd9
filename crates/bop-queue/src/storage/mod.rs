//! Lock-free storage engines behind the queue core.
//!
//! A [`Storage`] is a bounded FIFO that never blocks: `try_push` fails on a
//! full engine and `try_pop` fails on an empty one. Callers access it through
//! per-side *access tokens*. A token is minted once per handle and never
//! shared, which lets an engine keep per-side state in it (cached indices, a
//! claimed slot range, ...) instead of in contended shared memory.
//!
//! # Engines
//!
//! - [`SpscRing`]: single producer, single consumer. Tokens are stateful and
//!   the ring mints exactly one of each, so the unsynchronised fast path is
//!   sound without any runtime checks on push or pop.
//! - [`MpmcArray`]: any number of producers and consumers, backed by
//!   `crossbeam_queue::ArrayQueue`. Tokens are the stateless [`NoToken`].

mod mpmc;
mod spsc;

pub use mpmc::MpmcArray;
pub use spsc::{SpscConsumerToken, SpscProducerToken, SpscRing};

use serde::{Deserialize, Serialize};

use crate::error::QueueResult;

/// How many live handles each side of a queue may have.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// One producer and one consumer.
    #[default]
    Spsc,
    /// One producer, any number of consumers.
    Spmc,
    /// Any number of producers, one consumer.
    Mpsc,
    /// Any number of producers and consumers.
    Mpmc,
}

impl Topology {
    /// Returns `true` if more than one producer may be live at once.
    pub const fn multi_producer(self) -> bool {
        matches!(self, Topology::Mpsc | Topology::Mpmc)
    }

    /// Returns `true` if more than one consumer may be live at once.
    pub const fn multi_consumer(self) -> bool {
        matches!(self, Topology::Spmc | Topology::Mpmc)
    }

    /// Returns `true` if an engine with this topology can serve a queue
    /// restricted to `narrower`.
    pub const fn supports(self, narrower: Topology) -> bool {
        (self.multi_producer() || !narrower.multi_producer())
            && (self.multi_consumer() || !narrower.multi_consumer())
    }
}

/// Stateless access token for engines that need no per-side state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoToken;

/// A bounded, non-blocking FIFO safe under concurrent access.
///
/// # Contract
///
/// - Capacity is fixed at construction.
/// - `try_push` and `try_pop` never block and are safe to call concurrently
///   from any number of threads, each with its own token.
/// - Values pushed through one producer token are popped in push order.
/// - `try_pop` never returns a value that was not pushed, and every pushed
///   value is returned at most once.
pub trait Storage<T>: Send + Sync {
    /// Handle topology the engine supports.
    const TOPOLOGY: Topology;

    /// Per-producer access token.
    type ProducerToken: Send;
    /// Per-consumer access token.
    type ConsumerToken: Send;

    /// Creates an engine holding at most `capacity` values.
    fn with_capacity(capacity: usize) -> QueueResult<Self>
    where
        Self: Sized;

    /// Maximum number of values the engine holds.
    fn capacity(&self) -> usize;

    /// Number of values currently stored. Approximate under concurrency.
    fn len(&self) -> usize;

    /// Returns `true` if no values are stored. Approximate under concurrency.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mints a producer token. Single-producer engines refuse a second one.
    fn producer_token(&self) -> QueueResult<Self::ProducerToken>;

    /// Mints a consumer token. Single-consumer engines refuse a second one.
    fn consumer_token(&self) -> QueueResult<Self::ConsumerToken>;

    /// Attempts to push `value`, handing it back if the engine is full.
    fn try_push(&self, token: &mut Self::ProducerToken, value: T) -> Result<(), T>;

    /// Attempts to pop the oldest value.
    fn try_pop(&self, token: &mut Self::ConsumerToken) -> Option<T>;
}
