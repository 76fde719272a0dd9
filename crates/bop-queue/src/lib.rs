//! Bounded, deadline-aware producer/consumer queues for cooperative async
//! tasks.
//!
//! A [`Queue`] sits between a lock-free [`Storage`] engine and the tokio
//! scheduler. Producers and consumers are separate handles minted from the
//! queue; a task that cannot make progress parks on an [`Event`] until the
//! other side acts, its [`Deadline`] passes, or the task is cancelled (see
//! [`task`]). Dropping the last handle of one side closes it: consumers drain
//! what is left and then see end of stream, blocked producers give up.
//!
//! ```
//! use std::time::Duration;
//!
//! use bop_queue::{Deadline, SpscQueue};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let queue = SpscQueue::<i32>::new(2).unwrap();
//! let mut producer = queue.get_producer().unwrap();
//! let mut consumer = queue.get_consumer().unwrap();
//!
//! producer.push(1, Deadline::unbounded()).await.unwrap();
//! producer.push(2, Deadline::unbounded()).await.unwrap();
//! // Full: a bounded push gives the value back.
//! let full = producer.push(3, Deadline::from_duration(Duration::from_millis(1))).await;
//! assert_eq!(full, Err(3));
//!
//! assert_eq!(consumer.try_pop(), Some(1));
//! producer.release();
//! assert_eq!(consumer.pop(Deadline::unbounded()).await, Some(2));
//! assert_eq!(consumer.pop(Deadline::unbounded()).await, None);
//! # }
//! ```

pub mod config;
pub mod deadline;
pub mod error;
pub mod event;
pub mod storage;
pub mod task;

mod consumer;
mod producer;
mod queue;

#[cfg(test)]
mod test_support;

pub use config::QueueConfig;
pub use consumer::Consumer;
pub use deadline::Deadline;
pub use error::{QueueError, QueueResult, Side};
pub use event::{Event, EventKey, WaitOutcome};
pub use producer::Producer;
pub use queue::{MpmcQueue, Queue, SpscQueue};
pub use storage::{MpmcArray, NoToken, SpscRing, Storage, Topology};
