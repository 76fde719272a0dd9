//! Seeded randomised checks of the non-blocking surface against a model.

mod common;

use std::collections::VecDeque;

use bop_queue::{Consumer, MpmcArray, Producer, Queue, SpscRing, Storage};
use rand::{Rng, SeedableRng, rngs::SmallRng};

const SEEDS: u64 = 32;
const STEPS: usize = 2_048;

/// Random try_push/try_pop/soft-limit sequences must match a bounded
/// `VecDeque` model step for step.
fn check_against_model<S: Storage<u64>>(seed: u64) {
    let mut rng = SmallRng::seed_from_u64(0xB0B_0000_u64 ^ seed);
    let capacity = rng.random_range(1..=16);

    let queue = Queue::<u64, S>::new(capacity).unwrap();
    let mut producer: Producer<u64, S> = queue.get_producer().unwrap();
    let mut consumer: Consumer<u64, S> = queue.get_consumer().unwrap();

    let mut model = VecDeque::new();
    let mut limit = capacity;
    let mut next = 0u64;

    for step in 0..STEPS {
        let op = rng.random_range(0..10);
        match op {
            0..=4 => {
                let accepted = producer.try_push(next).is_ok();
                let expected = model.len() < limit;
                assert_eq!(
                    accepted, expected,
                    "push mismatch: seed {seed} step {step} len {} limit {limit}",
                    model.len()
                );
                if accepted {
                    model.push_back(next);
                }
                next += 1;
            }
            5..=8 => {
                assert_eq!(
                    consumer.try_pop(),
                    model.pop_front(),
                    "pop mismatch: seed {seed} step {step}"
                );
            }
            _ => {
                limit = rng.random_range(1..=capacity);
                queue.set_soft_max_size(limit);
            }
        }

        assert_eq!(
            queue.size_approximate(),
            model.len(),
            "size mismatch: seed {seed} step {step} op {op}"
        );
    }

    producer.release();
    while let Some(expected) = model.pop_front() {
        assert_eq!(consumer.try_pop(), Some(expected), "drain mismatch: seed {seed}");
    }
    assert_eq!(consumer.try_pop(), None);
}

#[test]
fn property_spsc_ring_matches_model() {
    common::setup_log();
    for seed in 0..SEEDS {
        check_against_model::<SpscRing<u64>>(seed);
    }
}

#[test]
fn property_mpmc_array_matches_model() {
    for seed in 0..SEEDS {
        check_against_model::<MpmcArray<u64>>(seed);
    }
}

/// Random capacities and burst sizes across real tasks: the consumer sees the
/// producer's sequence in order and ends exactly at its length.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn property_async_bursts_preserve_order() {
    use bop_queue::{Deadline, SpscQueue};

    for seed in 0..8 {
        let mut rng = SmallRng::seed_from_u64(0x5EED_u64 ^ seed);
        let capacity = rng.random_range(1..=8);
        let total: usize = rng.random_range(0..2_000);
        let bursts: Vec<usize> = (0..total).map(|_| rng.random_range(1..=4)).collect();

        let queue = SpscQueue::<usize>::new(capacity).unwrap();
        let mut producer = queue.get_producer().unwrap();
        let mut consumer = queue.get_consumer().unwrap();

        let writer = tokio::spawn(async move {
            for (i, burst) in bursts.into_iter().enumerate() {
                producer.push(i, Deadline::unbounded()).await.unwrap();
                if i % burst == 0 {
                    tokio::task::yield_now().await;
                }
            }
        });

        let mut expected = 0;
        while let Some(value) = consumer.pop(Deadline::unbounded()).await {
            assert_eq!(value, expected, "order broken: seed {seed}");
            expected += 1;
        }
        writer.await.unwrap();
        assert_eq!(expected, total, "lost values: seed {seed}");
    }
}
