// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::ShardedQueue;
use std::sync::{
    atomic::{
        AtomicU64,
        Ordering::{Acquire, Release},
    },
    Arc,
};

/// Exclusive-lock capability of a schedulable lane.
///
/// A lane is one logical concurrent indexing unit. While a caller holds the
/// lane it may mutate the lane's buffered state; nobody else may.
pub trait LaneLock {
    /// Tries to acquire the lane without blocking.
    fn try_lock(&self) -> bool;

    /// Releases a previously acquired lane.
    fn unlock(&self);
}

/// Pool of exclusive lanes, polled by weight.
///
/// Combines "pick the heaviest available lane" with "acquire it
/// exclusively": [`LanePool::lock_and_poll`] only ever returns lanes whose
/// own lock was just taken by the calling thread.
pub struct LanePool<L: LaneLock> {
    queue: ShardedQueue<Arc<L>>,

    /// Bumped after every add-or-unlock. A failed poll re-reads it to
    /// distinguish "truly nothing available" from "raced with a concurrent
    /// add"; the bump happens-after the unlock it reports.
    adds_or_unlocks: AtomicU64,
}

impl<L: LaneLock> LanePool<L> {
    /// Creates a pool with the given shard concurrency.
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        Self {
            queue: ShardedQueue::new(concurrency),
            adds_or_unlocks: AtomicU64::new(0),
        }
    }

    /// Creates a pool sized to the machine's parallelism.
    #[must_use]
    pub fn with_default_concurrency() -> Self {
        Self {
            queue: ShardedQueue::with_default_concurrency(),
            adds_or_unlocks: AtomicU64::new(0),
        }
    }

    /// Polls for the heaviest lane whose lock can be taken right now,
    /// acquiring it in the same step.
    ///
    /// Returns `None` only if no lane was available *and* no lane was
    /// concurrently added or unlocked during the failed poll; otherwise the
    /// poll is retried. Retries never sleep.
    pub fn lock_and_poll(&self) -> Option<Arc<L>> {
        loop {
            let stamp = self.adds_or_unlocks.load(Acquire);

            if let Some(lane) = self.queue.poll(|lane| lane.try_lock()) {
                return Some(lane);
            }

            // A lane may have become available between the failed poll and
            // now; only give up if the event counter is unchanged.
            if self.adds_or_unlocks.load(Acquire) == stamp {
                return None;
            }
        }
    }

    /// Inserts a lane under the given weight and releases its lock, in that
    /// order, then publishes the event.
    ///
    /// The lane must be locked by the caller. Inserting before unlocking
    /// means no poller can take the lane before it is actually free.
    pub fn add_and_unlock(&self, lane: Arc<L>, weight: u64) {
        self.queue.add(lane.clone(), weight);
        lane.unlock();
        self.adds_or_unlocks.fetch_add(1, Release);
    }

    /// Removes a specific lane from the pool. Assertion/teardown use only.
    pub fn remove(&self, lane: &Arc<L>) -> bool
    where
        L: PartialEq,
    {
        self.queue.remove(lane)
    }

    /// Whether the pool holds the lane. Assertion-only.
    pub fn contains(&self, lane: &Arc<L>) -> bool
    where
        L: PartialEq,
    {
        self.queue.contains(lane)
    }

    /// Whether the pool holds no lanes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
