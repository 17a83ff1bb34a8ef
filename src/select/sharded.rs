// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::ApproximatePriorityQueue;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard, TryLockError};

/// Upper bound on the shard count.
pub const MAX_SHARDS: usize = 256;

type Shard<T> = Mutex<ApproximatePriorityQueue<T>>;

/// Concurrent approximate priority queue, sharded to reduce contention.
///
/// The sharded structure consists of N shards that can be independently
/// locked. Callers bias their shard order by a hash of their own thread
/// identity, which spreads contention and yields soft thread-affinity.
///
/// Approximate global ordering only: each shard orders its own entries, and
/// polling visits shards in the caller's seeded order.
pub struct ShardedQueue<T> {
    shards: Box<[Shard<T>]>,
}

fn thread_seed() -> usize {
    let mut hasher = xxhash_rust::xxh3::Xxh3::new();
    std::thread::current().id().hash(&mut hasher);
    hasher.finish() as usize
}

impl<T> ShardedQueue<T> {
    /// Creates a queue with the given shard count, clamped to `[1, 256]`.
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.clamp(1, MAX_SHARDS);

        log::debug!("creating sharded queue with {concurrency} shards");

        let shards = (0..concurrency)
            .map(|_| Mutex::new(ApproximatePriorityQueue::new()))
            .collect();

        Self { shards }
    }

    /// Creates a queue sized to the machine's parallelism.
    #[must_use]
    pub fn with_default_concurrency() -> Self {
        let concurrency = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self::new(concurrency)
    }

    /// Number of shards.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.shards.len()
    }

    fn try_shard(&self, idx: usize) -> Option<MutexGuard<'_, ApproximatePriorityQueue<T>>> {
        match self.shards[idx].try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::WouldBlock) => None,
            Err(TryLockError::Poisoned(_)) => panic!("lock is poisoned"),
        }
    }

    /// Inserts an entry under the given weight. Never fails: if every shard
    /// is momentarily locked, blocks on the caller's home shard.
    pub fn add(&self, entry: T, weight: u64) {
        let count = self.shards.len();
        let seed = thread_seed();

        for i in 0..count {
            if let Some(mut shard) = self.try_shard((seed + i) % count) {
                shard.add(entry, weight);
                return;
            }
        }

        // Every shard was contended; fall back to waiting for the home shard.
        let mut shard = self.shards[seed % count].lock().expect("lock is poisoned");
        shard.add(entry, weight);
    }

    /// Removes and returns an entry satisfying `predicate`, favoring high
    /// weights within each shard.
    ///
    /// A non-blocking pass visits every shard in seeded order first; if it
    /// yields nothing, a second pass locks each shard in turn, so "nothing
    /// available" is only reported after every shard was checked under its
    /// lock.
    pub fn poll(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        let count = self.shards.len();
        let seed = thread_seed();

        for i in 0..count {
            if let Some(mut shard) = self.try_shard((seed + i) % count) {
                if let Some(entry) = shard.poll(&mut predicate) {
                    return Some(entry);
                }
            }
        }

        for i in 0..count {
            let mut shard = self.shards[(seed + i) % count].lock().expect("lock is poisoned");

            if let Some(entry) = shard.poll(&mut predicate) {
                return Some(entry);
            }
        }

        None
    }

    /// Removes a specific entry, visiting every shard. Assertion/teardown
    /// use only.
    pub fn remove(&self, entry: &T) -> bool
    where
        T: PartialEq,
    {
        self.shards
            .iter()
            .any(|shard| shard.lock().expect("lock is poisoned").remove(entry))
    }

    /// Whether any shard holds the entry. Assertion-only.
    pub fn contains(&self, entry: &T) -> bool
    where
        T: PartialEq,
    {
        self.shards
            .iter()
            .any(|shard| shard.lock().expect("lock is poisoned").contains(entry))
    }

    /// Whether every shard is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards
            .iter()
            .all(|shard| shard.lock().expect("lock is poisoned").is_empty())
    }

    /// Total number of entries across all shards.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().expect("lock is poisoned").len())
            .sum()
    }
}
