// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Lane selection.
//!
//! Picks "the heaviest available lane" cheaply: an approximate
//! weight-ordered container, a sharded concurrent wrapper around it, and a
//! pool specialization for entries that are themselves exclusive locks.

mod approximate;
mod lane;
mod sharded;

pub use approximate::ApproximatePriorityQueue;
pub use lane::{LaneLock, LanePool};
pub use sharded::{ShardedQueue, MAX_SHARDS};
