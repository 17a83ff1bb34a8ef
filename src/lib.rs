// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Skriva is the write-path concurrency and memory substrate of a
//! full-text indexing engine. It features:
//!
//! - A page-based slice arena that packs growing postings streams into
//!   shared fixed-size pages
//! - An approximate, sharded, lockable priority queue family for picking
//!   "the heaviest available lane" with low contention
//! - A flush ticket queue that publishes out-of-order flush completions
//!   strictly in arrival order
//! - An admission stall gate for backpressure when flushing falls behind
//! - An adaptive rate limiter pacing background merge I/O
//!
//! It is not:
//!
//! - an indexing engine: tokenization, postings codecs, merge policy and
//!   commit bookkeeping live with the caller
//! - a general-purpose allocator: arena memory is reclaimed only by
//!   resetting the whole arena
//!
//! ```
//! use skriva::{ByteSlicePool, ByteSliceReader, SliceWriter};
//!
//! let mut pool = ByteSlicePool::new();
//!
//! // Append a postings stream; it grows across linked slices
//! let mut writer = SliceWriter::begin(&mut pool);
//! writer.write_bytes(b"quick brown fox");
//! let (start, end) = (writer.start(), writer.offset());
//!
//! // And read it back sequentially
//! let mut reader = ByteSliceReader::new(&pool, start, end);
//! let mut buf = [0; 15];
//! reader.read_bytes(&mut buf);
//!
//! assert_eq!(&buf, b"quick brown fox");
//! assert!(reader.eof());
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]

mod arena;
mod error;
mod flush;
mod rate_limiter;
mod select;
mod stall;

pub use {
    arena::{ByteSlicePool, ByteSliceReader, SliceWriter, DEFAULT_PAGE_SIZE, FIRST_SLICE_SIZE},
    error::{Error, Result},
    flush::{FlushQueue, FlushTicket},
    rate_limiter::MergeRateLimiter,
    select::{ApproximatePriorityQueue, LaneLock, LanePool, ShardedQueue, MAX_SHARDS},
    stall::StallGate,
};
