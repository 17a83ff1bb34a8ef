// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{addr, ByteSlicePool, LEVEL_SIZES, NEXT_LEVEL};

/// Sequential reader over one logical stream of slices.
///
/// Initialized with the stream's `[start, end)` global offsets, it follows
/// forwarding addresses across slice boundaries transparently. The level
/// sequence is recomputed on the fly because the tags of overflowed slices
/// have been overwritten by their forwarding addresses; for this to line up,
/// the stream must have started out as a first-level slice, the way
/// [`SliceWriter::begin`](super::SliceWriter::begin) starts one.
pub struct ByteSliceReader<'a> {
    pool: &'a ByteSlicePool,
    end: usize,

    /// Size class of the slice currently being read.
    level: usize,

    /// Absolute read position.
    offset: usize,

    /// Absolute end of readable content in the current slice.
    limit: usize,
}

impl<'a> ByteSliceReader<'a> {
    /// Creates a reader over the logical range `[start, end)`.
    ///
    /// # Panics
    ///
    /// Panics if `start > end`.
    #[must_use]
    pub fn new(pool: &'a ByteSlicePool, start: usize, end: usize) -> Self {
        assert!(start <= end, "reader range is inverted");

        let first_size = LEVEL_SIZES[0];

        let limit = if start + first_size >= end {
            // The stream never left its first slice.
            end
        } else {
            start + first_size - addr::FORWARD_BYTES
        };

        Self {
            pool,
            end,
            level: 0,
            offset: start,
            limit,
        }
    }

    /// Whether the whole stream has been consumed.
    #[must_use]
    pub fn eof(&self) -> bool {
        debug_assert!(self.offset <= self.end, "reader ran past its end");
        self.offset == self.end
    }

    /// Reads the next byte.
    ///
    /// # Panics
    ///
    /// Panics if the stream is exhausted.
    pub fn read_byte(&mut self) -> u8 {
        assert!(!self.eof(), "read past end of stream");

        if self.offset == self.limit {
            self.next_slice();
        }

        let byte = self.pool.byte(self.offset);
        self.offset += 1;
        byte
    }

    /// Fills `out` with the next `out.len()` bytes.
    ///
    /// # Panics
    ///
    /// Panics if fewer bytes remain than `out` holds.
    pub fn read_bytes(&mut self, out: &mut [u8]) {
        let mut pos = 0;

        while pos < out.len() {
            assert!(!self.eof(), "read past end of stream");

            if self.offset == self.limit {
                self.next_slice();
            }

            let run = (out.len() - pos).min(self.limit - self.offset);
            out[pos..pos + run].copy_from_slice(self.pool.bytes(self.offset, run));

            self.offset += run;
            pos += run;
        }
    }

    /// Copies the remainder of the stream into `out`, returning the number
    /// of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the sink rejects a write.
    pub fn write_to<W: std::io::Write>(&mut self, out: &mut W) -> crate::Result<usize> {
        let mut written = 0;

        while !self.eof() {
            if self.offset == self.limit {
                self.next_slice();
            }

            let run = self.limit - self.offset;
            out.write_all(self.pool.bytes(self.offset, run))?;

            self.offset += run;
            written += run;
        }

        Ok(written)
    }

    fn next_slice(&mut self) {
        let next = self.pool.read_forward(self.limit);

        self.level = NEXT_LEVEL[self.level];
        let size = LEVEL_SIZES[self.level];

        self.offset = next;

        self.limit = if next + size >= self.end {
            // Final slice: read the exact remaining length.
            self.end
        } else {
            // The last 4 bytes are reserved for the forwarding address.
            next + size - addr::FORWARD_BYTES
        };
    }
}
