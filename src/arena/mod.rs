// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Page-based arena for growing byte slices.
//!
//! Postings writers append variable-length streams into fixed-size pages.
//! A stream starts out as a tiny slice; when it outgrows its slice, a
//! successor of the next size class is allocated and linked in place via a
//! forwarding address written over the old slice's tail. Pages are owned
//! exclusively by the pool and are reclaimed only by [`ByteSlicePool::reset`]
//! or by dropping the pool.

pub(crate) mod addr;
mod reader;

pub use reader::ByteSliceReader;

/// Default page size in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 32 * 1_024;

/// Byte sizes of the slice levels.
pub(crate) const LEVEL_SIZES: [usize; 10] = [5, 14, 20, 30, 40, 40, 80, 80, 120, 200];

/// Level transition table; the last level maps onto itself.
pub(crate) const NEXT_LEVEL: [usize; 10] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 9];

/// Size of the first slice of every stream.
pub const FIRST_SLICE_SIZE: usize = LEVEL_SIZES[0];

// Tag marker in the high nibble keeps the terminator byte non-zero even for
// level 0.
const LEVEL_TAG: u8 = 16;

/// Arena of fixed-size pages that byte slices are carved out of.
pub struct ByteSlicePool {
    pages: Vec<Box<[u8]>>,
    page_size: usize,

    /// Global offset of the current page's first byte.
    page_offset: usize,

    /// Next unused offset within the current page.
    page_upto: usize,
}

impl Default for ByteSlicePool {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteSlicePool {
    /// Creates a pool with the default page size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Creates a pool with a custom page size.
    ///
    /// # Panics
    ///
    /// Panics if the page size is not a power of two, or too small to hold
    /// the largest slice level.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        assert!(page_size.is_power_of_two(), "page size must be a power of two");
        assert!(
            page_size >= LEVEL_SIZES[LEVEL_SIZES.len() - 1],
            "page size cannot hold the largest slice level",
        );

        Self {
            pages: Vec::new(),
            page_size,
            page_offset: 0,
            page_upto: 0,
        }
    }

    /// The configured page size in bytes.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages currently allocated.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Global offset of the next allocation.
    #[must_use]
    pub fn position(&self) -> usize {
        self.page_offset + self.page_upto
    }

    /// Discards all slices, zero-fills and keeps the first page.
    pub fn reset(&mut self) {
        self.pages.truncate(1);

        if let Some(page) = self.pages.first_mut() {
            page.fill(0);
        }

        self.page_offset = 0;
        self.page_upto = 0;
    }

    fn new_page(&mut self) {
        if !self.pages.is_empty() {
            self.page_offset += self.page_size;
        }

        log::trace!("arena: allocating page #{}", self.pages.len());

        self.pages.push(vec![0; self.page_size].into_boxed_slice());
        self.page_upto = 0;
    }

    /// Allocates a fresh level-0 slice of exactly `size` bytes and returns
    /// its global offset. The slice's last byte is reserved for the level
    /// tag.
    ///
    /// # Panics
    ///
    /// Panics if `size` cannot hold a forwarding address, or exceeds the
    /// page size.
    pub fn new_slice(&mut self, size: usize) -> usize {
        assert!(size >= FIRST_SLICE_SIZE, "slice cannot hold a forwarding address");
        assert!(size <= self.page_size, "slice size exceeds page size");

        if self.pages.is_empty() || self.page_upto + size > self.page_size {
            self.new_page();
        }

        let upto = self.page_upto;
        self.page_upto += size;

        let page = self.pages.last_mut().expect("pool holds a page");
        page[upto + size - 1] = LEVEL_TAG;

        self.page_offset + upto
    }

    /// Grows the slice whose level tag sits at global offset `upto`,
    /// returning the next write position inside the successor slice.
    pub fn alloc_slice(&mut self, upto: usize) -> usize {
        self.alloc_known_size_slice(upto).0
    }

    /// Like [`Self::alloc_slice`], but also returns how many bytes may be
    /// written before the successor slice overflows in turn.
    pub fn alloc_known_size_slice(&mut self, upto: usize) -> (usize, usize) {
        let tag = self.byte(upto);
        debug_assert_eq!(tag & 0xf0, LEVEL_TAG, "offset does not point at a level tag");

        let level = usize::from(tag & 15);
        let new_level = NEXT_LEVEL[level];
        let size = LEVEL_SIZES[new_level];

        if self.page_upto + size > self.page_size {
            self.new_page();
        }

        let offset = self.page_offset + self.page_upto;
        self.page_upto += size;

        // The forwarding address is about to overwrite the last 3 content
        // bytes of the old slice; they move to the head of the new one.
        for i in 0..3 {
            let b = self.byte(upto - 3 + i);
            self.set_byte(offset + i, b);
        }

        let addr = u32::try_from(offset).expect("arena offset fits in 32 bits");
        let page_size = self.page_size;
        let (page_idx, tag_pos) = ((upto - 3) / page_size, (upto - 3) % page_size);
        addr::encode(&mut self.pages[page_idx], tag_pos, addr);

        self.set_byte(offset + size - 1, LEVEL_TAG | new_level as u8);

        (offset + 3, size - 3)
    }

    pub(crate) fn byte(&self, global: usize) -> u8 {
        self.pages[global / self.page_size][global % self.page_size]
    }

    pub(crate) fn set_byte(&mut self, global: usize, value: u8) {
        let page_size = self.page_size;
        self.pages[global / page_size][global % page_size] = value;
    }

    /// A contiguous run of `len` bytes starting at `global`; never crosses a
    /// page boundary because slices do not either.
    pub(crate) fn bytes(&self, global: usize, len: usize) -> &[u8] {
        let pos = global % self.page_size;
        debug_assert!(pos + len <= self.page_size, "run crosses a page boundary");
        &self.pages[global / self.page_size][pos..pos + len]
    }

    pub(crate) fn read_forward(&self, global: usize) -> usize {
        let (page_idx, pos) = (global / self.page_size, global % self.page_size);
        addr::decode(&self.pages[page_idx], pos) as usize
    }
}

/// Incremental writer for one logical stream of slices.
///
/// Writes proceed byte-wise; hitting a level tag grows the stream into a
/// successor slice transparently. Only one writer may append to a given
/// stream at a time; distinct streams of the same pool are interleaved by
/// re-creating the writer via [`SliceWriter::resume`].
pub struct SliceWriter<'a> {
    pool: &'a mut ByteSlicePool,
    start: usize,
    offset: usize,
}

impl<'a> SliceWriter<'a> {
    /// Starts a fresh stream with a first-level slice.
    pub fn begin(pool: &'a mut ByteSlicePool) -> Self {
        let start = pool.new_slice(FIRST_SLICE_SIZE);

        Self {
            pool,
            start,
            offset: start,
        }
    }

    /// Continues appending to a stream previously written up to `offset`.
    pub fn resume(pool: &'a mut ByteSlicePool, start: usize, offset: usize) -> Self {
        Self {
            pool,
            start,
            offset,
        }
    }

    /// Appends a single byte.
    pub fn write_byte(&mut self, byte: u8) {
        if self.pool.byte(self.offset) != 0 {
            self.offset = self.pool.alloc_slice(self.offset);
        }

        self.pool.set_byte(self.offset, byte);
        self.offset += 1;
    }

    /// Appends a run of bytes.
    pub fn write_bytes(&mut self, data: &[u8]) {
        for &byte in data {
            self.write_byte(byte);
        }
    }

    /// Global offset of the stream's first byte.
    #[must_use]
    pub fn start(&self) -> usize {
        self.start
    }

    /// Global offset one past the last written byte.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_accepts_page_sized_slice() {
        let mut pool = ByteSlicePool::with_page_size(256);
        assert_eq!(pool.new_slice(256), 0);
    }

    #[test]
    #[should_panic(expected = "slice size exceeds page size")]
    fn pool_rejects_oversized_slice() {
        let mut pool = ByteSlicePool::with_page_size(256);
        pool.new_slice(257);
    }

    #[test]
    fn new_slice_rolls_pages() {
        let mut pool = ByteSlicePool::with_page_size(256);
        pool.new_slice(200);
        pool.new_slice(200);
        assert_eq!(pool.page_count(), 2);
    }

    #[test]
    fn levels_are_monotonic_and_capped() {
        let mut level = 0;

        for _ in 0..32 {
            let next = NEXT_LEVEL[level];
            assert!(next >= level);
            assert!(LEVEL_SIZES[next] >= LEVEL_SIZES[level]);
            level = next;
        }

        assert_eq!(level, NEXT_LEVEL.len() - 1);
    }

    #[test]
    fn reset_reclaims_pages() {
        let mut pool = ByteSlicePool::with_page_size(256);

        let mut writer = SliceWriter::begin(&mut pool);
        writer.write_bytes(&[1; 1_000]);

        assert!(pool.page_count() > 1);

        pool.reset();
        assert_eq!(pool.page_count(), 1);
        assert_eq!(pool.position(), 0);
        assert_eq!(pool.byte(0), 0);
    }
}
