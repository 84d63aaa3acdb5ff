//! Page table: maps resident pages to their frames.
//!
//! A bucketed-chaining hash from `(file, page number)` to frame index.
//! Lookup is hit-or-miss; a miss is a normal cache miss, never an error.

use crate::storage::FileId;
use crate::types::PageNo;

/// Key identifying a resident page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferKey {
    pub file: FileId,
    pub page_no: PageNo,
}

impl BufferKey {
    pub fn new(file: FileId, page_no: PageNo) -> Self {
        Self { file, page_no }
    }
}

/// Hash from `BufferKey` to frame index with bucketed chaining.
///
/// Sized at roughly 1.2 buckets per frame, rounded up to odd to spread
/// clustered page numbers across buckets.
pub struct PageTable {
    buckets: Vec<Vec<(BufferKey, usize)>>,
}

impl PageTable {
    /// Create a page table sized for a pool of `frames` frames
    pub fn new(frames: usize) -> Self {
        let mut size = frames + frames / 5 + 1;
        if size % 2 == 0 {
            size += 1;
        }
        Self {
            buckets: vec![Vec::new(); size],
        }
    }

    fn bucket(&self, key: BufferKey) -> usize {
        let mixed = key
            .file
            .hash_seed()
            .wrapping_mul(31)
            .wrapping_add(key.page_no.value() as u64);
        (mixed % self.buckets.len() as u64) as usize
    }

    /// Find the frame holding `key`, if it is resident
    pub fn lookup(&self, key: BufferKey) -> Option<usize> {
        self.buckets[self.bucket(key)]
            .iter()
            .find(|(k, _)| *k == key)
            .map(|&(_, frame_no)| frame_no)
    }

    /// Record that `key` now lives in `frame_no`.
    ///
    /// Keys are unique; inserting a key that is already present is a caller
    /// bug and debug-asserted.
    pub fn insert(&mut self, key: BufferKey, frame_no: usize) {
        let bucket = self.bucket(key);
        debug_assert!(
            !self.buckets[bucket].iter().any(|(k, _)| *k == key),
            "page {} inserted twice",
            key.page_no
        );
        self.buckets[bucket].push((key, frame_no));
    }

    /// Drop the entry for `key`, returning the frame it pointed at
    pub fn remove(&mut self, key: BufferKey) -> Option<usize> {
        let bucket = self.bucket(key);
        let pos = self.buckets[bucket].iter().position(|(k, _)| *k == key)?;
        Some(self.buckets[bucket].swap_remove(pos).1)
    }

    /// Number of resident pages
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    /// Whether no page is resident
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
