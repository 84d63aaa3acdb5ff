//! Frame descriptors for the buffer pool.
//!
//! A frame is a slot in the buffer pool that can hold one page at a time.
//! The descriptor tracks which page occupies the frame and its pin/dirty
//! state; the page bytes themselves live in the frame's payload buffer.

use crate::storage::PagedFile;
use crate::types::PageNo;
use std::sync::Arc;

/// Bookkeeping for one buffer-pool frame.
///
/// When `valid` is false the frame is free and every other field except
/// `frame_no` is meaningless. When `valid` is true the frame holds page
/// `page_no` of `file`, and the page table has exactly one entry pointing
/// here.
#[derive(Debug, Clone, Default)]
pub struct FrameDesc {
    /// Index of this frame in the frame table (constant)
    pub frame_no: usize,
    /// File owning the resident page, if any
    pub file: Option<Arc<PagedFile>>,
    /// Page number of the resident page
    pub page_no: PageNo,
    /// Number of outstanding holders; zero means evictable
    pub pin_count: u32,
    /// Whether the page was modified since it was loaded
    pub dirty: bool,
    /// Clock second-chance bit
    pub ref_bit: bool,
    /// Whether the frame holds a page at all
    pub valid: bool,
}

impl FrameDesc {
    /// Create a free frame descriptor
    pub fn new(frame_no: usize) -> Self {
        Self {
            frame_no,
            ..Self::default()
        }
    }

    /// Install a freshly loaded page: one pin, clean, referenced
    pub fn set(&mut self, file: Arc<PagedFile>, page_no: PageNo) {
        self.file = Some(file);
        self.page_no = page_no;
        self.pin_count = 1;
        self.dirty = false;
        self.ref_bit = true;
        self.valid = true;
    }

    /// Return the frame to the free state
    pub fn clear(&mut self) {
        self.file = None;
        self.page_no = PageNo::NONE;
        self.pin_count = 0;
        self.dirty = false;
        self.ref_bit = false;
        self.valid = false;
    }

    /// Whether the frame has outstanding pins
    pub fn is_pinned(&self) -> bool {
        self.pin_count > 0
    }
}
