//! Buffer manager: pinned in-memory access to on-disk pages.
//!
//! The pool holds a fixed number of frames. Clients pin pages with
//! [`BufferManager::read_page`] / [`BufferManager::alloc_page`] and release
//! them with [`BufferManager::unpin_page`]; eviction runs a clock
//! second-chance sweep over unpinned frames, writing dirty pages back
//! before their frame is reused.

use crate::buffer::frame::FrameDesc;
use crate::buffer::page_table::{BufferKey, PageTable};
use crate::error::{Result, StorageError};
use crate::storage::{PageBuf, PagedFile};
use crate::types::PageNo;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// Handle to a pinned page.
///
/// The handle keeps no pin of its own: the pin taken by `read_page` /
/// `alloc_page` stays until the matching `unpin_page` call, and holding a
/// `PageRef` past that unpin is undefined (the frame may be reassigned).
/// Do not hold a page guard across buffer-manager calls on the same page.
pub struct PageRef {
    page_no: PageNo,
    data: Arc<RwLock<PageBuf>>,
}

impl PageRef {
    /// Page number this handle refers to
    pub fn page_no(&self) -> PageNo {
        self.page_no
    }

    /// Lock the page bytes for reading
    pub fn read(&self) -> RwLockReadGuard<'_, PageBuf> {
        self.data.read()
    }

    /// Lock the page bytes for writing.
    ///
    /// Writing through this guard does not mark the frame dirty; pass
    /// `dirty = true` to `unpin_page` after modifying the page.
    pub fn write(&self) -> RwLockWriteGuard<'_, PageBuf> {
        self.data.write()
    }
}

/// Snapshot of the pool's frame states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStats {
    /// Total frames in the pool
    pub frames: usize,
    /// Frames currently holding a page
    pub valid: usize,
    /// Frames holding a modified page
    pub dirty: usize,
    /// Frames with at least one pin
    pub pinned: usize,
}

struct PoolInner {
    descs: Vec<FrameDesc>,
    page_table: PageTable,
    clock_hand: usize,
}

/// Fixed-size buffer pool with clock replacement.
///
/// At most one frame holds any given `(file, page)` at a time. Files are
/// distinguished by handle identity, so several indexes can share one pool.
pub struct BufferManager {
    pool_size: usize,
    /// Frame payloads, allocated once for the life of the pool
    pages: Vec<Arc<RwLock<PageBuf>>>,
    inner: RwLock<PoolInner>,
}

impl BufferManager {
    /// Create a pool with `frames` frames.
    ///
    /// # Panics
    ///
    /// Panics if `frames` is zero.
    pub fn new(frames: usize) -> Self {
        assert!(frames > 0, "buffer pool needs at least one frame");

        Self {
            pool_size: frames,
            pages: (0..frames)
                .map(|_| Arc::new(RwLock::new(PageBuf::new())))
                .collect(),
            inner: RwLock::new(PoolInner {
                descs: (0..frames).map(FrameDesc::new).collect(),
                page_table: PageTable::new(frames),
                // One step before frame 0, so the first sweep starts there
                clock_hand: frames - 1,
            }),
        }
    }

    /// Number of frames in the pool
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Pin a page, loading it from the file on a miss.
    ///
    /// On a hit the reference bit is set and the pin count incremented; on a
    /// miss a frame is claimed (evicting if necessary), the page read from
    /// the store, and the frame installed with a single pin.
    pub fn read_page(&self, file: &Arc<PagedFile>, page_no: PageNo) -> Result<PageRef> {
        let mut inner = self.inner.write();
        let key = BufferKey::new(file.id(), page_no);

        if let Some(frame_no) = inner.page_table.lookup(key) {
            let desc = &mut inner.descs[frame_no];
            desc.ref_bit = true;
            desc.pin_count += 1;
            return Ok(self.page_ref(frame_no, page_no));
        }

        let frame_no = self.alloc_frame(&mut inner)?;
        {
            let mut data = self.pages[frame_no].write();
            file.read_page(page_no, &mut data)?;
        }
        inner.page_table.insert(key, frame_no);
        inner.descs[frame_no].set(Arc::clone(file), page_no);

        Ok(self.page_ref(frame_no, page_no))
    }

    /// Allocate a new page in `file` and pin it.
    ///
    /// The returned frame holds the page's initial (all-zero) contents.
    pub fn alloc_page(&self, file: &Arc<PagedFile>) -> Result<(PageNo, PageRef)> {
        let page_no = file.allocate_page()?;

        let mut inner = self.inner.write();
        let frame_no = self.alloc_frame(&mut inner)?;
        self.pages[frame_no].write().zero();
        inner
            .page_table
            .insert(BufferKey::new(file.id(), page_no), frame_no);
        inner.descs[frame_no].set(Arc::clone(file), page_no);

        Ok((page_no, self.page_ref(frame_no, page_no)))
    }

    /// Release one pin on a page, optionally marking it dirty.
    ///
    /// Silently returns when the page is not resident. Unpinning a page
    /// whose pin count is already zero is a client accounting bug and
    /// reported as `PageNotPinned`. The reference bit is not touched here;
    /// only access paths maintain it.
    pub fn unpin_page(&self, file: &PagedFile, page_no: PageNo, dirty: bool) -> Result<()> {
        let mut inner = self.inner.write();
        let key = BufferKey::new(file.id(), page_no);

        let Some(frame_no) = inner.page_table.lookup(key) else {
            return Ok(());
        };

        let desc = &mut inner.descs[frame_no];
        if desc.pin_count == 0 {
            return Err(StorageError::PageNotPinned {
                file: file.filename(),
                page_no,
            });
        }
        desc.pin_count -= 1;
        if dirty {
            desc.dirty = true;
        }
        Ok(())
    }

    /// Write back and release every frame belonging to `file`.
    ///
    /// Fails with `PagePinned` if any page of the file is still pinned and
    /// with `BadBuffer` if an invalid frame still claims the file; in both
    /// cases the flush is aborted where it stood.
    pub fn flush_file(&self, file: &PagedFile) -> Result<()> {
        let mut inner = self.inner.write();
        let target = file.id();

        for frame_no in 0..self.pool_size {
            let desc = &inner.descs[frame_no];
            let owned = desc.file.as_ref().is_some_and(|f| f.id() == target);
            if !owned {
                continue;
            }

            if desc.is_pinned() {
                return Err(StorageError::PagePinned {
                    file: file.filename(),
                    page_no: desc.page_no,
                });
            }
            if !desc.valid {
                return Err(StorageError::BadBuffer {
                    file: file.filename(),
                    frame_no,
                });
            }

            let page_no = desc.page_no;
            if desc.dirty {
                let data = self.pages[frame_no].read();
                file.write_page(page_no, &data)?;
            }

            inner.page_table.remove(BufferKey::new(target, page_no));
            inner.descs[frame_no].clear();
        }

        file.sync()?;
        Ok(())
    }

    /// Delete a page from `file`, releasing its frame first if resident.
    ///
    /// Fails with `PagePinned` when the resident page still has pins.
    pub fn dispose_page(&self, file: &Arc<PagedFile>, page_no: PageNo) -> Result<()> {
        {
            let mut inner = self.inner.write();
            let key = BufferKey::new(file.id(), page_no);

            if let Some(frame_no) = inner.page_table.lookup(key) {
                if inner.descs[frame_no].is_pinned() {
                    return Err(StorageError::PagePinned {
                        file: file.filename(),
                        page_no,
                    });
                }
                inner.descs[frame_no].clear();
                inner.page_table.remove(key);
            }
        }

        file.delete_page(page_no)
    }

    /// Whether `(file, page_no)` is currently resident
    pub fn contains(&self, file: &PagedFile, page_no: PageNo) -> bool {
        self.inner
            .read()
            .page_table
            .lookup(BufferKey::new(file.id(), page_no))
            .is_some()
    }

    /// Snapshot frame-state counts
    pub fn stats(&self) -> BufferStats {
        let inner = self.inner.read();
        let mut stats = BufferStats {
            frames: self.pool_size,
            valid: 0,
            dirty: 0,
            pinned: 0,
        };
        for desc in &inner.descs {
            if desc.valid {
                stats.valid += 1;
                if desc.dirty {
                    stats.dirty += 1;
                }
                if desc.is_pinned() {
                    stats.pinned += 1;
                }
            }
        }
        stats
    }

    fn page_ref(&self, frame_no: usize, page_no: PageNo) -> PageRef {
        PageRef {
            page_no,
            data: Arc::clone(&self.pages[frame_no]),
        }
    }

    /// Claim a free frame via the clock sweep.
    ///
    /// Invalid frames are adopted directly. Pinned frames are skipped but
    /// counted: a full sweep that saw only pinned frames fails with
    /// `BufferExceeded`. Referenced frames lose their second chance and the
    /// sweep continues; an unpinned, unreferenced frame is evicted (written
    /// back first when dirty).
    fn alloc_frame(&self, inner: &mut PoolInner) -> Result<usize> {
        let frames = self.pool_size;
        let mut pinned_seen = 0;

        loop {
            inner.clock_hand = (inner.clock_hand + 1) % frames;
            let hand = inner.clock_hand;

            let desc = &mut inner.descs[hand];
            if !desc.valid {
                return Ok(hand);
            }
            if desc.is_pinned() {
                pinned_seen += 1;
                if pinned_seen == frames {
                    return Err(StorageError::BufferExceeded { frames });
                }
                continue;
            }
            if desc.ref_bit {
                desc.ref_bit = false;
                continue;
            }

            // Victim found: write back if dirty, then free the frame
            let page_no = desc.page_no;
            let dirty = desc.dirty;
            let file = desc.file.clone();

            if let Some(file) = file {
                if dirty {
                    let data = self.pages[hand].read();
                    file.write_page(page_no, &data)?;
                }
                inner
                    .page_table
                    .remove(BufferKey::new(file.id(), page_no));
            }
            inner.descs[hand].clear();
            return Ok(hand);
        }
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        // Best-effort write-back of dirty pages; no clients remain, so
        // pins are not consulted and store errors are dropped.
        let inner = self.inner.read();
        for desc in inner.descs.iter().filter(|d| d.valid && d.dirty) {
            if let Some(file) = &desc.file {
                let data = self.pages[desc.frame_no].read();
                let _ = file.write_page(desc.page_no, &data);
            }
        }
    }
}
