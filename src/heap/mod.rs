//! Heap files: fixed-length records in page-sized blocks.
//!
//! This is the bulk-load side of the index: a relation stored as a paged
//! file of fixed-length records, and a scanner that walks it front to back
//! yielding `(record id, record bytes)` pairs. The record layout itself is
//! the caller's business; the index only reads its key attribute at a fixed
//! byte offset.
//!
//! Heap page layout:
//! ```text
//! Offset            Size        Description
//! 0                 2           Record count
//! 2 + len*slot      len         Record bytes for each slot
//! ```

use crate::buffer::BufferManager;
use crate::error::{Result, StorageError};
use crate::storage::PagedFile;
use crate::types::{PageNo, RecordId, PAGE_SIZE};
use std::path::Path;
use std::sync::Arc;

const PAGE_HEADER_SIZE: usize = 2;

fn read_count(data: &[u8]) -> usize {
    u16::from_be_bytes([data[0], data[1]]) as usize
}

fn write_count(data: &mut [u8], count: usize) {
    data[0..2].copy_from_slice(&(count as u16).to_be_bytes());
}

fn record_offset(record_len: usize, slot: usize) -> usize {
    PAGE_HEADER_SIZE + record_len * slot
}

/// A relation stored as fixed-length records in a paged file.
pub struct HeapFile {
    file: Arc<PagedFile>,
    record_len: usize,
}

impl HeapFile {
    /// Create a fresh heap file for records of `record_len` bytes
    pub fn create(path: impl AsRef<Path>, record_len: usize) -> Result<Self> {
        Self::validate_record_len(record_len)?;
        Ok(Self {
            file: Arc::new(PagedFile::open(path, true)?),
            record_len,
        })
    }

    /// Open an existing heap file of records of `record_len` bytes.
    ///
    /// The record length is part of the relation's schema, which lives
    /// outside this file; the caller must supply the same length the file
    /// was written with.
    pub fn open(path: impl AsRef<Path>, record_len: usize) -> Result<Self> {
        Self::validate_record_len(record_len)?;
        Ok(Self {
            file: Arc::new(PagedFile::open(path, false)?),
            record_len,
        })
    }

    fn validate_record_len(record_len: usize) -> Result<()> {
        if record_len == 0 || record_len > PAGE_SIZE - PAGE_HEADER_SIZE {
            return Err(StorageError::invalid_operation(format!(
                "record length must be 1..={} bytes",
                PAGE_SIZE - PAGE_HEADER_SIZE
            )));
        }
        Ok(())
    }

    /// The backing paged file
    pub fn file(&self) -> &Arc<PagedFile> {
        &self.file
    }

    /// Length of every record in this file
    pub fn record_len(&self) -> usize {
        self.record_len
    }

    /// How many records fit on one page
    pub fn records_per_page(&self) -> usize {
        (PAGE_SIZE - PAGE_HEADER_SIZE) / self.record_len
    }

    /// Append a record, returning where it landed.
    ///
    /// Fills the last page before allocating a new one.
    pub fn insert_record(&self, buf: &BufferManager, record: &[u8]) -> Result<RecordId> {
        if record.len() != self.record_len {
            return Err(StorageError::invalid_operation(format!(
                "record is {} bytes, expected {}",
                record.len(),
                self.record_len
            )));
        }

        // Try the last data page first
        let page_count = self.file.page_count();
        if page_count > 1 {
            let last = PageNo::new(page_count - 1);
            let page = buf.read_page(&self.file, last)?;
            let count = read_count(&page.read());
            if count < self.records_per_page() {
                let slot = count;
                {
                    let mut data = page.write();
                    let at = record_offset(self.record_len, slot);
                    data[at..at + self.record_len].copy_from_slice(record);
                    write_count(&mut data, count + 1);
                }
                drop(page);
                buf.unpin_page(&self.file, last, true)?;
                return Ok(RecordId::new(last, slot as u16));
            }
            drop(page);
            buf.unpin_page(&self.file, last, false)?;
        }

        let (page_no, page) = buf.alloc_page(&self.file)?;
        {
            let mut data = page.write();
            let at = record_offset(self.record_len, 0);
            data[at..at + self.record_len].copy_from_slice(record);
            write_count(&mut data, 1);
        }
        drop(page);
        buf.unpin_page(&self.file, page_no, true)?;
        Ok(RecordId::new(page_no, 0))
    }
}

/// Front-to-back scan over a heap file's records.
///
/// Keeps the page under the cursor pinned between calls; the pin moves
/// forward as pages are exhausted and is released when the scan is dropped
/// or runs off the end.
pub struct FileScan {
    file: Arc<PagedFile>,
    buf: Arc<BufferManager>,
    record_len: usize,
    next_page: PageNo,
    current: Option<ScanPage>,
}

struct ScanPage {
    page_no: PageNo,
    page: crate::buffer::PageRef,
    next_slot: usize,
    count: usize,
}

impl FileScan {
    /// Start a scan at the front of the heap file
    pub fn new(heap: &HeapFile, buf: Arc<BufferManager>) -> Self {
        Self {
            file: Arc::clone(heap.file()),
            buf,
            record_len: heap.record_len(),
            next_page: heap.file().first_page_no(),
            current: None,
        }
    }

    /// Yield the next record, or `None` once the file is exhausted.
    pub fn next(&mut self) -> Result<Option<(RecordId, Vec<u8>)>> {
        loop {
            if self.current.is_none() {
                if self.next_page.value() >= self.file.page_count() {
                    return Ok(None);
                }
                let page_no = self.next_page;
                let page = self.buf.read_page(&self.file, page_no)?;
                let count = read_count(&page.read());
                self.current = Some(ScanPage {
                    page_no,
                    page,
                    next_slot: 0,
                    count,
                });
            }

            // Invariant: current is Some here
            let Some(current) = self.current.as_mut() else {
                return Ok(None);
            };

            if current.next_slot >= current.count {
                let page_no = current.page_no;
                self.current = None;
                self.buf.unpin_page(&self.file, page_no, false)?;
                self.next_page = PageNo::new(page_no.value() + 1);
                continue;
            }

            let slot = current.next_slot;
            current.next_slot += 1;

            let record = {
                let data = current.page.read();
                let at = record_offset(self.record_len, slot);
                data[at..at + self.record_len].to_vec()
            };
            return Ok(Some((RecordId::new(current.page_no, slot as u16), record)));
        }
    }
}

impl Drop for FileScan {
    fn drop(&mut self) {
        if let Some(current) = self.current.take() {
            let page_no = current.page_no;
            drop(current.page);
            let _ = self.buf.unpin_page(&self.file, page_no, false);
        }
    }
}
