//! Paged-file header.
//!
//! The first page (page 0) of every paged file holds metadata about the
//! file: its page count and the list of deleted pages available for reuse.

use crate::error::{Result, StorageError};
use crate::types::{PageNo, PAGE_SIZE};

/// Magic bytes identifying a valid paged file
pub const MAGIC: &[u8; 16] = b"RelStorePagedV1\0";

/// Byte offset of the free-list entries within the header page
const FREE_LIST_OFFSET: usize = 32;

/// Most free pages the header page can track.
///
/// Deleting a page when the list is full leaks that page until the file is
/// rebuilt; allocation always prefers the list over extending the file.
pub const MAX_FREE_PAGES: usize = (PAGE_SIZE - FREE_LIST_OFFSET) / 4;

/// Paged-file header
///
/// Layout:
/// ```text
/// Offset  Size  Description
/// 0       16    Magic string "RelStorePagedV1\0"
/// 16      4     Page size (currently always 4096)
/// 20      4     Total page count (including this header page)
/// 24      4     Free page count
/// 28      4     CRC32 of the page with this field zeroed
/// 32      4*n   Free page numbers, newest last
/// ```
#[derive(Debug, Clone)]
pub struct FileHeader {
    /// Page size in bytes
    pub page_size: u32,
    /// Total number of pages in the file (including the header page)
    pub page_count: u32,
    /// Deleted pages available for reuse
    pub free: Vec<PageNo>,
}

impl FileHeader {
    /// Create a new header for an empty file
    pub fn new() -> Self {
        Self {
            page_size: PAGE_SIZE as u32,
            page_count: 1, // just the header page initially
            free: Vec::new(),
        }
    }

    /// Read a file header from a header page
    pub fn read(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PAGE_SIZE {
            return Err(StorageError::invalid_db("header page too short"));
        }

        if &bytes[0..16] != MAGIC {
            return Err(StorageError::invalid_db("invalid magic bytes"));
        }

        let stored_crc = u32::from_be_bytes([bytes[28], bytes[29], bytes[30], bytes[31]]);
        let mut check = bytes[..PAGE_SIZE].to_vec();
        check[28..32].fill(0);
        if stored_crc != crc32fast::hash(&check) {
            return Err(StorageError::corruption("header checksum mismatch"));
        }

        let page_size = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
        if page_size != PAGE_SIZE as u32 {
            return Err(StorageError::invalid_db(format!(
                "unsupported page size: {} (expected {})",
                page_size, PAGE_SIZE
            )));
        }

        let page_count = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
        let free_count = u32::from_be_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]) as usize;
        if free_count > MAX_FREE_PAGES {
            return Err(StorageError::corruption("free list longer than a page"));
        }

        let mut free = Vec::with_capacity(free_count);
        for i in 0..free_count {
            let at = FREE_LIST_OFFSET + i * 4;
            free.push(PageNo::new(u32::from_be_bytes([
                bytes[at],
                bytes[at + 1],
                bytes[at + 2],
                bytes[at + 3],
            ])));
        }

        Ok(Self {
            page_size,
            page_count,
            free,
        })
    }

    /// Write this header into a header page
    pub fn write(&self, bytes: &mut [u8]) {
        bytes[..PAGE_SIZE].fill(0);

        bytes[0..16].copy_from_slice(MAGIC);
        bytes[16..20].copy_from_slice(&self.page_size.to_be_bytes());
        bytes[20..24].copy_from_slice(&self.page_count.to_be_bytes());
        bytes[24..28].copy_from_slice(&(self.free.len() as u32).to_be_bytes());

        for (i, page_no) in self.free.iter().enumerate() {
            let at = FREE_LIST_OFFSET + i * 4;
            bytes[at..at + 4].copy_from_slice(&page_no.value().to_be_bytes());
        }

        let crc = crc32fast::hash(&bytes[..PAGE_SIZE]);
        bytes[28..32].copy_from_slice(&crc.to_be_bytes());
    }

    /// Hand out a page number, reusing a deleted page when one is available
    pub fn allocate_page(&mut self) -> PageNo {
        if let Some(page_no) = self.free.pop() {
            return page_no;
        }
        let page_no = PageNo::new(self.page_count);
        self.page_count += 1;
        page_no
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}
