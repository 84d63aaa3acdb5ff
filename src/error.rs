//! Error types for the storage engine.

use crate::types::PageNo;
use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur in the storage engine
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error from the underlying file system
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested page was not found in the file
    #[error("page {page_no} not found in {file}")]
    PageNotFound { file: String, page_no: PageNo },

    /// Every buffer frame is pinned; nothing can be evicted
    #[error("buffer pool exceeded: all {frames} frames are pinned")]
    BufferExceeded { frames: usize },

    /// Unpin was called on a page whose pin count is already zero
    #[error("page {page_no} of {file} is not pinned")]
    PageNotPinned { file: String, page_no: PageNo },

    /// Dispose or flush touched a page that is still pinned
    #[error("page {page_no} of {file} is still pinned")]
    PagePinned { file: String, page_no: PageNo },

    /// Flush found an invalid frame still claimed by the file
    #[error("bad buffer frame {frame_no}: invalid but still owned by {file}")]
    BadBuffer { file: String, frame_no: usize },

    /// On-disk index metadata does not match the open parameters
    #[error("bad index info: {0}")]
    BadIndexInfo(String),

    /// Scan range has a low bound above its high bound
    #[error("bad scan range: low {low} exceeds high {high}")]
    BadScanRange { low: i32, high: i32 },

    /// Scan operator outside the allowed sets (GT/GTE low, LT/LTE high)
    #[error("bad scan opcodes")]
    BadOpcodes,

    /// Scan operation without a prior successful start_scan
    #[error("scan not initialized")]
    ScanNotInitialized,

    /// No further records satisfy the scan criteria
    #[error("index scan completed")]
    ScanComplete,

    /// Database file is corrupted or has an invalid format
    #[error("invalid database file: {0}")]
    InvalidDatabaseFile(String),

    /// Data corruption detected (e.g., checksum mismatch)
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// Invalid operation for the current state
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl StorageError {
    /// Create a corruption error with a message
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Create an invalid operation error
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Create an invalid database file error
    pub fn invalid_db(msg: impl Into<String>) -> Self {
        Self::InvalidDatabaseFile(msg.into())
    }

    /// Create a bad index info error
    pub fn bad_index_info(msg: impl Into<String>) -> Self {
        Self::BadIndexInfo(msg.into())
    }
}
