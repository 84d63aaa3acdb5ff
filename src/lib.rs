//! # relstore
//!
//! A disk-based relational storage core built from modular layers:
//!
//! - **Storage Layer** (`storage`): paged files with per-file headers and
//!   free-list page reuse
//! - **Buffer Pool** (`buffer`): pin-counted page cache with clock
//!   second-chance replacement and dirty write-back
//! - **B+-Tree Layer** (`btree`): integer-keyed index with recursive splits
//!   and leaf-chained range scans
//! - **Heap Layer** (`heap`): fixed-length record files feeding bulk index
//!   construction
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relstore::{BTreeIndex, BufferManager, IndexConfig, ScanOp};
//! use std::sync::Arc;
//!
//! let buf = Arc::new(BufferManager::new(1024));
//! let config = IndexConfig::new("orders", 0);
//! let path = dir.join(config.file_name());
//!
//! let mut index = BTreeIndex::create(Arc::clone(&buf), &path, config)?;
//! index.insert(42, rid)?;
//!
//! index.start_scan(10, ScanOp::Gte, 50, ScanOp::Lte)?;
//! while let Ok(rid) = index.scan_next() {
//!     println!("matched {rid}");
//! }
//! index.end_scan()?;
//! ```

pub mod btree;
pub mod buffer;
pub mod error;
pub mod heap;
pub mod storage;
pub mod types;

pub use error::{Result, StorageError};
pub use types::{AttrType, PageNo, RecordId, TreeConfig, PAGE_SIZE};

// Re-export main public API
pub use btree::{index_file_name, BTreeIndex, IndexConfig, ScanOp};
pub use buffer::{BufferManager, BufferStats, PageRef};
pub use heap::{FileScan, HeapFile};
pub use storage::{FileId, PageBuf, PagedFile};
