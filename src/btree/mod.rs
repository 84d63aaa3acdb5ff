//! B+-tree index.
//!
//! A disk-resident B+-tree keyed by an integer attribute of a relation:
//! - insertion with recursive splits, the root growing as needed
//! - ordered range scans with configurable strict/inclusive bounds
//! - bulk construction from a relation scan

mod index;
mod meta;
mod node;
mod scan;

pub use index::{index_file_name, BTreeIndex, IndexConfig};
pub use meta::IndexMeta;
pub use node::{InternalView, InternalViewMut, LeafView, LeafViewMut};
pub use scan::ScanOp;
