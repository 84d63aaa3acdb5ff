//! B+-tree index over an integer attribute.
//!
//! The index lives in its own paged file: a meta page followed by leaf and
//! internal node pages. All I/O goes through the buffer manager; every page
//! pinned by an operation is unpinned before the operation returns, except
//! the leaf held by an active scan cursor.

use crate::btree::meta::{IndexMeta, RELATION_NAME_LEN};
use crate::btree::node::{InternalView, InternalViewMut, LeafView, LeafViewMut};
use crate::btree::scan::ScanState;
use crate::buffer::{BufferManager, PageRef};
use crate::error::{Result, StorageError};
use crate::heap::FileScan;
use crate::storage::PagedFile;
use crate::types::{AttrType, PageNo, RecordId, TreeConfig};
use std::path::Path;
use std::sync::Arc;

/// Conventional index file name for a relation/attribute pair
pub fn index_file_name(relation_name: &str, attr_byte_offset: u32) -> String {
    format!("{relation_name}.{attr_byte_offset}")
}

/// Parameters identifying what an index is over
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Name of the indexed relation
    pub relation_name: String,
    /// Byte offset of the indexed attribute within each record
    pub attr_byte_offset: u32,
    /// Type of the indexed attribute (only `Integer` is supported)
    pub attr_type: AttrType,
    /// Node occupancies for newly created indexes
    pub tree: TreeConfig,
}

impl IndexConfig {
    /// Config for an integer attribute with default occupancies
    pub fn new(relation_name: impl Into<String>, attr_byte_offset: u32) -> Self {
        Self {
            relation_name: relation_name.into(),
            attr_byte_offset,
            attr_type: AttrType::Integer,
            tree: TreeConfig::default(),
        }
    }

    /// Override the node occupancies
    pub fn tree_config(mut self, tree: TreeConfig) -> Self {
        self.tree = tree;
        self
    }

    /// Conventional file name for this config
    pub fn file_name(&self) -> String {
        index_file_name(&self.relation_name, self.attr_byte_offset)
    }
}

/// Result of a node split, handed up the insert recursion: the separator
/// key and the page holding everything at or above it.
pub(super) struct Split {
    pub separator: i32,
    pub right_page: PageNo,
}

/// A disk-resident B+-tree index with integer keys.
///
/// Supports insertion and one active ordered range scan at a time; keys are
/// never deleted.
pub struct BTreeIndex {
    pub(super) buf: Arc<BufferManager>,
    pub(super) file: Arc<PagedFile>,
    meta_page_no: PageNo,
    pub(super) root_page_no: PageNo,
    pub(super) height: u32,
    pub(super) tree: TreeConfig,
    relation_name: String,
    attr_byte_offset: u32,
    attr_type: AttrType,
    pub(super) scan: Option<ScanState>,
    closed: bool,
}

impl BTreeIndex {
    /// Open an existing index file.
    ///
    /// The stored meta page must match the config's relation name, attribute
    /// offset and type; a mismatch is `BadIndexInfo`. Node occupancies and
    /// the root location are adopted from the file.
    pub fn open(
        buf: Arc<BufferManager>,
        path: impl AsRef<Path>,
        config: IndexConfig,
    ) -> Result<Self> {
        let file = Arc::new(PagedFile::open(path, false)?);
        let meta_page_no = file.first_page_no();

        let page = buf.read_page(&file, meta_page_no)?;
        let meta = {
            let data = page.read();
            IndexMeta::read(&data)
        };
        drop(page);
        buf.unpin_page(&file, meta_page_no, false)?;
        let meta = meta?;

        if meta.relation_name != config.relation_name {
            return Err(StorageError::bad_index_info(format!(
                "index is over relation {:?}, not {:?}",
                meta.relation_name, config.relation_name
            )));
        }
        if meta.attr_byte_offset != config.attr_byte_offset {
            return Err(StorageError::bad_index_info(format!(
                "index is over attribute offset {}, not {}",
                meta.attr_byte_offset, config.attr_byte_offset
            )));
        }
        if meta.attr_type != config.attr_type {
            return Err(StorageError::bad_index_info(format!(
                "index is over attribute type {:?}, not {:?}",
                meta.attr_type, config.attr_type
            )));
        }

        Ok(Self {
            buf,
            file,
            meta_page_no,
            root_page_no: meta.root_page_no,
            height: meta.height,
            tree: meta.tree,
            relation_name: meta.relation_name,
            attr_byte_offset: meta.attr_byte_offset,
            attr_type: meta.attr_type,
            scan: None,
            closed: false,
        })
    }

    /// Create a fresh, empty index file.
    ///
    /// The meta page becomes the file's first page and the root starts as
    /// an empty leaf on the page after it.
    pub fn create(
        buf: Arc<BufferManager>,
        path: impl AsRef<Path>,
        config: IndexConfig,
    ) -> Result<Self> {
        if config.relation_name.is_empty()
            || config.relation_name.len() > RELATION_NAME_LEN
        {
            return Err(StorageError::invalid_operation(format!(
                "relation name must be 1..={RELATION_NAME_LEN} bytes"
            )));
        }
        if config.attr_type != AttrType::Integer {
            return Err(StorageError::invalid_operation(
                "only integer attributes can be indexed",
            ));
        }

        let file = Arc::new(PagedFile::open(path, true)?);

        let (meta_page_no, meta_page) = buf.alloc_page(&file)?;
        // A freshly allocated page is all zeros, which is exactly an empty
        // leaf: no live entries, no right sibling.
        let (root_page_no, root_page) = buf.alloc_page(&file)?;
        drop(root_page);
        buf.unpin_page(&file, root_page_no, true)?;

        let index = Self {
            buf,
            file,
            meta_page_no,
            root_page_no,
            height: 1,
            tree: config.tree,
            relation_name: config.relation_name,
            attr_byte_offset: config.attr_byte_offset,
            attr_type: config.attr_type,
            scan: None,
            closed: false,
        };

        {
            let mut data = meta_page.write();
            index.meta().write(&mut data);
        }
        drop(meta_page);
        index.buf.unpin_page(&index.file, meta_page_no, true)?;

        Ok(index)
    }

    /// Create an index and bulk-load it from a relation scan.
    ///
    /// Every record the scan yields is inserted as `(key, record id)`, with
    /// the key read from the record at the configured attribute offset. The
    /// index file is flushed once the scan is exhausted.
    pub fn build(
        buf: Arc<BufferManager>,
        path: impl AsRef<Path>,
        config: IndexConfig,
        scan: &mut FileScan,
    ) -> Result<Self> {
        let attr_byte_offset = config.attr_byte_offset as usize;
        let mut index = Self::create(buf, path, config)?;

        while let Some((rid, record)) = scan.next()? {
            if record.len() < attr_byte_offset + 4 {
                return Err(StorageError::corruption(
                    "record too short for the indexed attribute",
                ));
            }
            let key = i32::from_be_bytes([
                record[attr_byte_offset],
                record[attr_byte_offset + 1],
                record[attr_byte_offset + 2],
                record[attr_byte_offset + 3],
            ]);
            index.insert(key, rid)?;
        }

        index.buf.flush_file(&index.file)?;
        Ok(index)
    }

    /// The index file
    pub fn file(&self) -> &Arc<PagedFile> {
        &self.file
    }

    /// Current root page number
    pub fn root_page_no(&self) -> PageNo {
        self.root_page_no
    }

    /// Current tree height (1 = the root is a leaf)
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Node occupancies of this index
    pub fn tree_config(&self) -> TreeConfig {
        self.tree
    }

    /// Insert a `(key, record id)` pair.
    ///
    /// Splits propagate upward as far as necessary; if the root itself
    /// splits, a new root is allocated and the meta page updated. The
    /// record id must name a real page: page number 0 is the empty-slot
    /// encoding inside leaves.
    pub fn insert(&mut self, key: i32, rid: RecordId) -> Result<()> {
        if !rid.is_some() {
            return Err(StorageError::invalid_operation(
                "record id page number must be non-zero",
            ));
        }
        let root_is_leaf = self.height == 1;
        let split = self.insert_into(self.root_page_no, root_is_leaf, key, rid)?;
        if let Some(split) = split {
            self.grow_root(split)?;
        }
        Ok(())
    }

    /// End any scan and flush the index file, propagating store errors.
    pub fn close(mut self) -> Result<()> {
        if self.scan.is_some() {
            self.end_scan()?;
        }
        self.buf.flush_file(&self.file)?;
        self.closed = true;
        Ok(())
    }

    fn insert_into(
        &mut self,
        page_no: PageNo,
        is_leaf: bool,
        key: i32,
        rid: RecordId,
    ) -> Result<Option<Split>> {
        if is_leaf {
            return self.insert_into_leaf(page_no, key, rid);
        }

        let page = self.buf.read_page(&self.file, page_no)?;
        let (child, next_is_leaf, was_full) = {
            let data = page.read();
            let node = InternalView::new(&data, self.tree.node_capacity);
            let child = node.child(node.descend_index(key));
            (child, node.level() == 1, node.is_full())
        };
        drop(page);
        // Released before descending; re-pinned only if the child splits
        self.buf.unpin_page(&self.file, page_no, false)?;

        let Some(split) = self.insert_into(child, next_is_leaf, key, rid)? else {
            return Ok(None);
        };

        if was_full {
            return self.split_internal(page_no, split).map(Some);
        }

        let page = self.buf.read_page(&self.file, page_no)?;
        {
            let mut data = page.write();
            let mut node = InternalViewMut::new(&mut data, self.tree.node_capacity);
            let live_keys = node.view().live_keys();
            let pos = node.view().descend_index(split.separator);
            node.insert_separator(pos, split.separator, split.right_page, live_keys);
        }
        drop(page);
        self.buf.unpin_page(&self.file, page_no, true)?;
        Ok(None)
    }

    fn insert_into_leaf(
        &mut self,
        page_no: PageNo,
        key: i32,
        rid: RecordId,
    ) -> Result<Option<Split>> {
        let page = self.buf.read_page(&self.file, page_no)?;

        let full = {
            let data = page.read();
            LeafView::new(&data, self.tree.leaf_capacity).is_full()
        };

        if full {
            let split = self.split_leaf(&page, key, rid);
            drop(page);
            self.buf.unpin_page(&self.file, page_no, true)?;
            return split.map(Some);
        }

        {
            let mut data = page.write();
            let mut leaf = LeafViewMut::new(&mut data, self.tree.leaf_capacity);
            let live = leaf.view().live_count();
            let pos = leaf.view().insertion_index(key);
            leaf.insert_at(pos, key, rid, live);
        }
        drop(page);
        self.buf.unpin_page(&self.file, page_no, true)?;
        Ok(None)
    }

    /// Split a full leaf while inserting `(key, rid)`.
    ///
    /// The new right sibling takes the upper half of the merged entry
    /// sequence and slots into the leaf chain; the separator sent up is its
    /// first key. The caller unpins the old leaf.
    fn split_leaf(&mut self, old_page: &PageRef, key: i32, rid: RecordId) -> Result<Split> {
        let cap = self.tree.leaf_capacity;
        let mid = (cap + 1).div_ceil(2);

        let (new_page_no, new_page) = self.buf.alloc_page(&self.file)?;

        {
            let mut old_data = old_page.write();
            let mut new_data = new_page.write();
            let mut old = LeafViewMut::new(&mut old_data, cap);
            let mut new = LeafViewMut::new(&mut new_data, cap);

            let pos = old.view().insertion_index(key);

            if pos < mid {
                // Upper entries from mid-1 move right; the new entry joins
                // the old leaf
                let mut slot = 0;
                for i in (mid - 1)..cap {
                    new.set_entry(slot, old.view().key(i), old.view().rid(i));
                    slot += 1;
                }
                for i in (mid - 1)..cap {
                    old.clear_entry(i);
                }
                old.insert_at(pos, key, rid, mid - 1);
            } else {
                // Upper entries from mid move right with the new entry
                // merged in at its place
                let mut slot = 0;
                for i in mid..pos {
                    new.set_entry(slot, old.view().key(i), old.view().rid(i));
                    slot += 1;
                }
                new.set_entry(slot, key, rid);
                slot += 1;
                for i in pos..cap {
                    new.set_entry(slot, old.view().key(i), old.view().rid(i));
                    slot += 1;
                }
                for i in mid..cap {
                    old.clear_entry(i);
                }
            }

            new.set_right_sibling(old.view().right_sibling());
            old.set_right_sibling(new_page_no);
        }

        let separator = {
            let data = new_page.read();
            LeafView::new(&data, cap).key(0)
        };
        drop(new_page);
        self.buf.unpin_page(&self.file, new_page_no, true)?;

        Ok(Split {
            separator,
            right_page: new_page_no,
        })
    }

    /// Split a full internal node while installing an incoming separator.
    ///
    /// One key is sent up rather than copied: depending on where the
    /// incoming separator lands relative to the midpoint, the send-up key
    /// is the midpoint key of the old node, the incoming separator itself,
    /// or the key just past the midpoint.
    fn split_internal(&mut self, page_no: PageNo, incoming: Split) -> Result<Split> {
        let cap = self.tree.node_capacity;
        let mid = (cap + 1).div_ceil(2);

        let old_page = self.buf.read_page(&self.file, page_no)?;
        let (new_page_no, new_page) = self.buf.alloc_page(&self.file)?;

        let separator;
        {
            let mut old_data = old_page.write();
            let mut new_data = new_page.write();
            let mut old = InternalViewMut::new(&mut old_data, cap);
            let mut new = InternalViewMut::new(&mut new_data, cap);

            new.set_level(old.view().level());
            let pos = old.view().descend_index(incoming.separator);

            if pos < mid {
                separator = old.view().key(mid - 1);
                new.set_child(0, old.view().child(mid));
                old.set_child(mid, PageNo::NONE);

                let mut slot = 0;
                for i in mid..cap {
                    new.set_key(slot, old.view().key(i));
                    new.set_child(slot + 1, old.view().child(i + 1));
                    old.set_child(i + 1, PageNo::NONE);
                    slot += 1;
                }

                // Old node now holds mid-1 keys; shift-insert the incoming
                // separator below the send-up point
                old.insert_separator(pos, incoming.separator, incoming.right_page, mid - 1);
            } else if pos == mid {
                separator = incoming.separator;
                new.set_child(0, incoming.right_page);

                let mut slot = 0;
                for i in mid..cap {
                    new.set_key(slot, old.view().key(i));
                    new.set_child(slot + 1, old.view().child(i + 1));
                    old.set_child(i + 1, PageNo::NONE);
                    slot += 1;
                }
            } else {
                separator = old.view().key(mid);
                new.set_child(0, old.view().child(mid + 1));
                old.set_child(mid + 1, PageNo::NONE);

                let mut slot = 0;
                for i in (mid + 1)..pos {
                    new.set_key(slot, old.view().key(i));
                    new.set_child(slot + 1, old.view().child(i + 1));
                    old.set_child(i + 1, PageNo::NONE);
                    slot += 1;
                }
                new.set_key(slot, incoming.separator);
                new.set_child(slot + 1, incoming.right_page);
                slot += 1;
                for i in pos..cap {
                    new.set_key(slot, old.view().key(i));
                    new.set_child(slot + 1, old.view().child(i + 1));
                    old.set_child(i + 1, PageNo::NONE);
                    slot += 1;
                }
            }
        }

        drop(new_page);
        self.buf.unpin_page(&self.file, new_page_no, true)?;
        drop(old_page);
        self.buf.unpin_page(&self.file, page_no, true)?;

        Ok(Split {
            separator,
            right_page: new_page_no,
        })
    }

    /// Replace the root after it split: a new internal page pointing at the
    /// old root and its new sibling, with the meta page updated in the same
    /// operation.
    fn grow_root(&mut self, split: Split) -> Result<()> {
        let (new_root_no, root_page) = self.buf.alloc_page(&self.file)?;
        {
            let mut data = root_page.write();
            let mut node = InternalViewMut::new(&mut data, self.tree.node_capacity);
            node.set_level(if self.height == 1 { 1 } else { 0 });
            node.set_key(0, split.separator);
            node.set_child(0, self.root_page_no);
            node.set_child(1, split.right_page);
        }
        drop(root_page);
        self.buf.unpin_page(&self.file, new_root_no, true)?;

        self.root_page_no = new_root_no;
        self.height += 1;
        self.write_meta()
    }

    fn meta(&self) -> IndexMeta {
        IndexMeta {
            relation_name: self.relation_name.clone(),
            attr_byte_offset: self.attr_byte_offset,
            attr_type: self.attr_type,
            root_page_no: self.root_page_no,
            height: self.height,
            tree: self.tree,
        }
    }

    fn write_meta(&self) -> Result<()> {
        let page = self.buf.read_page(&self.file, self.meta_page_no)?;
        {
            let mut data = page.write();
            self.meta().write(&mut data);
        }
        drop(page);
        self.buf.unpin_page(&self.file, self.meta_page_no, true)
    }
}

impl Drop for BTreeIndex {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if self.scan.is_some() {
            let _ = self.end_scan();
        }
        let _ = self.buf.flush_file(&self.file);
    }
}
