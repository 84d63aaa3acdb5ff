//! Ordered range scans over the index.
//!
//! An index carries at most one scan at a time. The scan keeps its current
//! leaf pinned between calls; advancing past the end of a leaf unpins it
//! and pins the right sibling, so exactly one leaf is held at any point of
//! a live scan.

use crate::btree::index::BTreeIndex;
use crate::btree::node::{InternalView, LeafView};
use crate::buffer::PageRef;
use crate::error::{Result, StorageError};
use crate::types::{PageNo, RecordId};

/// Comparison operator for a scan bound.
///
/// The low bound takes `Gt`/`Gte`, the high bound `Lt`/`Lte`; anything else
/// is rejected with `BadOpcodes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOp {
    Lt,
    Lte,
    Gte,
    Gt,
}

/// Position within a live scan: the pinned leaf and the next slot to visit
struct Cursor {
    page_no: PageNo,
    page: PageRef,
    next_entry: usize,
}

/// State of the index's active scan
pub(super) struct ScanState {
    high: i32,
    /// true for `Gt`, false for `Gte`
    low_strict: bool,
    /// true for `Lte`, false for `Lt`
    high_inclusive: bool,
    /// None once the scan has run off the leaf chain
    cursor: Option<Cursor>,
}

impl BTreeIndex {
    /// Begin a range scan over `[low, high]` under the given operators.
    ///
    /// Replaces any scan already in progress. Descends to the leftmost leaf
    /// that can hold a qualifying key and positions the cursor on the first
    /// entry passing the low bound, chasing right siblings if that entry
    /// lives further along the chain. A range with nothing in it leaves the
    /// scan positioned at the end: the first `scan_next` reports
    /// completion.
    pub fn start_scan(
        &mut self,
        low: i32,
        low_op: ScanOp,
        high: i32,
        high_op: ScanOp,
    ) -> Result<()> {
        if low > high {
            return Err(StorageError::BadScanRange { low, high });
        }
        let low_strict = match low_op {
            ScanOp::Gt => true,
            ScanOp::Gte => false,
            _ => return Err(StorageError::BadOpcodes),
        };
        let high_inclusive = match high_op {
            ScanOp::Lte => true,
            ScanOp::Lt => false,
            _ => return Err(StorageError::BadOpcodes),
        };

        if self.scan.is_some() {
            self.end_scan()?;
        }

        // Walk internals toward the leftmost leaf that can hold the low
        // bound, unpinning each node once its child is chosen
        let mut page_no = self.root_page_no;
        if self.height > 1 {
            loop {
                let page = self.buf.read_page(&self.file, page_no)?;
                let (child, children_are_leaves) = {
                    let data = page.read();
                    let node = InternalView::new(&data, self.tree.node_capacity);
                    (node.child(node.lower_bound_index(low)), node.level() == 1)
                };
                drop(page);
                self.buf.unpin_page(&self.file, page_no, false)?;

                page_no = child;
                if children_are_leaves {
                    break;
                }
            }
        }

        // Find the first entry passing the low bound, following the leaf
        // chain as far as needed
        let cursor = loop {
            let page = self.buf.read_page(&self.file, page_no)?;
            let (first_match, sibling) = {
                let data = page.read();
                let leaf = LeafView::new(&data, self.tree.leaf_capacity);
                let live = leaf.live_count();
                let first_match = (0..live).find(|&slot| {
                    let key = leaf.key(slot);
                    if low_strict {
                        key > low
                    } else {
                        key >= low
                    }
                });
                (first_match, leaf.right_sibling())
            };

            if let Some(next_entry) = first_match {
                break Some(Cursor {
                    page_no,
                    page,
                    next_entry,
                });
            }

            drop(page);
            self.buf.unpin_page(&self.file, page_no, false)?;

            if !sibling.is_some() {
                break None;
            }
            page_no = sibling;
        };

        self.scan = Some(ScanState {
            high,
            low_strict,
            high_inclusive,
            cursor,
        });
        Ok(())
    }

    /// Fetch the record id of the next qualifying entry.
    ///
    /// Reports `ScanNotInitialized` without an active scan and
    /// `ScanComplete` once the high bound is passed or the leaf chain ends;
    /// the cursor leaf is unpinned before completion is reported.
    pub fn scan_next(&mut self) -> Result<RecordId> {
        let state = self.scan.as_mut().ok_or(StorageError::ScanNotInitialized)?;
        let Some(cursor) = state.cursor.as_mut() else {
            return Err(StorageError::ScanComplete);
        };

        let (key, rid, live, sibling) = {
            let data = cursor.page.read();
            let leaf = LeafView::new(&data, self.tree.leaf_capacity);
            (
                leaf.key(cursor.next_entry),
                leaf.rid(cursor.next_entry),
                leaf.live_count(),
                leaf.right_sibling(),
            )
        };

        let passes_high = if state.high_inclusive {
            key <= state.high
        } else {
            key < state.high
        };
        if !passes_high {
            let page_no = cursor.page_no;
            state.cursor = None;
            self.buf.unpin_page(&self.file, page_no, false)?;
            return Err(StorageError::ScanComplete);
        }

        cursor.next_entry += 1;
        if cursor.next_entry >= live {
            // Current leaf exhausted: hand the pin over to the sibling, or
            // park the scan at the end of the chain
            let page_no = cursor.page_no;
            state.cursor = None;
            self.buf.unpin_page(&self.file, page_no, false)?;

            if sibling.is_some() {
                let page = self.buf.read_page(&self.file, sibling)?;
                state.cursor = Some(Cursor {
                    page_no: sibling,
                    page,
                    next_entry: 0,
                });
            }
        }

        Ok(rid)
    }

    /// Terminate the active scan, unpinning its leaf.
    pub fn end_scan(&mut self) -> Result<()> {
        let state = self.scan.take().ok_or(StorageError::ScanNotInitialized)?;
        if let Some(cursor) = state.cursor {
            let page_no = cursor.page_no;
            drop(cursor.page);
            match self.buf.unpin_page(&self.file, page_no, false) {
                // Tolerated during teardown: the pin may already be gone if
                // the pool was torn down around the scan
                Err(StorageError::PageNotPinned { .. }) => {}
                other => other?,
            }
        }
        Ok(())
    }
}
