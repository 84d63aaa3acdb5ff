//! End-to-end index scenarios: bulk builds, range scans, reopen, and
//! permutation round-trips over a shared buffer pool.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use relstore::{
    BTreeIndex, BufferManager, FileScan, HeapFile, IndexConfig, PageNo, RecordId, ScanOp,
    StorageError, TreeConfig,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

const RECORD_LEN: usize = 16;

fn rid(n: u32) -> RecordId {
    RecordId::new(PageNo::new(n), n as u16)
}

fn record(key: i32) -> Vec<u8> {
    let mut rec = vec![0u8; RECORD_LEN];
    rec[0..4].copy_from_slice(&key.to_be_bytes());
    rec
}

fn small_config(relation: &str) -> IndexConfig {
    IndexConfig::new(relation, 0).tree_config(TreeConfig::new(4, 4))
}

fn create_index(
    buf: &Arc<BufferManager>,
    dir: &Path,
    relation: &str,
) -> BTreeIndex {
    let config = small_config(relation);
    let path = dir.join(config.file_name());
    BTreeIndex::create(Arc::clone(buf), path, config).unwrap()
}

fn collect(
    index: &mut BTreeIndex,
    low: i32,
    low_op: ScanOp,
    high: i32,
    high_op: ScanOp,
) -> Vec<RecordId> {
    index.start_scan(low, low_op, high, high_op).unwrap();
    let mut out = Vec::new();
    loop {
        match index.scan_next() {
            Ok(rid) => out.push(rid),
            Err(StorageError::ScanComplete) => break,
            Err(e) => panic!("scan failed: {e}"),
        }
    }
    index.end_scan().unwrap();
    out
}

#[test]
fn bulk_build_and_scan() {
    let dir = tempdir().unwrap();
    let buf = Arc::new(BufferManager::new(10));

    let heap = HeapFile::create(dir.path().join("orders.db"), RECORD_LEN).unwrap();
    for key in [40, 10, 30, 20, 50, 25, 45, 5, 35, 15] {
        heap.insert_record(&buf, &record(key)).unwrap();
    }

    let config = small_config("orders");
    let path = dir.path().join(config.file_name());
    let mut scan = FileScan::new(&heap, Arc::clone(&buf));
    let mut index = BTreeIndex::build(Arc::clone(&buf), &path, config, &mut scan).unwrap();
    drop(scan);

    // Ten keys under leaf capacity 4 means the tree has split
    assert!(index.height() >= 2);

    let hits = collect(&mut index, 15, ScanOp::Gt, 45, ScanOp::Lt);
    assert_eq!(hits.len(), 5); // 20, 25, 30, 35, 40

    let all = collect(&mut index, i32::MIN, ScanOp::Gte, i32::MAX, ScanOp::Lte);
    assert_eq!(all.len(), 10);

    index.close().unwrap();
    assert_eq!(buf.stats().pinned, 0);
}

#[test]
fn permutations_scan_identically() {
    let dir = tempdir().unwrap();
    let buf = Arc::new(BufferManager::new(10));
    let mut rng = StdRng::seed_from_u64(0x5EED);

    let mut keys: Vec<i32> = (0..200).collect();
    let mut baseline: Option<Vec<RecordId>> = None;

    for trial in 0..3 {
        keys.shuffle(&mut rng);

        let relation = format!("perm{trial}");
        let mut index = create_index(&buf, dir.path(), &relation);
        for &key in &keys {
            index.insert(key, rid(key as u32 + 1)).unwrap();
        }

        let scanned = collect(&mut index, 0, ScanOp::Gte, 199, ScanOp::Lte);
        match &baseline {
            None => {
                // Sorted output with one rid per key
                let expected: Vec<_> = (0..200).map(|k| rid(k as u32 + 1)).collect();
                assert_eq!(scanned, expected);
                baseline = Some(scanned);
            }
            Some(expected) => assert_eq!(&scanned, expected, "trial {trial}"),
        }
        index.close().unwrap();
    }
}

#[test]
fn reopen_preserves_scan_results() {
    let dir = tempdir().unwrap();
    let buf = Arc::new(BufferManager::new(10));

    let before = {
        let mut index = create_index(&buf, dir.path(), "persist");
        for key in (0..100).rev() {
            index.insert(key, rid(key as u32 + 1)).unwrap();
        }
        let before = collect(&mut index, 10, ScanOp::Gte, 90, ScanOp::Lt);
        index.close().unwrap();
        before
    };

    let config = small_config("persist");
    let path = dir.path().join(config.file_name());
    let mut index = BTreeIndex::open(Arc::clone(&buf), path, config).unwrap();
    let after = collect(&mut index, 10, ScanOp::Gte, 90, ScanOp::Lt);
    assert_eq!(before, after);
    index.close().unwrap();
}

#[test]
fn two_indexes_share_one_pool() {
    let dir = tempdir().unwrap();
    let buf = Arc::new(BufferManager::new(10));

    let mut ages = create_index(&buf, dir.path(), "ages");
    let mut scores = create_index(&buf, dir.path(), "scores");

    for key in 0..50 {
        ages.insert(key, rid(key as u32 + 1)).unwrap();
        scores.insert(-key, rid(key as u32 + 1)).unwrap();
    }

    let age_hits = collect(&mut ages, 0, ScanOp::Gte, 9, ScanOp::Lte);
    assert_eq!(age_hits.len(), 10);

    let score_hits = collect(&mut scores, -9, ScanOp::Gte, 0, ScanOp::Lte);
    assert_eq!(score_hits.len(), 10);

    ages.close().unwrap();
    scores.close().unwrap();
    assert_eq!(buf.stats().pinned, 0);
}

#[test]
fn scans_survive_buffer_pressure() {
    let dir = tempdir().unwrap();
    // Deliberately tiny pool: the tree is far larger than four frames
    let buf = Arc::new(BufferManager::new(4));

    let mut index = create_index(&buf, dir.path(), "big");
    for key in 0..500 {
        index.insert(key, rid(key as u32 + 1)).unwrap();
    }

    let hits = collect(&mut index, 100, ScanOp::Gte, 399, ScanOp::Lte);
    assert_eq!(hits.len(), 300);
    assert_eq!(hits[0], rid(101));
    assert_eq!(hits[299], rid(400));

    index.close().unwrap();
}

#[test]
fn point_query_matches_only_under_inclusive_ops() {
    let dir = tempdir().unwrap();
    let buf = Arc::new(BufferManager::new(10));

    let mut index = create_index(&buf, dir.path(), "points");
    for key in [10, 20, 20, 20, 30] {
        index.insert(key, rid(key as u32)).unwrap();
    }

    assert_eq!(collect(&mut index, 20, ScanOp::Gte, 20, ScanOp::Lte).len(), 3);
    assert_eq!(collect(&mut index, 20, ScanOp::Gt, 20, ScanOp::Lte).len(), 0);
    assert_eq!(collect(&mut index, 20, ScanOp::Gte, 20, ScanOp::Lt).len(), 0);
    assert_eq!(collect(&mut index, 20, ScanOp::Gt, 20, ScanOp::Lt).len(), 0);

    index.close().unwrap();
}

#[test]
fn rebuild_from_reopened_heap() {
    let dir = tempdir().unwrap();
    let heap_path = dir.path().join("events.db");

    // Write the relation in one session
    {
        let buf = Arc::new(BufferManager::new(10));
        let heap = HeapFile::create(&heap_path, RECORD_LEN).unwrap();
        for key in 0..64 {
            heap.insert_record(&buf, &record(key * 3)).unwrap();
        }
        buf.flush_file(heap.file()).unwrap();
    }

    // Build the index from the reopened relation in another
    let buf = Arc::new(BufferManager::new(10));
    let heap = HeapFile::open(&heap_path, RECORD_LEN).unwrap();
    let config = small_config("events");
    let path = dir.path().join(config.file_name());
    let mut scan = FileScan::new(&heap, Arc::clone(&buf));
    let mut index = BTreeIndex::build(Arc::clone(&buf), &path, config, &mut scan).unwrap();
    drop(scan);

    let all = collect(&mut index, i32::MIN, ScanOp::Gte, i32::MAX, ScanOp::Lte);
    assert_eq!(all.len(), 64);

    // Every key is a multiple of three; spot-check a sub-range
    let hits = collect(&mut index, 30, ScanOp::Gte, 60, ScanOp::Lte);
    assert_eq!(hits.len(), 11);

    index.close().unwrap();
}
