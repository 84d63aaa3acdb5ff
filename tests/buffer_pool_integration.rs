//! End-to-end buffer pool scenarios against real files.

use relstore::{BufferManager, PageBuf, PagedFile, PageNo, StorageError};
use std::sync::Arc;
use tempfile::tempdir;

fn seed_pages(file: &Arc<PagedFile>, count: usize) -> Vec<PageNo> {
    (0..count)
        .map(|i| {
            let page_no = file.allocate_page().unwrap();
            let mut buf = PageBuf::new();
            buf[0] = i as u8 + 1;
            file.write_page(page_no, &buf).unwrap();
            page_no
        })
        .collect()
}

#[test]
fn eviction_under_pressure() {
    let dir = tempdir().unwrap();
    let file = Arc::new(PagedFile::open(dir.path().join("data.db"), true).unwrap());
    let buf = BufferManager::new(3);

    let pages = seed_pages(&file, 4);

    // Pin three pages; the pool is now saturated
    let held: Vec<_> = pages[..3]
        .iter()
        .map(|&p| buf.read_page(&file, p).unwrap())
        .collect();

    assert!(matches!(
        buf.read_page(&file, pages[3]),
        Err(StorageError::BufferExceeded { frames: 3 })
    ));

    // Releasing one page makes room and it is the one evicted
    drop(held);
    buf.unpin_page(&file, pages[0], false).unwrap();
    let page = buf.read_page(&file, pages[3]).unwrap();
    assert_eq!(page.read()[0], 4);
    assert!(!buf.contains(&file, pages[0]));

    buf.unpin_page(&file, pages[3], false).unwrap();
    buf.unpin_page(&file, pages[1], false).unwrap();
    buf.unpin_page(&file, pages[2], false).unwrap();
}

#[test]
fn dirty_eviction_reaches_disk() {
    let dir = tempdir().unwrap();
    let file = Arc::new(PagedFile::open(dir.path().join("data.db"), true).unwrap());
    let buf = BufferManager::new(2);

    let pages = seed_pages(&file, 3);

    let page = buf.read_page(&file, pages[0]).unwrap();
    page.write()[100] = 0xEE;
    drop(page);
    buf.unpin_page(&file, pages[0], true).unwrap();

    // Cycle enough pages through the 2-frame pool to force the eviction
    for &p in &pages[1..] {
        let r = buf.read_page(&file, p).unwrap();
        drop(r);
        buf.unpin_page(&file, p, false).unwrap();
    }
    assert!(!buf.contains(&file, pages[0]));

    // The store has the modified byte even though we never flushed
    let mut direct = PageBuf::new();
    file.read_page(pages[0], &mut direct).unwrap();
    assert_eq!(direct[100], 0xEE);
}

#[test]
fn dirty_flush_round_trip() {
    let dir = tempdir().unwrap();
    let file = Arc::new(PagedFile::open(dir.path().join("data.db"), true).unwrap());
    let buf = BufferManager::new(10);

    let (page_no, page) = buf.alloc_page(&file).unwrap();
    page.write()[0..4].copy_from_slice(b"abcd");
    drop(page);
    buf.unpin_page(&file, page_no, true).unwrap();

    buf.flush_file(&file).unwrap();
    assert_eq!(buf.stats().valid, 0);

    // Reopen through the pool and observe the bytes
    let page = buf.read_page(&file, page_no).unwrap();
    assert_eq!(&page.read()[0..4], b"abcd");
    drop(page);
    buf.unpin_page(&file, page_no, false).unwrap();
}

#[test]
fn pool_is_shared_across_files() {
    let dir = tempdir().unwrap();
    let a = Arc::new(PagedFile::open(dir.path().join("a.db"), true).unwrap());
    let b = Arc::new(PagedFile::open(dir.path().join("b.db"), true).unwrap());
    let buf = BufferManager::new(4);

    let (pa, ra) = buf.alloc_page(&a).unwrap();
    ra.write()[0] = 0xAA;
    drop(ra);
    buf.unpin_page(&a, pa, true).unwrap();

    let (pb, rb) = buf.alloc_page(&b).unwrap();
    rb.write()[0] = 0xBB;
    drop(rb);
    buf.unpin_page(&b, pb, true).unwrap();

    // Same page number, distinct files, distinct contents
    assert_eq!(pa, pb);
    let ra = buf.read_page(&a, pa).unwrap();
    let rb = buf.read_page(&b, pb).unwrap();
    assert_eq!(ra.read()[0], 0xAA);
    assert_eq!(rb.read()[0], 0xBB);
    drop((ra, rb));
    buf.unpin_page(&a, pa, false).unwrap();
    buf.unpin_page(&b, pb, false).unwrap();

    // Flushing one file leaves the other resident
    buf.flush_file(&a).unwrap();
    assert!(!buf.contains(&a, pa));
    assert!(buf.contains(&b, pb));
}

#[test]
fn unpinned_clean_page_is_a_pure_hit() {
    let dir = tempdir().unwrap();
    let file = Arc::new(PagedFile::open(dir.path().join("data.db"), true).unwrap());
    let buf = BufferManager::new(4);

    let pages = seed_pages(&file, 1);
    let page = buf.read_page(&file, pages[0]).unwrap();
    drop(page);
    buf.unpin_page(&file, pages[0], false).unwrap();

    // Scribble on the disk copy behind the pool's back; a hit must not
    // re-read it
    let mut direct = PageBuf::new();
    direct[0] = 0x77;
    file.write_page(pages[0], &direct).unwrap();

    let page = buf.read_page(&file, pages[0]).unwrap();
    assert_eq!(page.read()[0], 1);
    drop(page);
    buf.unpin_page(&file, pages[0], false).unwrap();
}

#[test]
fn stats_track_frame_states() {
    let dir = tempdir().unwrap();
    let file = Arc::new(PagedFile::open(dir.path().join("data.db"), true).unwrap());
    let buf = BufferManager::new(5);

    let pages = seed_pages(&file, 3);
    for (i, &p) in pages.iter().enumerate() {
        let r = buf.read_page(&file, p).unwrap();
        drop(r);
        if i == 0 {
            buf.unpin_page(&file, p, true).unwrap();
        }
    }

    let stats = buf.stats();
    assert_eq!(stats.frames, 5);
    assert_eq!(stats.valid, 3);
    assert_eq!(stats.dirty, 1);
    assert_eq!(stats.pinned, 2);
}
