use std::sync::Arc;
use std::time::Duration;

use dbcommon::PageId;
use dbstorage::Tablespace;
use tempfile::tempdir;

use super::*;

fn pool(dir: &tempfile::TempDir, name: &str, capacity: usize) -> BufferPool {
    let path = dir.path().join(format!("{name}.dat"));
    let tablespace = Tablespace::create(name, path, 4096, 8).unwrap();
    BufferPool::new(tablespace, capacity, false)
}

#[test]
fn pin_unpin_lifecycle_then_hit() {
    // S2
    let dir = tempdir().unwrap();
    let pool = pool(&dir, "T1", 2);
    let id = PageId::new("T1", 2);

    {
        let guard = pool.fetch_page(&id).unwrap().unwrap();
        guard.with_page(|page| assert_eq!(page.pin_count(), 1));
    }
    // guard dropped: unpinned.
    pool.fetch_page(&id).unwrap().unwrap();

    let stats = pool.statistics();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[test]
fn eviction_under_pressure_picks_fifo_victim() {
    // S3
    let dir = tempdir().unwrap();
    let pool = pool(&dir, "T1", 2);

    pool.fetch_page(&PageId::new("T1", 2)).unwrap();
    pool.fetch_page(&PageId::new("T1", 3)).unwrap();

    pool.fetch_page(&PageId::new("T1", 4)).unwrap();

    let stats = pool.statistics();
    assert_eq!(stats.evictions, 1);

    let before = pool.statistics().misses;
    pool.fetch_page(&PageId::new("T1", 2)).unwrap();
    assert_eq!(pool.statistics().misses, before + 1);
}

#[test]
fn dirty_eviction_flushes_before_removal() {
    // S4
    let dir = tempdir().unwrap();
    let pool = pool(&dir, "T1", 1);

    {
        let mut guard = pool.fetch_page(&PageId::new("T1", 2)).unwrap().unwrap();
        guard.mark_dirty();
    }
    assert_eq!(pool.dirty_page_count(), 1);

    pool.fetch_page(&PageId::new("T1", 3)).unwrap();

    assert_eq!(pool.dirty_page_count(), 0);
    assert!(pool.statistics().flushes >= 1);
}

#[test]
fn fetch_rejects_cross_tablespace_page_id() {
    let dir = tempdir().unwrap();
    let pool = pool(&dir, "T1", 2);
    let err = pool.fetch_page(&PageId::new("OTHER", 2)).unwrap_err();
    assert!(matches!(err, DbError::WrongTablespace { .. }));
}

#[test]
fn fetch_out_of_range_page_is_none() {
    let dir = tempdir().unwrap();
    let pool = pool(&dir, "T1", 2);
    assert!(pool.fetch_page(&PageId::new("T1", 999)).unwrap().is_none());
}

#[test]
fn allocate_page_pins_and_counts() {
    let dir = tempdir().unwrap();
    let pool = pool(&dir, "T1", 4);
    let guard = pool.allocate_page().unwrap();
    guard.with_page(|page| assert_eq!(page.pin_count(), 1));
    assert_eq!(pool.statistics().allocations, 1);
}

#[test]
fn flush_all_clears_dirty_accounting() {
    let dir = tempdir().unwrap();
    let pool = pool(&dir, "T1", 4);
    {
        let mut a = pool.fetch_page(&PageId::new("T1", 2)).unwrap().unwrap();
        a.mark_dirty();
    }
    {
        let mut b = pool.fetch_page(&PageId::new("T1", 3)).unwrap().unwrap();
        b.mark_dirty();
    }
    assert_eq!(pool.dirty_page_count(), 2);
    pool.flush_all().unwrap();
    assert_eq!(pool.dirty_page_count(), 0);
    for detail in pool.page_details() {
        assert!(!detail.is_dirty);
    }
}

#[test]
fn background_cleaner_triggers_within_bound() {
    // S8
    let dir = tempdir().unwrap();
    let pool = Arc::new(pool(&dir, "T1", 8));
    pool.start_cleaner(PageCleanerConfig {
        enabled: true,
        check_interval: Duration::from_millis(50),
        dirty_page_threshold: 2,
    });

    for page_number in [2u64, 3, 4] {
        let mut guard = pool.fetch_page(&PageId::new("T1", page_number)).unwrap().unwrap();
        guard.mark_dirty();
    }

    let deadline = std::time::Instant::now() + Duration::from_millis(500);
    while std::time::Instant::now() < deadline && pool.dirty_page_count() > 0 {
        std::thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(pool.dirty_page_count(), 0);
    let cleaner = pool.statistics().cleaner.expect("cleaner running");
    assert!(cleaner.total_cleanings >= 1);

    pool.stop_cleaner();
}

#[test]
fn unpin_on_non_resident_page_does_not_panic() {
    let dir = tempdir().unwrap();
    let pool = pool(&dir, "T1", 2);
    pool.unpin_page(&PageId::new("T1", 2), false).unwrap();
}

#[test]
fn pin_tracker_reports_a_leaked_pin() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("T1.dat");
    let tablespace = Tablespace::create("T1", path, 4096, 8).unwrap();
    let pool = BufferPool::new(tablespace, 4, true);

    let guard = pool.fetch_page(&PageId::new("T1", 2)).unwrap().unwrap();
    // Leak the pin: forget the guard instead of letting Drop unpin it, so
    // the tracker's acquisition record for page 2 is never popped.
    std::mem::forget(guard);

    let inner = pool.inner.lock().unwrap();
    let tracker = inner.pin_tracker.as_ref().expect("pin tracking enabled");
    let leaks = tracker.leaks_above(0);
    assert_eq!(leaks, vec![(2, 1)]);
    drop(inner);

    pool.shutdown().unwrap();
}
