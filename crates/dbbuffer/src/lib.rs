//! Buffer pool manager for page-level caching and I/O.
//!
//! One [`BufferPool`] guards a single [`Tablespace`]. State is kept behind a
//! single `Mutex` — every operation locks, does its work, and unlocks, which
//! keeps the pool's invariants (pin counts, dirty accounting, replacement
//! order) trivially consistent at the cost of serializing all access to one
//! tablespace at a time. Multiple tablespaces get independent pools and run
//! fully in parallel.
//!
//! Eviction is FIFO over an admission queue, with a hit moving a page to the
//! tail — approximately LRU for hits, strict FIFO for pages that are never
//! re-fetched.

#[cfg(test)]
mod tests;

use std::backtrace::Backtrace;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use dbcommon::{DbError, DbResult, PageId};
use dbstorage::{Page, Tablespace};

/// Kind of page-level event an instrumented [`BufferPool`] can emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageEventKind {
    PageRead,
    PageWrite,
    PagePin,
    PageUnpin,
    PageDirty,
    PageAllocate,
    BufferFlush,
}

/// A single observable page-level event. Delivery is fire-and-forget: the
/// observer callback is infallible and has no acknowledgement channel.
#[derive(Clone, Debug)]
pub struct PageEvent {
    pub tablespace: String,
    pub page_number: u64,
    pub kind: PageEventKind,
    pub description: String,
}

type Observer = Arc<dyn Fn(PageEvent) + Send + Sync>;

/// Point-in-time counters and occupancy for a pool, as surfaced to the
/// visualization collaborator.
#[derive(Clone, Debug)]
pub struct BufferPoolStatistics {
    pub capacity: usize,
    pub size: usize,
    pub usage_percentage: f64,
    pub dirty_pages: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub evictions: u64,
    pub allocations: u64,
    pub flushes: u64,
    pub cleaner: Option<CleanerSnapshot>,
}

/// Per-page occupancy detail, as surfaced to the visualization collaborator.
#[derive(Clone, Debug)]
pub struct PageDetail {
    pub page_number: u64,
    pub pin_count: u32,
    pub is_dirty: bool,
    pub size: usize,
}

/// Debug-only record of who holds a pin, for leak diagnosis at shutdown.
/// Only populated when `StorageConfig::pin_tracking_enabled` is set.
struct PinTracker {
    acquisitions: HashMap<u64, Vec<Backtrace>>,
}

impl PinTracker {
    fn new() -> Self {
        Self {
            acquisitions: HashMap::new(),
        }
    }

    fn record_pin(&mut self, page_number: u64) {
        self.acquisitions
            .entry(page_number)
            .or_default()
            .push(Backtrace::capture());
    }

    fn record_unpin(&mut self, page_number: u64) {
        if let Some(stack) = self.acquisitions.get_mut(&page_number) {
            stack.pop();
            if stack.is_empty() {
                self.acquisitions.remove(&page_number);
            }
        }
    }

    /// Pages still tracked as pinned above `threshold` acquisitions deep.
    fn leaks_above(&self, threshold: usize) -> Vec<(u64, usize)> {
        self.acquisitions
            .iter()
            .filter(|(_, stack)| stack.len() > threshold)
            .map(|(&page_number, stack)| (page_number, stack.len()))
            .collect()
    }
}

struct Inner {
    tablespace: Tablespace,
    capacity: usize,
    page_table: HashMap<u64, Page>,
    replacement_queue: VecDeque<u64>,
    dirty_count: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    allocations: u64,
    flushes: u64,
    observer: Option<Observer>,
    pin_tracker: Option<PinTracker>,
}

impl Inner {
    fn emit(&self, page_number: u64, kind: PageEventKind, description: impl Into<String>) {
        if let Some(observer) = &self.observer {
            observer(PageEvent {
                tablespace: self.tablespace.name().to_string(),
                page_number,
                kind,
                description: description.into(),
            });
        }
    }

    fn touch(&mut self, page_number: u64) {
        if let Some(pos) = self.replacement_queue.iter().position(|&p| p == page_number) {
            self.replacement_queue.remove(pos);
        }
        debug_assert!(!self.replacement_queue.contains(&page_number));
        self.replacement_queue.push_back(page_number);
    }

    /// Walks the replacement queue for the first unpinned page. If every
    /// resident page is pinned, logs a warning and leaves the pool over
    /// capacity rather than failing the caller (see `SPEC_FULL.md` §9,
    /// Open Question 4).
    fn evict_one(&mut self) -> DbResult<()> {
        let victim_pos = self.replacement_queue.iter().position(|&page_number| {
            self.page_table
                .get(&page_number)
                .map(|page| page.pin_count() == 0)
                .unwrap_or(false)
        });

        let Some(pos) = victim_pos else {
            eprintln!(
                "dbbuffer: all {} resident pages in tablespace '{}' are pinned; skipping eviction",
                self.page_table.len(),
                self.tablespace.name()
            );
            return Ok(());
        };

        let page_number = self.replacement_queue.remove(pos).unwrap();
        if let Some(page) = self.page_table.get(&page_number) {
            if page.is_dirty() {
                self.tablespace.write_page(page)?;
                self.emit(page_number, PageEventKind::PageWrite, "flushed before eviction");
                self.dirty_count = self.dirty_count.saturating_sub(1);
            }
        }
        self.page_table.remove(&page_number);
        self.evictions += 1;
        Ok(())
    }

    fn flush_page_locked(&mut self, page_number: u64) -> DbResult<bool> {
        let is_dirty = self
            .page_table
            .get(&page_number)
            .map(|page| page.is_dirty())
            .unwrap_or(false);
        if !is_dirty {
            return Ok(false);
        }
        self.tablespace.write_page(self.page_table.get(&page_number).unwrap())?;
        self.page_table.get_mut(&page_number).unwrap().mark_clean();
        self.dirty_count = self.dirty_count.saturating_sub(1);
        self.flushes += 1;
        self.emit(page_number, PageEventKind::PageWrite, "flushed");
        Ok(true)
    }

    fn flush_all_locked(&mut self) -> DbResult<usize> {
        let dirty_page_numbers: Vec<u64> = self
            .page_table
            .iter()
            .filter(|(_, page)| page.is_dirty())
            .map(|(&page_number, _)| page_number)
            .collect();

        let mut flushed = 0;
        for page_number in dirty_page_numbers {
            if self.flush_page_locked(page_number)? {
                flushed += 1;
            }
        }
        if flushed > 0 {
            self.emit(0, PageEventKind::BufferFlush, format!("flushed {flushed} dirty page(s)"));
        }
        Ok(flushed)
    }
}

/// Config for the background [`PageCleaner`] bound to one pool.
#[derive(Clone, Copy, Debug)]
pub struct PageCleanerConfig {
    pub enabled: bool,
    pub check_interval: Duration,
    pub dirty_page_threshold: usize,
}

impl Default for PageCleanerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval: Duration::from_millis(5000),
            dirty_page_threshold: 10,
        }
    }
}

/// Cumulative stats for a pool's background cleaner, if one is running.
#[derive(Clone, Debug, Default)]
pub struct CleanerSnapshot {
    pub total_cleanings: u64,
    pub last_clean_time: Option<Instant>,
}

struct CleanerHandle {
    stop: Arc<(Mutex<bool>, Condvar)>,
    stats: Arc<Mutex<CleanerSnapshot>>,
    thread: Option<JoinHandle<()>>,
}

/// A tablespace's resident-page cache: pin/unpin bookkeeping, FIFO-with-touch
/// eviction, dirty tracking, and an optional background cleaner.
pub struct BufferPool {
    tablespace_name: String,
    inner: Mutex<Inner>,
    cleaner: Mutex<Option<CleanerHandle>>,
}

impl BufferPool {
    pub fn new(tablespace: Tablespace, capacity: usize, pin_tracking_enabled: bool) -> Self {
        let tablespace_name = tablespace.name().to_string();
        Self {
            tablespace_name,
            inner: Mutex::new(Inner {
                tablespace,
                capacity,
                page_table: HashMap::new(),
                replacement_queue: VecDeque::new(),
                dirty_count: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
                allocations: 0,
                flushes: 0,
                observer: None,
                pin_tracker: pin_tracking_enabled.then(PinTracker::new),
            }),
            cleaner: Mutex::new(None),
        }
    }

    pub fn tablespace_name(&self) -> &str {
        &self.tablespace_name
    }

    pub fn set_observer(&self, observer: Observer) {
        self.inner.lock().unwrap().observer = Some(observer);
    }

    fn check_tablespace(&self, id: &PageId) -> DbResult<()> {
        if id.tablespace != self.tablespace_name {
            return Err(DbError::WrongTablespace {
                expected: self.tablespace_name.clone(),
                actual: id.tablespace.clone(),
                page_number: id.page_number,
            });
        }
        Ok(())
    }

    /// Fetches `id`, pinning it. `None` means the page is out of range for
    /// the tablespace's current size (never allocated).
    pub fn fetch_page(&self, id: &PageId) -> DbResult<Option<PageGuard<'_>>> {
        self.check_tablespace(id)?;
        let page_number = id.page_number;
        let mut inner = self.inner.lock().unwrap();

        if inner.page_table.contains_key(&page_number) {
            inner.touch(page_number);
            inner.hits += 1;
            let page = inner.page_table.get_mut(&page_number).unwrap();
            page.pin();
            if let Some(tracker) = &mut inner.pin_tracker {
                tracker.record_pin(page_number);
            }
            inner.emit(page_number, PageEventKind::PageRead, "cache hit");
            inner.emit(page_number, PageEventKind::PagePin, "pin");
            return Ok(Some(PageGuard::new(self, page_number)));
        }

        inner.misses += 1;
        let Some(mut page) = inner.tablespace.read_page(id)? else {
            return Ok(None);
        };

        if inner.page_table.len() >= inner.capacity {
            inner.evict_one()?;
        }
        page.pin();
        if let Some(tracker) = &mut inner.pin_tracker {
            tracker.record_pin(page_number);
        }
        inner.page_table.insert(page_number, page);
        debug_assert!(!inner.replacement_queue.contains(&page_number));
        inner.replacement_queue.push_back(page_number);
        inner.emit(page_number, PageEventKind::PageRead, "loaded from disk");
        inner.emit(page_number, PageEventKind::PagePin, "pin");
        Ok(Some(PageGuard::new(self, page_number)))
    }

    /// Allocates a fresh page through the tablespace, admitting it pinned.
    pub fn allocate_page(&self) -> DbResult<PageGuard<'_>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.page_table.len() >= inner.capacity {
            inner.evict_one()?;
        }
        let mut page = inner.tablespace.allocate_page()?;
        let page_number = page.page_id().page_number;
        page.pin();
        if let Some(tracker) = &mut inner.pin_tracker {
            tracker.record_pin(page_number);
        }
        inner.page_table.insert(page_number, page);
        debug_assert!(!inner.replacement_queue.contains(&page_number));
        inner.replacement_queue.push_back(page_number);
        inner.allocations += 1;
        inner.emit(page_number, PageEventKind::PageAllocate, "allocated");
        Ok(PageGuard::new(self, page_number))
    }

    fn unpin_page_internal(&self, page_number: u64, is_dirty: bool) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(tracker) = &mut inner.pin_tracker {
            tracker.record_unpin(page_number);
        }
        let Some(page) = inner.page_table.get_mut(&page_number) else {
            eprintln!("dbbuffer: unpin_page called for non-resident page {page_number}");
            return;
        };
        if is_dirty {
            let was_clean = !page.is_dirty();
            page.mark_dirty();
            if was_clean {
                inner.dirty_count += 1;
                inner.emit(page_number, PageEventKind::PageDirty, "marked dirty");
            }
        }
        inner.page_table.get_mut(&page_number).unwrap().unpin();
        inner.emit(page_number, PageEventKind::PageUnpin, "unpin");
    }

    /// Explicit unpin, for callers not going through a [`PageGuard`]. Warns
    /// and no-ops if `id` is not resident.
    pub fn unpin_page(&self, id: &PageId, is_dirty: bool) -> DbResult<()> {
        self.check_tablespace(id)?;
        self.unpin_page_internal(id.page_number, is_dirty);
        Ok(())
    }

    pub fn flush_page(&self, id: &PageId) -> DbResult<bool> {
        self.check_tablespace(id)?;
        self.inner.lock().unwrap().flush_page_locked(id.page_number)
    }

    pub fn flush_all(&self) -> DbResult<usize> {
        self.inner.lock().unwrap().flush_all_locked()
    }

    pub fn dirty_page_count(&self) -> usize {
        self.inner.lock().unwrap().dirty_count
    }

    /// Total pages currently allocated in the underlying tablespace,
    /// including ones not resident in this pool.
    pub fn total_pages(&self) -> DbResult<u64> {
        self.inner.lock().unwrap().tablespace.total_pages()
    }

    pub fn statistics(&self) -> BufferPoolStatistics {
        let inner = self.inner.lock().unwrap();
        let size = inner.page_table.len();
        let total = inner.hits + inner.misses;
        let cleaner = self
            .cleaner
            .lock()
            .unwrap()
            .as_ref()
            .map(|c| c.stats.lock().unwrap().clone());
        BufferPoolStatistics {
            capacity: inner.capacity,
            size,
            usage_percentage: if inner.capacity == 0 {
                0.0
            } else {
                size as f64 / inner.capacity as f64 * 100.0
            },
            dirty_pages: inner.dirty_count,
            hits: inner.hits,
            misses: inner.misses,
            hit_ratio: if total == 0 { 0.0 } else { inner.hits as f64 / total as f64 },
            evictions: inner.evictions,
            allocations: inner.allocations,
            flushes: inner.flushes,
            cleaner,
        }
    }

    pub fn page_details(&self) -> Vec<PageDetail> {
        let inner = self.inner.lock().unwrap();
        inner
            .page_table
            .values()
            .map(|page| PageDetail {
                page_number: page.page_id().page_number,
                pin_count: page.pin_count(),
                is_dirty: page.is_dirty(),
                size: page.page_size(),
            })
            .collect()
    }

    /// Starts the background cleaner. A no-op if one is already running or
    /// `config.enabled` is false.
    pub fn start_cleaner(self: &Arc<Self>, config: PageCleanerConfig) {
        if !config.enabled {
            return;
        }
        let mut guard = self.cleaner.lock().unwrap();
        if guard.is_some() {
            return;
        }

        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let stats = Arc::new(Mutex::new(CleanerSnapshot::default()));
        let pool = Arc::clone(self);
        let stop_thread = Arc::clone(&stop);
        let stats_thread = Arc::clone(&stats);

        let thread = thread::spawn(move || {
            let (lock, cvar) = &*stop_thread;
            loop {
                let guard = lock.lock().unwrap();
                let (guard, _timeout) = cvar.wait_timeout(guard, config.check_interval).unwrap();
                if *guard {
                    break;
                }
                drop(guard);

                if pool.dirty_page_count() >= config.dirty_page_threshold {
                    match pool.flush_all() {
                        Ok(_) => {
                            let mut stats = stats_thread.lock().unwrap();
                            stats.total_cleanings += 1;
                            stats.last_clean_time = Some(Instant::now());
                        }
                        Err(e) => eprintln!("dbbuffer: page cleaner flush failed: {e}"),
                    }
                }
            }
        });

        *guard = Some(CleanerHandle {
            stop,
            stats,
            thread: Some(thread),
        });
    }

    /// Signals the cleaner to stop and joins it, capped at one second.
    /// Cooperative: the condition variable interrupts the sleep
    /// immediately, so the join ordinarily returns well within the bound.
    /// `JoinHandle::join` has no timeout of its own, so the join itself
    /// runs on a short-lived supervisor thread and we wait on that
    /// thread's completion signal instead — if the cleaner is wedged
    /// (e.g. stuck in a flush), we give up waiting and move on rather
    /// than block shutdown forever.
    pub fn stop_cleaner(&self) {
        let mut guard = self.cleaner.lock().unwrap();
        let Some(mut cleaner) = guard.take() else {
            return;
        };
        {
            let (lock, cvar) = &*cleaner.stop;
            *lock.lock().unwrap() = true;
            cvar.notify_all();
        }
        if let Some(thread) = cleaner.thread.take() {
            let (tx, rx) = std::sync::mpsc::channel();
            thread::spawn(move || {
                let _ = thread.join();
                let _ = tx.send(());
            });
            if rx.recv_timeout(Duration::from_secs(1)).is_err() {
                eprintln!("dbbuffer: page cleaner did not stop within 1s; abandoning join");
            }
        }
    }

    /// Stops the cleaner, flushes every dirty page, and clears the pool.
    /// Reports (via `eprintln!`) any page still pinned above the pin
    /// tracker's implicit threshold of zero, if tracking is enabled.
    pub fn shutdown(&self) -> DbResult<()> {
        self.stop_cleaner();
        let mut inner = self.inner.lock().unwrap();
        inner.flush_all_locked()?;
        if let Some(tracker) = &inner.pin_tracker {
            for (page_number, depth) in tracker.leaks_above(0) {
                eprintln!(
                    "dbbuffer: page {page_number} in tablespace '{}' still held {depth} pin(s) at shutdown",
                    inner.tablespace.name()
                );
            }
        }
        inner.page_table.clear();
        inner.replacement_queue.clear();
        Ok(())
    }
}

/// RAII pin guard returned by [`BufferPool::fetch_page`] and
/// [`BufferPool::allocate_page`]. Unpins on drop — including on panic
/// unwind — so a pin can only leak via an explicit `std::mem::forget`.
pub struct PageGuard<'a> {
    pool: &'a BufferPool,
    page_number: u64,
    dirty: bool,
}

impl<'a> PageGuard<'a> {
    fn new(pool: &'a BufferPool, page_number: u64) -> Self {
        Self {
            pool,
            page_number,
            dirty: false,
        }
    }

    pub fn page_number(&self) -> u64 {
        self.page_number
    }

    /// Marks this guard to unpin with the dirty flag set when dropped.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn with_page<R>(&self, f: impl FnOnce(&Page) -> R) -> R {
        let inner = self.pool.inner.lock().unwrap();
        f(inner
            .page_table
            .get(&self.page_number)
            .expect("page resident while guard is alive"))
    }

    pub fn with_page_mut<R>(&mut self, f: impl FnOnce(&mut Page) -> R) -> R {
        let mut inner = self.pool.inner.lock().unwrap();
        let result = f(inner
            .page_table
            .get_mut(&self.page_number)
            .expect("page resident while guard is alive"));
        self.dirty = self.dirty
            || inner
                .page_table
                .get(&self.page_number)
                .map(|p| p.is_dirty())
                .unwrap_or(false);
        result
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.pool.unpin_page_internal(self.page_number, self.dirty);
    }
}
