//! C2 PageCache — a bounded, clock-style LRU of `Page` buffers sitting on
//! top of one `PagedFile`. Grounded in spirit on the
//! teacher's `BufferPool` (`small-db::btree::buffer_pool::BufferPool`), which
//! keeps a `HashMap<pageId, Page>` behind a single lock and evicts on a
//! configured capacity; generalized here to the fix/unfix, dirty-retention,
//! and scoped-pin discipline spec.md §4.2/§5 spell out.
//!
//! Each cached page is its own `Pod<Page>` (the teacher's
//! `Arc<RwLock<T>>` alias from `types.rs`), not a single lock over the
//! whole map: structural algorithms like `concatenate` need two sibling
//! pages mutably at once, which a single cache-wide lock can't grant to
//! one caller twice. The map itself (`Inner`) lives behind its own
//! `Mutex` so `PageCache` is `Send + Sync` the way the teacher's
//! `BufferPool` is, ready for the host to serialize whole operations
//! behind one latch per open file.
//!
//! A `PageCache` is owned by exactly one `BtreeFile` and is never shared
//! (spec.md §5 "Shared resource policy"); within that scope it hands out
//! `PageFix` handles that behave like the C++ original's scoped pin: the
//! handle's `Drop` unfixes, choosing Dirty or NotDirty unfix the way the
//! original's destructor does, so unwinding through a partially built
//! operation can never leak a pin (spec.md §9 "Exceptions thrown from
//! mid-descent").

use std::collections::HashMap;
use std::sync::{Mutex, RwLockReadGuard, RwLockWriteGuard};

use crate::codec::compare::Compare;
use crate::error::Result;
use crate::page::{peek_is_leaf, Page};
use crate::paged_file::PagedFile;
use crate::physical::{FixMode, PhysicalFile};
use crate::types::{PageId, Pod};

struct Slot {
    page: Pod<Page>,
    pin: u32,
    dirty: bool,
    fix_mode: FixMode,
    /// Clock-style second-chance counter; bumped on every hit, decremented
    /// by the evictor before it is willing to reclaim an idle, clean slot
    /// (spec.md §4.2: "decrementing each handle's attach counter and
    /// evicting any whose counter reaches zero while idle and clean").
    attach_count: u32,
    free_on_unfix: bool,
}

struct Inner<PF: PhysicalFile> {
    paged_file: PagedFile<PF>,
    handles: HashMap<PageId, Slot>,
    /// Pages `free`'d but not yet reclaimed by `flush_all`.
    freed: Vec<PageId>,
    cache_count: usize,
    current_cache_count: usize,
    /// Value width, in bytes, of a leaf entry's trailing field: 4 for a
    /// row id, 6 for a bitmap `ObjectId`.
    leaf_value_width: usize,
    /// Value width of a node entry's trailing field: always a 4-byte
    /// child `PageId`.
    node_value_width: usize,
}

pub struct PageCache<PF: PhysicalFile> {
    inner: Mutex<Inner<PF>>,
}

fn lock_poisoned() -> crate::error::Error {
    crate::error::Error::NotSupported("page cache lock poisoned by an earlier panic".into())
}

impl<PF: PhysicalFile> PageCache<PF> {
    pub fn new(
        paged_file: PagedFile<PF>,
        cache_count: usize,
        leaf_value_width: usize,
        node_value_width: usize,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                paged_file,
                handles: HashMap::new(),
                freed: Vec::new(),
                cache_count,
                current_cache_count: 0,
                leaf_value_width,
                node_value_width,
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner<PF>>> {
        self.inner.lock().map_err(|_| lock_poisoned())
    }

    /// Reads page `pid`'s bytes straight from the backing file, bypassing
    /// the cache. Used only for the HeaderPage, which is small, always
    /// singleton, and tracks its own dirty flag.
    pub fn read_raw(&self, pid: PageId) -> Result<Vec<u8>> {
        let inner = self.lock()?;
        inner.paged_file.attach_page(pid, None).map(|(bytes, _)| bytes)
    }

    pub fn write_raw(&self, pid: PageId, bytes: &[u8]) -> Result<()> {
        self.lock()?.paged_file.write_back(pid, bytes)
    }

    pub fn page_size(&self) -> usize {
        self.lock().expect("page cache lock poisoned").paged_file.page_size()
    }

    pub fn create(&self) -> Result<()> {
        self.lock()?.paged_file.create()
    }

    pub fn destroy(&self) -> Result<()> {
        self.lock()?.paged_file.destroy()
    }

    pub fn mount(&self) -> Result<()> {
        self.lock()?.paged_file.mount()
    }

    pub fn unmount(&self) -> Result<()> {
        self.lock()?.paged_file.unmount()
    }

    pub fn open(&self, mode: crate::physical::OpenMode) -> Result<()> {
        self.lock()?.paged_file.open(mode);
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        self.lock()?.paged_file.close();
        Ok(())
    }

    /// "startBackup / endBackup / recover(timestamp) /
    /// restore(timestamp): pass-through to the underlying file."
    pub fn start_backup(&self, restorable: bool) -> Result<()> {
        self.lock()?.paged_file.start_backup(restorable)
    }

    pub fn end_backup(&self) -> Result<()> {
        self.lock()?.paged_file.end_backup()
    }

    pub fn recover(&self, timestamp: u64) -> Result<()> {
        self.lock()?.paged_file.recover(timestamp)
    }

    pub fn restore(&self, timestamp: u64) -> Result<()> {
        self.lock()?.paged_file.restore(timestamp)
    }

    /// "allocatePage: returns a new physical page fixed at
    /// the current mode", wired straight into a fresh, dirty cache slot.
    pub fn allocate(&self, is_leaf: bool) -> Result<PageFix<'_, PF>> {
        let mut inner = self.lock()?;
        let (pid, mode) = inner.paged_file.allocate_page()?;
        let page_size = inner.paged_file.page_size();
        let value_width = if is_leaf {
            inner.leaf_value_width
        } else {
            inner.node_value_width
        };
        let page = Page::empty(pid, page_size, is_leaf, value_width);
        let cell: Pod<Page> = std::sync::Arc::new(std::sync::RwLock::new(page));
        inner.handles.insert(
            pid,
            Slot {
                page: cell.clone(),
                pin: 1,
                dirty: true,
                fix_mode: mode,
                attach_count: 1,
                free_on_unfix: false,
            },
        );
        drop(inner);
        Ok(PageFix {
            cache: self,
            pid,
            dirty: true,
            cell,
        })
    }

    /// "attach(id, mode): if map hit, increment a per-handle
    /// attach counter...; if miss, ask PagedFile.attachPage."
    pub fn fix(
        &self,
        pid: PageId,
        mode: Option<FixMode>,
        compare: &Compare,
    ) -> Result<PageFix<'_, PF>> {
        let mut inner = self.lock()?;
        if let Some(slot) = inner.handles.get_mut(&pid) {
            let was_idle = slot.pin == 0;
            slot.pin += 1;
            slot.attach_count += 1;
            let cell = slot.page.clone();
            if was_idle {
                inner.current_cache_count -= 1;
            }
            drop(inner);
            return Ok(PageFix {
                cache: self,
                pid,
                dirty: false,
                cell,
            });
        }

        let (bytes, fix_mode) = inner.paged_file.attach_page(pid, mode)?;
        let value_width = if peek_is_leaf(&bytes) {
            inner.leaf_value_width
        } else {
            inner.node_value_width
        };
        let sizer = |buf: &[u8]| compare.key_size(buf);
        let page = Page::load(pid, bytes, value_width, &sizer)?;
        let cell: Pod<Page> = std::sync::Arc::new(std::sync::RwLock::new(page));
        inner.handles.insert(
            pid,
            Slot {
                page: cell.clone(),
                pin: 1,
                dirty: false,
                fix_mode,
                attach_count: 1,
                free_on_unfix: false,
            },
        );
        drop(inner);
        Ok(PageFix {
            cache: self,
            pid,
            dirty: false,
            cell,
        })
    }

    /// "freePage(page): schedules the page for release at
    /// next flush." Consumes the handle; the underlying slot is dropped
    /// from the map as soon as its pin count reaches zero.
    pub fn free(&self, mut fix: PageFix<'_, PF>) -> Result<()> {
        {
            let mut inner = self.lock()?;
            if let Some(slot) = inner.handles.get_mut(&fix.pid) {
                slot.free_on_unfix = true;
            }
        }
        fix.dirty = false;
        Ok(())
    }

    fn detach_internal(&self, pid: PageId, dirty: bool) {
        let mut inner = match self.lock() {
            Ok(inner) => inner,
            // unfixing during unwind from an already-poisoned lock: nothing
            // left to do safely.
            Err(_) => return,
        };
        let mut check_eviction = false;
        let mut remove_and_free = false;
        if let Some(slot) = inner.handles.get_mut(&pid) {
            slot.pin = slot.pin.saturating_sub(1);
            if dirty {
                slot.dirty = true;
            }
            if slot.pin == 0 {
                if slot.free_on_unfix {
                    remove_and_free = true;
                } else {
                    inner.current_cache_count += 1;
                    check_eviction = true;
                }
            }
        }
        if remove_and_free {
            inner.handles.remove(&pid);
            inner.freed.push(pid);
        }
        if check_eviction {
            Self::evict_if_needed(&mut inner);
        }
    }

    /// Clock-style second-chance eviction: reclaim an idle, clean slot
    /// whose `attach_count` has decayed to zero; otherwise give every idle
    /// clean slot one more decrement and try again.
    fn evict_if_needed(inner: &mut Inner<PF>) {
        while inner.current_cache_count > inner.cache_count {
            let victim = inner
                .handles
                .iter()
                .find(|(_, s)| s.pin == 0 && !s.dirty && s.attach_count == 0)
                .map(|(pid, _)| *pid);
            match victim {
                Some(pid) => {
                    inner.handles.remove(&pid);
                    inner.current_cache_count -= 1;
                }
                None => {
                    let mut progressed = false;
                    for slot in inner.handles.values_mut() {
                        if slot.pin == 0 && !slot.dirty && slot.attach_count > 0 {
                            slot.attach_count -= 1;
                            progressed = true;
                        }
                    }
                    if !progressed {
                        break;
                    }
                }
            }
        }
    }

    /// "flushAll: for every freed handle, call
    /// PhysicalFile.freePage2 then recycle; for every dirty handle, detach
    /// with Dirty; clear map; call PhysicalFile.detachPageAll."
    pub fn flush_all(&self) -> Result<()> {
        let mut inner = self.lock()?;
        let freed: Vec<PageId> = std::mem::take(&mut inner.freed);
        for pid in freed {
            inner.paged_file.free_page(pid)?;
        }
        let dirty: Vec<(PageId, Vec<u8>)> = inner
            .handles
            .iter()
            .filter(|(_, s)| s.dirty)
            .map(|(pid, s)| {
                let bytes = s.page.read().expect("page lock poisoned").serialize();
                (*pid, bytes)
            })
            .collect();
        for (pid, bytes) in dirty {
            inner.paged_file.write_back(pid, &bytes)?;
        }
        inner.handles.clear();
        inner.current_cache_count = 0;
        inner.paged_file.flush()
    }

    /// "recoverAll: symmetric — discards dirty changes if
    /// fix mode includes Discardable; otherwise falls through to
    /// flushAll."
    pub fn recover_all(&self) -> Result<()> {
        let all_discardable = {
            let inner = self.lock()?;
            !inner.handles.is_empty()
                && inner.handles.values().all(|s| s.fix_mode.is_discardable())
        };
        if all_discardable {
            let mut inner = self.lock()?;
            inner.handles.clear();
            inner.freed.clear();
            inner.current_cache_count = 0;
            Ok(())
        } else {
            self.flush_all()
        }
    }
}

/// A scoped pin on one cached page. Dropping it unfixes: Dirty if the
/// handle (or anything touching `page_mut`) ever marked it so, NotDirty
/// otherwise — spec.md §3.5 "after unfix with dirty=true, the
/// PhysicalFile must eventually observe a dirty unfix."
pub struct PageFix<'c, PF: PhysicalFile> {
    cache: &'c PageCache<PF>,
    pid: PageId,
    dirty: bool,
    cell: Pod<Page>,
}

impl<'c, PF: PhysicalFile> PageFix<'c, PF> {
    pub fn pid(&self) -> PageId {
        self.pid
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// An aborted mutation (e.g. a uniqueness violation discovered after
    /// the page was already pinned writable) must unfix NotDirty so the
    /// byte image stays untouched (spec.md §8 "Compare returning 0 on
    /// insert... leaves the tree byte-identical").
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn page(&self) -> RwLockReadGuard<'_, Page> {
        self.cell.read().expect("page lock poisoned")
    }

    pub fn page_mut(&mut self) -> RwLockWriteGuard<'_, Page> {
        self.dirty = true;
        self.cell.write().expect("page lock poisoned")
    }
}

impl<'c, PF: PhysicalFile> Drop for PageFix<'c, PF> {
    fn drop(&mut self) {
        self.cache.detach_internal(self.pid, self.dirty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::value::LeafType;
    use crate::physical::{FilePhysicalFile, OpenMode};
    use tempfile::tempdir;

    fn open_cache(dir: &std::path::Path, cache_count: usize) -> PageCache<FilePhysicalFile> {
        let physical = FilePhysicalFile::new(dir, 256);
        let mut paged_file = PagedFile::new(physical);
        paged_file.create().unwrap();
        paged_file.open(OpenMode::Update);
        PageCache::new(paged_file, cache_count, 4, 4)
    }

    fn int_compare() -> Compare {
        Compare::new(vec![LeafType::Int], true)
    }

    #[test]
    fn allocate_then_fix_sees_the_same_bytes() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path(), 8);
        let pid;
        {
            let mut fix = cache.allocate(true).unwrap();
            pid = fix.pid();
            fix.page_mut().set_next(42);
        }
        cache.flush_all().unwrap();

        let cmp = int_compare();
        let fix = cache.fix(pid, None, &cmp).unwrap();
        assert_eq!(fix.page().next(), 42);
    }

    #[test]
    fn eviction_respects_pinned_and_dirty_handles() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path(), 1);
        let cmp = int_compare();

        let a = cache.allocate(true).unwrap().pid();
        cache.flush_all().unwrap();
        let b = cache.allocate(true).unwrap().pid();
        cache.flush_all().unwrap();

        // Pin `a`, then fix `b`: with cache_count=1, `a` remains pinned so
        // it cannot be evicted, and `b`'s own pin keeps it live too.
        let fix_a = cache.fix(a, None, &cmp).unwrap();
        {
            let _fix_b = cache.fix(b, None, &cmp).unwrap();
        }
        assert_eq!(fix_a.pid(), a);
    }

    #[test]
    fn free_schedules_release_until_flush() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path(), 8);
        let fix = cache.allocate(true).unwrap();
        let pid = fix.pid();
        cache.free(fix).unwrap();
        cache.flush_all().unwrap();

        let cmp = int_compare();
        // the physical free-list should now hand this id back out.
        let reused = cache.allocate(true).unwrap();
        assert_eq!(reused.pid(), pid);
        let _ = cmp;
    }

    #[test]
    fn two_sibling_pages_can_be_mutated_at_once() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path(), 8);
        let mut left = cache.allocate(true).unwrap();
        let mut right = cache.allocate(true).unwrap();
        // structural merges need both halves of a concatenate mutable at
        // the same time; this would deadlock (or panic) if pages shared a
        // single cache-wide lock instead of one lock each.
        let left_pid = left.pid();
        let right_pid = right.pid();
        let mut l = left.page_mut();
        let mut r = right.page_mut();
        l.set_next(right_pid);
        r.set_prev(left_pid);
    }
}
