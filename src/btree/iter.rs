//! §4.4.E Iteration — range scans over the leaf chain. Grounded on the
//! teacher's `BTreeFileIterator` (`small-db::btree::iterator`), which also
//! walks a leaf's slot index forward and follows `rightSiblingId` at
//! `entry_count`; generalized to a `Compare`-driven upper bound and
//! variable-length entries instead of fixed tuple slots.
//!
//! Matches "coroutine-style iteration" strategy: an explicit
//! cursor struct remembering `{pageHandle, slotIndex, lowerBound,
//! upperBound}` rather than a generator/closure, since `next` here
//! re-fixes its current leaf on every call instead of holding a pin across
//! calls — consistent with `descent::find_path_to_leaf`'s "no pins held
//! across an operation's return" choice (see its doc comment).

use std::cmp::Ordering;

use crate::codec::compare::Compare;
use crate::error::Result;
use crate::page::HeaderPage;
use crate::page_cache::PageCache;
use crate::physical::{FixMode, PhysicalFile};
use crate::types::{is_defined, PageId};

use super::descent;

/// A forward-only cursor over one leaf chain, per cursor
/// struct (the bitmap overlay's NULL-bucket-first emission happens above
/// this, in `BtreeFile::scan`, since it never touches a leaf).
pub struct Cursor<'c, PF: PhysicalFile> {
    cache: &'c PageCache<PF>,
    compare: Compare,
    page_pid: Option<PageId>,
    slot: usize,
    upper_bound: Option<Vec<u8>>,
}

impl<'c, PF: PhysicalFile> Cursor<'c, PF> {
    /// "preSearch... for lower-bound predicates without a
    /// key (open range), fetches the leftmost leaf."
    pub fn unbounded(
        cache: &'c PageCache<PF>,
        compare: Compare,
        header: &HeaderPage,
    ) -> Result<Self> {
        let page_pid = descent::leftmost_leaf(cache, &compare, header)?;
        Ok(Self {
                cache,
                compare,
                page_pid,
                slot: 0,
                upper_bound: None,
        })
    }

    /// Descends to the leaf that would hold `lower_key` and positions the
    /// cursor at the first entry `>= lower_key`.
    pub fn from_lower_bound(
        cache: &'c PageCache<PF>,
        compare: Compare,
        header: &HeaderPage,
        lower_key: &[u8],
    ) -> Result<Self> {
        let found = descent::find_path_to_leaf(cache, &compare, header, lower_key, false)?;
        let (page_pid, slot) = match found {
            Some((_, leaf_pid)) => {
                let fix = cache.fix(leaf_pid, Some(FixMode::ReadOnly), &compare)?;
                let idx = descent::lower_bound(&fix.page(), lower_key, &compare)?;
                (Some(leaf_pid), idx)
            }
            None => (None, 0),
        };
        Ok(Self {
                cache,
                compare,
                page_pid,
                slot,
                upper_bound: None,
        })
    }

    /// Caps the scan: once an entry compares greater than `upper_key`, the
    /// cursor terminates ("if past upper bound, terminate").
    pub fn with_upper_bound(mut self, upper_key: Vec<u8>) -> Self {
        self.upper_bound = Some(upper_key);
        self
    }

    /// Returns the next packed entry in ascending order, or `None` once the
    /// leaf chain or the upper bound is exhausted.
    pub fn next(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let pid = match self.page_pid {
                Some(p) => p,
                None => return Ok(None),
            };
            let fix = self.cache.fix(pid, Some(FixMode::ReadOnly), &self.compare)?;
            let page = fix.page();

            if self.slot >= page.entry_count() {
                let next_pid = page.next();
                drop(page);
                drop(fix);
                if is_defined(next_pid) {
                    self.page_pid = Some(next_pid);
                    self.slot = 0;
                    continue;
                }
                self.page_pid = None;
                return Ok(None);
            }

            let entry = page.entry_bytes(self.slot).to_vec();
            if let Some(upper) = &self.upper_bound {
                if self.compare.compare(&entry, upper)? == Ordering::Greater {
                    self.page_pid = None;
                    return Ok(None);
                }
            }
            self.slot += 1;
            return Ok(Some(entry));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::expand::insert_leaf_entry;
    use crate::codec::value::LeafType;
    use crate::paged_file::PagedFile;
    use crate::physical::{FilePhysicalFile, OpenMode};
    use tempfile::tempdir;

    fn open_cache(dir: &std::path::Path) -> PageCache<FilePhysicalFile> {
        let physical = FilePhysicalFile::new(dir, 64);
        let mut paged_file = PagedFile::new(physical);
        paged_file.create().unwrap();
        paged_file.open(OpenMode::Update);
        PageCache::new(paged_file, 32, 4, 4)
    }

    fn uint_key_entry(k: u32, v: u32) -> Vec<u8> {
        let mut e = k.to_le_bytes().to_vec();
        e.extend_from_slice(&v.to_le_bytes());
        e
    }

    fn build_tree(
        cache: &PageCache<FilePhysicalFile>,
        compare: &Compare,
        header: &mut HeaderPage,
        n: u32,
    ) {
        let root_fix = cache.allocate(true).unwrap();
        let root_pid = root_fix.pid();
        drop(root_fix);
        header.set_root_id(root_pid);
        header.set_left_leaf_id(root_pid);
        header.set_right_leaf_id(root_pid);
        header.set_tree_height(1);

        for k in 0..n {
            let entry = uint_key_entry(k, k * 10);
            let (ancestors, leaf_pid) =
                descent::find_path_to_leaf(cache, compare, header, &entry, false)
                    .unwrap()
                    .unwrap();
            insert_leaf_entry(cache, compare, header, ancestors, leaf_pid, &entry).unwrap();
        }
    }

    #[test]
    fn scanning_an_unbounded_cursor_returns_ascending_order() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path());
        let compare = Compare::new(vec![LeafType::UInt], true);
        let mut header = HeaderPage::initialize();
        build_tree(&cache, &compare, &mut header, 15);

        let mut cursor = Cursor::unbounded(&cache, compare.clone(), &header).unwrap();
        let mut seen = Vec::new();
        while let Some(entry) = cursor.next().unwrap() {
            seen.push(u32::from_le_bytes(entry[0..4].try_into().unwrap()));
        }
        let expected: Vec<u32> = (0..15).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn upper_bound_stops_the_scan_early() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path());
        let compare = Compare::new(vec![LeafType::UInt], true);
        let mut header = HeaderPage::initialize();
        build_tree(&cache, &compare, &mut header, 15);

        let upper = uint_key_entry(5, 0);
        let mut cursor =
            Cursor::unbounded(&cache, compare, &header).unwrap().with_upper_bound(upper);
        let mut seen = Vec::new();
        while let Some(entry) = cursor.next().unwrap() {
            seen.push(u32::from_le_bytes(entry[0..4].try_into().unwrap()));
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn from_lower_bound_skips_preceding_entries() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path());
        let compare = Compare::new(vec![LeafType::UInt], true);
        let mut header = HeaderPage::initialize();
        build_tree(&cache, &compare, &mut header, 15);

        let lower = uint_key_entry(10, 0);
        let mut cursor =
            Cursor::from_lower_bound(&cache, compare, &header, &lower).unwrap();
        let first = cursor.next().unwrap().unwrap();
        assert_eq!(u32::from_le_bytes(first[0..4].try_into().unwrap()), 10);
    }
}
