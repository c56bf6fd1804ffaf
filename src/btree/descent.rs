//! §4.4.A Descent — locating the leaf (or insertion ancestor chain) for a
//! packed key buffer. Grounded on the teacher's `BTreeFile::find_leaf_page`
//! (`small-db::btree::file::BTreeFile`), generalized from its fixed-size
//! tuple comparison to `Compare`'s composite, possibly variable-length keys.

use std::cmp::Ordering;

use crate::codec::compare::Compare;
use crate::error::Result;
use crate::page::{HeaderPage, Page};
use crate::page_cache::PageCache;
use crate::physical::{FixMode, PhysicalFile};
use crate::types::{is_defined, PageId};

/// First index `i` with `entry[i] >= key_buf` under `compare`.
pub fn lower_bound(page: &Page, key_buf: &[u8], compare: &Compare) -> Result<usize> {
    for i in 0..page.entry_count() {
        if compare.compare(page.entry_bytes(i), key_buf)? != Ordering::Less {
            return Ok(i);
        }
    }
    Ok(page.entry_count())
}

/// First index `i` with `entry[i] > key_buf` under `compare`.
pub fn upper_bound(page: &Page, key_buf: &[u8], compare: &Compare) -> Result<usize> {
    for i in 0..page.entry_count() {
        if compare.compare(page.entry_bytes(i), key_buf)? == Ordering::Greater {
            return Ok(i);
        }
    }
    Ok(page.entry_count())
}

fn child_id_at(page: &Page, i: usize) -> PageId {
    let bytes = page.value_bytes(i);
    u32::from_le_bytes(bytes[0..4].try_into().unwrap())
}

/// : walks from the root to the leaf that would hold
/// `key_buf`, returning `(ancestor node ids root-first, leaf id)`. Returns
/// `None` for an empty tree. Pins are taken one page at a time and released
/// before descending further — safe because `PageCache::fix` can always
/// re-attach an ancestor by id later if a structural change needs it.
pub fn find_path_to_leaf<PF: PhysicalFile>(
    cache: &PageCache<PF>,
    compare: &Compare,
    header: &HeaderPage,
    key_buf: &[u8],
    use_upper_bound: bool,
) -> Result<Option<(Vec<PageId>, PageId)>> {
    if !header.has_root() {
        return Ok(None);
    }
    let mut ancestors = Vec::new();
    let mut current = header.root_id();
    loop {
        let fix = cache.fix(current, Some(FixMode::ReadOnly), compare)?;
        let page = fix.page();
        if page.is_leaf() {
            return Ok(Some((ancestors, current)));
        }
        let bound = if use_upper_bound {
            upper_bound(&page, key_buf, compare)?
        } else {
            lower_bound(&page, key_buf, compare)?
        };
        // "step back one slot (never past begin)"
        let idx = bound.saturating_sub(1);
        let child = child_id_at(&page, idx);
        drop(page);
        ancestors.push(current);
        current = child;
    }
}

/// Walks the right-sibling chain starting at `leaf` and back up to confirm
/// `leftmost`/`rightmost` reachability (used by `verify` and by
/// `BtreeFile::scan`'s unbounded range).
pub fn leftmost_leaf<PF: PhysicalFile>(
    cache: &PageCache<PF>,
    compare: &Compare,
    header: &HeaderPage,
) -> Result<Option<PageId>> {
    if !header.has_root() {
        return Ok(None);
    }
    let mut current = header.root_id();
    loop {
        let fix = cache.fix(current, Some(FixMode::ReadOnly), compare)?;
        let page = fix.page();
        if page.is_leaf() {
            return Ok(Some(current));
        }
        let child = child_id_at(&page, 0);
        drop(page);
        current = child;
    }
}

pub fn is_root_page(prev: PageId, next: PageId) -> bool {
    !is_defined(prev) && !is_defined(next)
}
