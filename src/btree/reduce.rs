//! §4.4.D Reduce — merging or redistributing an underflowing page, and the
//! root-specific policies that follow. Grounded on the teacher's
//! `BTreeFile::handle_min_size_page` (`small-db::btree::file::BTreeFile`),
//! which walks the same prev-then-next sibling preference and single-child
//! root promotion; generalized to `Compare`-driven separators and
//! variable-length entries, and to freeing pages through `PageCache` rather
//! than a page-id free-list owned by the table.
//!
//! Concatenation needs both sibling pages mutably borrowed at once
//! (`sibling.page_mut().drain_into(&mut keep.page_mut())`); this is exactly
//! what `PageCache`'s per-slot `Pod<Page>` (`Arc<RwLock<Page>>`) design
//! exists to allow — two independent locks, not one shared cell.

use crate::codec::compare::Compare;
use crate::error::Result;
use crate::page::HeaderPage;
use crate::page_cache::PageCache;
use crate::physical::PhysicalFile;
use crate::types::{is_defined, PageId, UNDEFINED_PAGE_ID};

use super::expand::make_node_entry;

pub(crate) fn find_child_index(page: &crate::page::Page, child_pid: PageId) -> Option<usize> {
    (0..page.entry_count()).find(|&i| {
        let bytes = page.value_bytes(i);
        u32::from_le_bytes(bytes[0..4].try_into().unwrap()) == child_pid
    })
}

fn child_id_at(page: &crate::page::Page, i: usize) -> PageId {
    let bytes = page.value_bytes(i);
    u32::from_le_bytes(bytes[0..4].try_into().unwrap())
}

/// Removes the node entry in `parent_fix` whose child pointer is `child_pid`.
fn remove_child_entry<PF: PhysicalFile>(
    parent_fix: &mut super::PageFix<'_, PF>,
    child_pid: PageId,
) {
    let idx = find_child_index(&parent_fix.page(), child_pid);
    if let Some(idx) = idx {
        parent_fix.page_mut().erase_at(idx);
    }
}

/// Rewrites the node entry pointing at `child_pid` so its key matches
/// `child_pid`'s current first entry (the delegate-key invariant: "for
/// every child C the first entry of C equals the separator stored beside
/// the child pointer"). Returns whether the rewritten entry
/// sits at index 0 of `parent_fix` itself, since that's exactly when the
/// parent's own first entry changed too and a caller walking further up
/// the tree (insert's begin()-fixup, `expand::fixup_ancestor_chain`) needs
/// to keep going.
pub(crate) fn fixup_separator<PF: PhysicalFile>(
    cache: &PageCache<PF>,
    compare: &Compare,
    parent_fix: &mut super::PageFix<'_, PF>,
    child_pid: PageId,
) -> Result<bool> {
    let idx = match find_child_index(&parent_fix.page(), child_pid) {
        Some(i) => i,
        None => return Ok(false),
    };
    let new_first = {
        let child_fix = cache.fix(child_pid, None, compare)?;
        child_fix.page().first_entry().map(|e| e.to_vec())
    };
    if let Some(new_first) = new_first {
        let new_entry = make_node_entry(compare, &new_first, child_pid)?;
        let mut page = parent_fix.page_mut();
        page.erase_at(idx);
        page.insert_at(idx, &new_entry)?;
    }
    Ok(idx == 0)
}

/// Returns `(prevSibling, nextSibling)` of `child_pid` as seen from its
/// immediate parent `parent_pid`.
fn sibling_ids<PF: PhysicalFile>(
    cache: &PageCache<PF>,
    compare: &Compare,
    parent_pid: PageId,
    child_pid: PageId,
) -> Result<(Option<PageId>, Option<PageId>)> {
    let parent_fix = cache.fix(parent_pid, None, compare)?;
    let page = parent_fix.page();
    let idx = match find_child_index(&page, child_pid) {
        Some(i) => i,
        None => return Ok((None, None)),
    };
    let prev = if idx > 0 {
        Some(child_id_at(&page, idx - 1))
    } else {
        None
    };
    let next = if idx + 1 < page.entry_count() {
        Some(child_id_at(&page, idx + 1))
    } else {
        None
    };
    Ok((prev, next))
}

/// : called after a delete leaves `page_pid`'s used-size below
/// half a page. `ancestors` is root-first and does NOT include `page_pid`
/// itself. Concatenates into a sibling when the combined size fits in one
/// page, else redistributes; either way propagates the underflow check
/// (and any separator rewrite) up to the parent, recursing as needed.
pub fn reduce_page<PF: PhysicalFile>(
    cache: &PageCache<PF>,
    compare: &Compare,
    header: &mut HeaderPage,
    mut ancestors: Vec<PageId>,
    page_pid: PageId,
) -> Result<()> {
    let parent_pid = match ancestors.pop() {
        Some(p) => p,
        None => return handle_root_after_change(cache, compare, header),
    };

    let (prev_id, next_id) = sibling_ids(cache, compare, parent_pid, page_pid)?;
    let sibling_id = match prev_id.or(next_id) {
        Some(id) => id,
        // Only child of its parent: nothing to merge with at this level;
        // the parent itself may still need its own underflow handled by an
        // ancestor, but with one child it cannot have shrunk on its own.
        None => return Ok(()),
    };
    let sibling_is_prev = prev_id.is_some();
    let (left_id, right_id) = if sibling_is_prev {
        (sibling_id, page_pid)
    } else {
        (page_pid, sibling_id)
    };

    let page_size = cache.fix(page_pid, None, compare)?.page().page_size();
    let combined = {
        let left_used = cache.fix(left_id, None, compare)?.page().used_size();
        let right_used = cache.fix(right_id, None, compare)?.page().used_size();
        left_used + right_used
    };

    let mut parent_fix = cache.fix(parent_pid, None, compare)?;

    if combined <= page_size - crate::page::HEADER_SIZE_BYTES {
        concatenate(cache, compare, header, left_id, right_id)?;
        remove_child_entry(&mut parent_fix, right_id);
    } else {
        redistribute(cache, compare, left_id, right_id)?;
        fixup_separator(cache, compare, &mut parent_fix, right_id)?;
    }

    let parent_underflow =
        parent_fix.page().used_size() < parent_fix.page().page_size() / 2;
    drop(parent_fix);
    if parent_underflow {
        reduce_page(cache, compare, header, ancestors, parent_pid)?;
    }
    Ok(())
}

/// Moves all of `right_id`'s entries into `left_id`, relinks `left_id`'s
/// `next` to skip over `right_id`, fixes the new next sibling's `prev`, and
/// frees `right_id`. Updates `HeaderPage.right_leaf_id` if `right_id` was
/// the rightmost leaf.
fn concatenate<PF: PhysicalFile>(
    cache: &PageCache<PF>,
    compare: &Compare,
    header: &mut HeaderPage,
    left_id: PageId,
    right_id: PageId,
) -> Result<()> {
    let mut left_fix = cache.fix(left_id, None, compare)?;
    let mut right_fix = cache.fix(right_id, None, compare)?;

    {
        let mut right_page = right_fix.page_mut();
        let mut left_page = left_fix.page_mut();
        right_page.drain_into(&mut left_page)?;
    }

    let was_rightmost = header.right_leaf_id() == right_id;
    let new_next = right_fix.page().next();
    left_fix.page_mut().set_next(new_next);

    if is_defined(new_next) {
        let mut next_fix = cache.fix(new_next, None, compare)?;
        next_fix.page_mut().set_prev(left_id);
    }
    if was_rightmost {
        header.set_right_leaf_id(left_id);
    }

    drop(left_fix);
    drop(right_fix);
    let freed = cache.fix(right_id, None, compare)?;
    cache.free(freed)?;
    Ok(())
}

/// "redistribute(prev[, newEntry]): compute target used-size
/// halfHi = (used(prev)+used(self))/2; move entries in the fuller
/// direction until the split point crosses halfHi."
fn redistribute<PF: PhysicalFile>(
    cache: &PageCache<PF>,
    compare: &Compare,
    left_id: PageId,
    right_id: PageId,
) -> Result<()> {
    let mut left_fix = cache.fix(left_id, None, compare)?;
    let mut right_fix = cache.fix(right_id, None, compare)?;

    let (left_used, right_used) =
        (left_fix.page().used_size(), right_fix.page().used_size());
    let half = (left_used + right_used) / 2;

    if left_used > right_used {
        let mut moved = Vec::new();
        loop {
            let used = left_fix.page().used_size();
            if used <= half || left_fix.page().entry_count() <= 1 {
                break;
            }
            let n = left_fix.page().entry_count();
            let last = left_fix.page().entry_bytes(n - 1).to_vec();
            left_fix.page_mut().erase_at(n - 1);
            moved.push(last);
        }
        moved.reverse();
        right_fix.page_mut().prepend_entries(&moved)?;
    } else {
        let mut moved = Vec::new();
        loop {
            let used = right_fix.page().used_size();
            if used <= half || right_fix.page().entry_count() <= 1 {
                break;
            }
            let first = right_fix.page().entry_bytes(0).to_vec();
            right_fix.page_mut().erase_at(0);
            moved.push(first);
        }
        left_fix.page_mut().append_entries(&moved)?;
    }
    Ok(())
}

/// root-specific policies, checked after every structural
/// change that might have touched the root: single-child root promotion,
/// and the zero-entry root clearing rootId/leftLeafId/rightLeafId while
/// preserving the NULL-bucket fields.
pub fn handle_root_after_change<PF: PhysicalFile>(
    cache: &PageCache<PF>,
    compare: &Compare,
    header: &mut HeaderPage,
) -> Result<()> {
    if !header.has_root() {
        return Ok(());
    }
    let root_pid = header.root_id();
    let root_fix = cache.fix(root_pid, None, compare)?;
    let is_leaf = root_fix.page().is_leaf();
    let entry_count = root_fix.page().entry_count();

    if is_leaf {
        if entry_count == 0 {
            drop(root_fix);
            let freed = cache.fix(root_pid, None, compare)?;
            cache.free(freed)?;
            header.set_root_id(UNDEFINED_PAGE_ID);
            header.set_left_leaf_id(UNDEFINED_PAGE_ID);
            header.set_right_leaf_id(UNDEFINED_PAGE_ID);
            header.set_tree_height(0);
        }
        return Ok(());
    }

    if entry_count == 1 {
        let only_child = child_id_at(&root_fix.page(), 0);
        drop(root_fix);
        let freed = cache.fix(root_pid, None, compare)?;
        cache.free(freed)?;
        header.set_root_id(only_child);
        header.set_tree_height(header.tree_height().saturating_sub(1));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::descent;
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

    fn build_split_tree(
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
            let entry = uint_key_entry(k, k);
            let (ancestors, leaf_pid) =
                descent::find_path_to_leaf(cache, compare, header, &entry, false)
                    .unwrap()
                    .unwrap();
            insert_leaf_entry(cache, compare, header, ancestors, leaf_pid, &entry).unwrap();
        }
    }

    #[test]
    fn concatenating_two_siblings_frees_the_right_one() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path());
        let compare = Compare::new(vec![LeafType::UInt], true);
        let mut header = HeaderPage::initialize();
        // Exactly enough inserts to force one split and no more, so the
        // tree has precisely two leaves and `right_id` is unambiguously
        // the rightmost one.
        build_split_tree(&cache, &compare, &mut header, 8);
        assert_eq!(header.tree_height(), 2);

        let left_id = header.left_leaf_id();
        let right_id = {
            let left = cache.fix(left_id, None, &compare).unwrap();
            left.page().next()
        };
        assert!(crate::types::is_defined(right_id));

        concatenate(&cache, &compare, &mut header, left_id, right_id).unwrap();

        let left = cache.fix(left_id, None, &compare).unwrap();
        assert!(!crate::types::is_defined(left.page().next()));
        assert_eq!(header.right_leaf_id(), left_id);
    }

    #[test]
    fn single_child_root_is_demoted() {
        let dir = tempdir().unwrap();
        let cache = open_cache(dir.path());
        let compare = Compare::new(vec![LeafType::UInt], true);
        let mut header = HeaderPage::initialize();

        let leaf_fix = cache.allocate(true).unwrap();
        let leaf_pid = leaf_fix.pid();
        drop(leaf_fix);

        let mut root_fix = cache.allocate(false).unwrap();
        let root_pid = root_fix.pid();
        let entry = {
            let e = uint_key_entry(0, 0);
            make_node_entry(&compare, &e, leaf_pid).unwrap()
        };
        root_fix.page_mut().insert_at(0, &entry).unwrap();
        drop(root_fix);

        header.set_root_id(root_pid);
        header.set_tree_height(2);

        handle_root_after_change(&cache, &compare, &mut header).unwrap();
        assert_eq!(header.root_id(), leaf_pid);
        assert_eq!(header.tree_height(), 1);
    }
}
