//! §4.4.F Verify — a recursive walk confirming every invariant
//! calls testable: key ordering, the delegate-key relationship between a
//! node entry and its child's first entry, correct sibling links, and the
//! HeaderPage's total entry count matching what the leaf chain actually
//! holds. Grounded on the teacher's debug-only `BTreeFile::check_integrity`
//! helper (`small-db::btree::file::BTreeFile`), which walks the same
//! parent/child/sibling relationships for its own tests; generalized here
//! into a public, cancellable operation returning a report instead of
//! panicking.

use std::cmp::Ordering;

use itertools::Itertools;
use log::warn;

use crate::codec::compare::Compare;
use crate::error::{Error, Result};
use crate::page::HeaderPage;
use crate::page_cache::PageCache;
use crate::physical::{FixMode, PhysicalFile};
use crate::types::{is_defined, PageId};

/// One broken invariant, described the way a caller can act on without
/// re-deriving which page or key was involved.
#[derive(Debug, Clone)]
pub struct VerifyFinding {
    pub page_id: PageId,
    pub message: String,
}

/// The outcome of a full-tree verify ("verify(onError,
/// isCanceled): walks the tree... returns a list of findings").
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub pages_visited: usize,
    pub entries_visited: u64,
    pub findings: Vec<VerifyFinding>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

struct Ctx<'a> {
    continue_on_error: bool,
    is_canceled: &'a dyn Fn() -> bool,
    report: VerifyReport,
}

impl<'a> Ctx<'a> {
    fn fail(&mut self, page_id: PageId, message: String) -> Result<()> {
        warn!("verify: page {} — {}", page_id, message);
        self.report.findings.push(VerifyFinding { page_id, message });
        if self.continue_on_error {
            Ok(())
        } else {
            Err(Error::VerifyAborted(format!("page {}: {}", page_id, message)))
        }
    }

    fn check_canceled(&self) -> Result<()> {
        if (self.is_canceled)() {
            Err(Error::Cancel)
        } else {
            Ok(())
        }
    }
}

/// : walks the whole tree from the root, recursing into every
/// child, and separately walks the leaf chain left-to-right to confirm the
/// sibling links and the HeaderPage-recorded entry count agree with what is
/// actually there. `continue_on_error` mirrors "onError: either stop at the
/// first finding (VerifyAborted) or keep going and report everything."
pub fn verify<PF: PhysicalFile>(
    cache: &PageCache<PF>,
    compare: &Compare,
    header: &HeaderPage,
    is_canceled: &dyn Fn() -> bool,
    continue_on_error: bool,
) -> Result<VerifyReport> {
    let mut ctx = Ctx {
        continue_on_error,
        is_canceled,
        report: VerifyReport::default(),
    };

    if !header.has_root() {
        return Ok(ctx.report);
    }

    ctx.check_canceled()?;
    verify_subtree(cache, compare, header, header.root_id(), None, None, &mut ctx)?;
    verify_leaf_chain(cache, compare, header, &mut ctx)?;

    let recorded = header.total_entry_count();
    if recorded != ctx.report.entries_visited {
        ctx.fail(
            header.root_id(),
            format!(
                "HeaderPage.total_entry_count is {} but the leaf chain holds {}",
                recorded, ctx.report.entries_visited
            ),
        )?;
    }

    Ok(ctx.report)
}

/// Recursively checks one subtree rooted at `page_id`. `lower`/`upper` are
/// the exclusive/inclusive key bounds a parent's separators impose on this
/// subtree, or `None` at the tree's outer edges.
fn verify_subtree<PF: PhysicalFile>(
    cache: &PageCache<PF>,
    compare: &Compare,
    header: &HeaderPage,
    page_id: PageId,
    lower: Option<&[u8]>,
    upper: Option<&[u8]>,
    ctx: &mut Ctx,
) -> Result<()> {
    ctx.check_canceled()?;
    ctx.report.pages_visited += 1;

    let fix = cache.fix(page_id, Some(FixMode::ReadOnly), compare)?;
    let page = fix.page();

    if crate::btree::descent::is_root_page(page.prev(), page.next()) && page_id != header.root_id() {
        ctx.fail(
            page_id,
            "both sibling pointers are undefined but this page is not the root".into(),
        )?;
    }

    let count = page.entry_count();
    let mut keys = Vec::with_capacity(count);
    let mut children = Vec::new();

    for i in 0..count {
        let entry = page.entry_bytes(i);
        let key_len = compare.key_size(entry)?;
        let key = &entry[..key_len];

        if let Some(lo) = lower {
            if compare.compare(key, lo)? == Ordering::Less {
                ctx.fail(page_id, format!("entry {} is below its subtree's lower bound", i))?;
            }
        }
        if let Some(hi) = upper {
            if compare.compare(key, hi)? != Ordering::Less {
                ctx.fail(page_id, format!("entry {} is at or above its subtree's upper bound", i))?;
            }
        }

        if !page.is_leaf() {
            let value = page.value_bytes(i);
            let child_id = u32::from_le_bytes(value[0..4].try_into().unwrap());
            children.push((child_id, key.to_vec()));
        }

        keys.push(key.to_vec());
    }

    if page.is_leaf() {
        ctx.report.entries_visited += count as u64;
    }

    drop(page);
    drop(fix);

    for (i, (prev, cur)) in keys.iter().tuple_windows().enumerate() {
        let ord = compare.compare(prev, cur)?;
        let ok = if compare.is_unique() {
            ord == Ordering::Less
        } else {
            ord != Ordering::Greater
        };
        if !ok {
            ctx.fail(page_id, format!("entry {} is not ordered after entry {}", i + 1, i))?;
        }
    }

    for (i, (child_id, separator)) in children.iter().enumerate() {
        ctx.check_canceled()?;
        if !is_defined(*child_id) {
            ctx.fail(page_id, format!("child pointer {} is undefined", i))?;
            continue;
        }

        let child_first = {
            let child_fix = cache.fix(*child_id, Some(FixMode::ReadOnly), compare)?;
            child_fix.page().first_entry().map(|e| {
                let key_len = compare.key_size(e).unwrap_or(e.len());
                e[..key_len].to_vec()
            })
        };
        match child_first {
            Some(first) if &first != separator => {
                ctx.fail(
                    *child_id,
                    "child's first entry does not match the delegate key stored beside it in its parent".into(),
                )?;
            }
            None => {
                ctx.fail(*child_id, "child page is empty but is referenced by its parent".into())?;
            }
            _ => {}
        }

        let child_upper = children.get(i + 1).map(|(_, sep)| sep.as_slice());
        verify_subtree(
            cache,
            compare,
            header,
            *child_id,
            Some(separator.as_slice()),
            child_upper.or(upper),
            ctx,
        )?;
    }

    Ok(())
}

/// Walks `header.left_leaf_id` through `next` pointers to
/// `header.right_leaf_id`, confirming the chain is acyclic, every `prev`
/// pointer agrees with its predecessor, and the chain actually terminates at
/// the recorded right end.
fn verify_leaf_chain<PF: PhysicalFile>(
    cache: &PageCache<PF>,
    compare: &Compare,
    header: &HeaderPage,
    ctx: &mut Ctx,
) -> Result<()> {
    let mut current = header.left_leaf_id();
    let mut prev = crate::types::UNDEFINED_PAGE_ID;
    let mut steps = 0usize;
    let bound = header.total_entry_count() as usize + ctx.report.pages_visited + 1;

    while is_defined(current) {
        ctx.check_canceled()?;
        steps += 1;
        if steps > bound.max(1024) {
            ctx.fail(current, "leaf chain did not terminate; a cycle is likely".into())?;
            break;
        }

        let fix = cache.fix(current, Some(FixMode::ReadOnly), compare)?;
        let page = fix.page();
        if !page.is_leaf() {
            ctx.fail(current, "leaf chain visited a non-leaf page".into())?;
        }
        if page.prev() != prev {
            ctx.fail(
                current,
                format!(
                    "prev pointer is {} but the chain arrived from {}",
                    page.prev(),
                    prev
                ),
            )?;
        }
        let next = page.next();
        drop(page);
        drop(fix);

        if !is_defined(next) && current != header.right_leaf_id() {
            ctx.fail(
                current,
                "leaf chain ended here but HeaderPage.right_leaf_id points elsewhere".into(),
            )?;
        }
        prev = current;
        current = next;
    }

    Ok(())
}
