//! C4 HeaderPage — the per-file singleton metadata page that lives at page
//! id 0. Grounded on
//! `examples/original_source/sydney/Driver/Bitmap/Bitmap/HeaderPage.h` and
//! its Btree2 counterpart: a `Header` struct of plain fields plus a
//! `dirty`-on-every-setter idiom, here expressed as one explicit
//! `dirty: bool` flag the caller checks before deciding to write the page
//! back.

use crate::types::{ObjectId, PageId, UNDEFINED_PAGE_ID};

const ROOT_ID_OFFSET: usize = 0;
const LEFT_LEAF_ID_OFFSET: usize = 4;
const RIGHT_LEAF_ID_OFFSET: usize = 8;
const TOTAL_ENTRY_COUNT_OFFSET: usize = 12;
const TREE_HEIGHT_OFFSET: usize = 20;
const MAX_ROW_ID_OFFSET: usize = 24;
const NULL_PAGE_ID_OFFSET: usize = 28;
const NULL_AREA_ID_OFFSET: usize = 32;
const ALL_NULL_PAGE_ID_OFFSET: usize = 34;
const ALL_NULL_AREA_ID_OFFSET: usize = 38;
const LAST_MODIFIED_OFFSET: usize = 40;

/// Total on-disk size of the fields this struct tracks. The page itself is
/// as large as any other ("HeaderPage lives in page 0 of the
/// same paged file and otherwise looks like any other page"); the rest of
/// its bytes are unused padding.
pub const HEADER_PAGE_FIELDS_SIZE: usize = 48;

/// The B+ tree's singleton metadata page: root location, leaf-chain ends,
/// counts, and the null/all-null entry buckets the bitmap overlay and plain
/// index both rely on ( resolved Open Question: NULL keys are
/// collected in a page/area pair rather than sorted into the tree).
#[derive(Debug, Clone)]
pub struct HeaderPage {
    root_id: PageId,
    left_leaf_id: PageId,
    right_leaf_id: PageId,
    total_entry_count: u64,
    tree_height: u32,
    max_row_id: u32,
    null_bucket: ObjectId,
    all_null_bucket: ObjectId,
    /// Last mutation time, in the host's timestamp representation. Resolved
    /// Open Question : this crate writes it on every count
    /// mutation rather than leaving it reserved-zero.
    last_modified: u64,
    dirty: bool,
}

impl HeaderPage {
    /// "initialize: all fields reset, no root, no leaves,
    /// zero counts."
    pub fn initialize() -> Self {
        Self {
            root_id: UNDEFINED_PAGE_ID,
            left_leaf_id: UNDEFINED_PAGE_ID,
            right_leaf_id: UNDEFINED_PAGE_ID,
            total_entry_count: 0,
            tree_height: 0,
            max_row_id: 0,
            null_bucket: ObjectId::undefined(),
            all_null_bucket: ObjectId::undefined(),
            last_modified: 0,
            dirty: true,
        }
    }

    pub fn load(buffer: &[u8]) -> Self {
        let u32_at = |off: usize| {
            u32::from_le_bytes(buffer[off..off + 4].try_into().unwrap())
        };
        let u16_at = |off: usize| {
            u16::from_le_bytes(buffer[off..off + 2].try_into().unwrap())
        };
        let u64_at = |off: usize| {
            u64::from_le_bytes(buffer[off..off + 8].try_into().unwrap())
        };
        Self {
            root_id: u32_at(ROOT_ID_OFFSET),
            left_leaf_id: u32_at(LEFT_LEAF_ID_OFFSET),
            right_leaf_id: u32_at(RIGHT_LEAF_ID_OFFSET),
            total_entry_count: u64_at(TOTAL_ENTRY_COUNT_OFFSET),
            tree_height: u32_at(TREE_HEIGHT_OFFSET),
            max_row_id: u32_at(MAX_ROW_ID_OFFSET),
            null_bucket: ObjectId {
                page_id: u32_at(NULL_PAGE_ID_OFFSET),
                area_id: u16_at(NULL_AREA_ID_OFFSET),
            },
            all_null_bucket: ObjectId {
                page_id: u32_at(ALL_NULL_PAGE_ID_OFFSET),
                area_id: u16_at(ALL_NULL_AREA_ID_OFFSET),
            },
            last_modified: u64_at(LAST_MODIFIED_OFFSET),
            dirty: false,
        }
    }

    /// Writes this header's fields into the first `HEADER_PAGE_FIELDS_SIZE`
    /// bytes of `buffer`, leaving the remainder untouched.
    pub fn store(&self, buffer: &mut [u8]) {
        buffer[ROOT_ID_OFFSET..ROOT_ID_OFFSET + 4]
        .copy_from_slice(&self.root_id.to_le_bytes());
        buffer[LEFT_LEAF_ID_OFFSET..LEFT_LEAF_ID_OFFSET + 4]
        .copy_from_slice(&self.left_leaf_id.to_le_bytes());
        buffer[RIGHT_LEAF_ID_OFFSET..RIGHT_LEAF_ID_OFFSET + 4]
        .copy_from_slice(&self.right_leaf_id.to_le_bytes());
        buffer[TOTAL_ENTRY_COUNT_OFFSET..TOTAL_ENTRY_COUNT_OFFSET + 8]
        .copy_from_slice(&self.total_entry_count.to_le_bytes());
        buffer[TREE_HEIGHT_OFFSET..TREE_HEIGHT_OFFSET + 4]
        .copy_from_slice(&self.tree_height.to_le_bytes());
        buffer[MAX_ROW_ID_OFFSET..MAX_ROW_ID_OFFSET + 4]
        .copy_from_slice(&self.max_row_id.to_le_bytes());
        buffer[NULL_PAGE_ID_OFFSET..NULL_PAGE_ID_OFFSET + 4]
        .copy_from_slice(&self.null_bucket.page_id.to_le_bytes());
        buffer[NULL_AREA_ID_OFFSET..NULL_AREA_ID_OFFSET + 2]
        .copy_from_slice(&self.null_bucket.area_id.to_le_bytes());
        buffer[ALL_NULL_PAGE_ID_OFFSET..ALL_NULL_PAGE_ID_OFFSET + 4]
        .copy_from_slice(&self.all_null_bucket.page_id.to_le_bytes());
        buffer[ALL_NULL_AREA_ID_OFFSET..ALL_NULL_AREA_ID_OFFSET + 2]
        .copy_from_slice(&self.all_null_bucket.area_id.to_le_bytes());
        buffer[LAST_MODIFIED_OFFSET..LAST_MODIFIED_OFFSET + 8]
        .copy_from_slice(&self.last_modified.to_le_bytes());
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn root_id(&self) -> PageId {
        self.root_id
    }

    pub fn set_root_id(&mut self, id: PageId) {
        self.root_id = id;
        self.dirty = true;
    }

    pub fn has_root(&self) -> bool {
        crate::types::is_defined(self.root_id)
    }

    pub fn left_leaf_id(&self) -> PageId {
        self.left_leaf_id
    }

    pub fn set_left_leaf_id(&mut self, id: PageId) {
        self.left_leaf_id = id;
        self.dirty = true;
    }

    pub fn right_leaf_id(&self) -> PageId {
        self.right_leaf_id
    }

    pub fn set_right_leaf_id(&mut self, id: PageId) {
        self.right_leaf_id = id;
        self.dirty = true;
    }

    pub fn total_entry_count(&self) -> u64 {
        self.total_entry_count
    }

    /// supplemented behavior: `incrementCount`/`decrementCount`
    /// touch `last_modified` as a side effect.
    pub fn increment_count(&mut self, by: u64, now: u64) {
        self.total_entry_count += by;
        self.last_modified = now;
        self.dirty = true;
    }

    pub fn decrement_count(&mut self, by: u64, now: u64) {
        self.total_entry_count = self.total_entry_count.saturating_sub(by);
        self.last_modified = now;
        self.dirty = true;
    }

    pub fn tree_height(&self) -> u32 {
        self.tree_height
    }

    pub fn set_tree_height(&mut self, height: u32) {
        self.tree_height = height;
        self.dirty = true;
    }

    pub fn max_row_id(&self) -> u32 {
        self.max_row_id
    }

    /// "insert: row ids are assigned by bumping
    /// maxRowId and never reused, even after expunge."
    pub fn next_row_id(&mut self) -> u32 {
        self.max_row_id += 1;
        self.dirty = true;
        self.max_row_id
    }

    pub fn null_bucket(&self) -> ObjectId {
        self.null_bucket
    }

    pub fn set_null_bucket(&mut self, id: ObjectId) {
        self.null_bucket = id;
        self.dirty = true;
    }

    pub fn all_null_bucket(&self) -> ObjectId {
        self.all_null_bucket
    }

    pub fn set_all_null_bucket(&mut self, id: ObjectId) {
        self.all_null_bucket = id;
        self.dirty = true;
    }

    pub fn last_modified(&self) -> u64 {
        self.last_modified
    }
}
