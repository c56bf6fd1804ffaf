//! C8 BtreeFile — the top-level façade: create/destroy/mount/unmount,
//! insert/expunge/update, search/getNext, verify. Owns the
//! `PageCache` (C2) and the `HeaderPage` (C4); delegates the heavy lifting to
//! its sibling modules. Grounded on the teacher's `BTreeFile`
//! (`small-db::btree::file::BTreeFile`), which plays the same role —
//! `insert_tuple`/`find_leaf_page`/`split_leaf_page` — generalized here to
//! typed composite keys, variable-length entries, and the NULL side-bucket
//! step 1 calls for.

pub mod descent;
pub mod expand;
pub mod iter;
pub mod reduce;
pub mod verify;

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;

use crate::codec::compare::Compare;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::file_id::FileId;
use crate::page::HeaderPage;
pub use crate::page_cache::PageFix;
use crate::page_cache::PageCache;
use crate::paged_file::PagedFile;
use crate::physical::{OpenMode, PhysicalFile};
use crate::types::ObjectId;

pub use iter::Cursor;
pub use verify::{VerifyFinding, VerifyReport};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Packs the first `value_width` bytes of `value` into an `ObjectId`, the
/// NULL-bucket representation HeaderPage always uses (: plain
/// indices park a 4-byte row id in `page_id` with `area_id` left at 0,
/// compressed ones carry a full `(pageId, areaId)` bitmap address).
fn value_to_object_id(value: &[u8]) -> ObjectId {
    let page_id = u32::from_le_bytes(value[0..4].try_into().unwrap());
    let area_id = if value.len() >= 6 {
        u16::from_le_bytes(value[4..6].try_into().unwrap())
    } else {
        0
    };
    ObjectId { page_id, area_id }
}

fn object_id_to_value(id: ObjectId, value_width: usize) -> Vec<u8> {
    let mut out = id.page_id.to_le_bytes().to_vec();
    if value_width >= 6 {
        out.extend_from_slice(&id.area_id.to_le_bytes());
    }
    out
}

/// The paged B+ tree core. `PF` is the host's `PhysicalFile`
/// implementation; the cache and header are private to one open file
/// ("The PageCache is private to a BtreeFile and never shared").
pub struct BtreeFile<PF: PhysicalFile> {
    file_id: FileId,
    compare: Compare,
    cache: PageCache<PF>,
    header: Mutex<HeaderPage>,
}

impl<PF: PhysicalFile> BtreeFile<PF> {
    fn value_width(&self) -> usize {
        if self.file_id.compressed {
            6
        } else {
            4
        }
    }

    /// "Creation writes a HeaderPage with no root."
    pub fn create(physical: PF, config: &EngineConfig, file_id: FileId) -> Result<Self> {
        let paged_file = PagedFile::new(physical);
        let leaf_value_width = if file_id.compressed { 6 } else { 4 };
        let cache = PageCache::new(paged_file, config.cache_count, leaf_value_width, 4);
        cache.create()?;
        cache.open(OpenMode::Update)?;

        let compare = Compare::new(file_id.leaf_key_types.clone(), file_id.is_unique);
        let file = Self {
            file_id,
            compare,
            cache,
            header: Mutex::new(HeaderPage::initialize()),
        };
        file.write_header()?;
        file.cache.flush_all()?;
        Ok(file)
    }

    /// lifecycle "created → (mounted/unmounted)* → destroyed".
    pub fn mount(physical: PF, config: &EngineConfig, file_id: FileId, mode: OpenMode) -> Result<Self> {
        let paged_file = PagedFile::new(physical);
        let leaf_value_width = if file_id.compressed { 6 } else { 4 };
        let cache = PageCache::new(paged_file, config.cache_count, leaf_value_width, 4);
        cache.mount()?;
        cache.open(mode)?;

        let compare = Compare::new(file_id.leaf_key_types.clone(), file_id.is_unique);
        let header_bytes = cache.read_raw(0)?;
        let header = HeaderPage::load(&header_bytes);
        Ok(Self {
            file_id,
            compare,
            cache,
            header: Mutex::new(header),
        })
    }

    pub fn unmount(&self) -> Result<()> {
        self.flush()?;
        self.cache.unmount()
    }

    /// "Destruction removes all physical pages and, if
    /// applicable, the containing directory."
    pub fn destroy(self) -> Result<()> {
        self.cache.destroy()
    }

    pub fn open(&self, mode: OpenMode) -> Result<()> {
        self.cache.open(mode)
    }

    pub fn close(&self) -> Result<()> {
        self.flush()?;
        self.cache.close()
    }

    fn write_header(&self) -> Result<()> {
        let mut header = self.header.lock().expect("header lock poisoned");
        if !header.is_dirty() {
            return Ok(());
        }
        let mut buf = vec![0u8; self.cache.page_size()];
        header.store(&mut buf);
        self.cache.write_raw(0, &buf)?;
        header.clear_dirty();
        Ok(())
    }

    /// "flushAll" applied to the whole file, including the
    /// HeaderPage.
    pub fn flush(&self) -> Result<()> {
        self.write_header()?;
        self.cache.flush_all()
    }

    /// "recoverAll:... discards dirty changes if fix mode
    /// includes Discardable." The HeaderPage lives outside `PageCache`'s
    /// dirty-handle map ( is a singleton, not an ordinary cached
    /// page), so recovery here means discarding any in-memory HeaderPage
    /// mutation an aborted operation left behind by reloading it from disk.
    pub fn recover_all(&self) -> Result<()> {
        self.cache.recover_all()?;
        let bytes = self.cache.read_raw(0)?;
        *self.header.lock().expect("header lock poisoned") = HeaderPage::load(&bytes);
        Ok(())
    }

    pub fn start_backup(&self, restorable: bool) -> Result<()> {
        self.cache.start_backup(restorable)
    }

    pub fn end_backup(&self) -> Result<()> {
        self.cache.end_backup()
    }

    pub fn recover(&self, timestamp: u64) -> Result<()> {
        self.cache.recover(timestamp)?;
        let bytes = self.cache.read_raw(0)?;
        *self.header.lock().expect("header lock poisoned") = HeaderPage::load(&bytes);
        Ok(())
    }

    pub fn restore(&self, timestamp: u64) -> Result<()> {
        self.cache.restore(timestamp)?;
        let bytes = self.cache.read_raw(0)?;
        *self.header.lock().expect("header lock poisoned") = HeaderPage::load(&bytes);
        Ok(())
    }

    pub fn file_id(&self) -> &FileId {
        &self.file_id
    }

    pub fn compare(&self) -> &Compare {
        &self.compare
    }

    pub fn root_id(&self) -> crate::types::PageId {
        self.header.lock().expect("header lock poisoned").root_id()
    }

    pub fn tree_height(&self) -> u32 {
        self.header.lock().expect("header lock poisoned").tree_height()
    }

    pub fn total_entry_count(&self) -> u64 {
        self.header
            .lock()
            .expect("header lock poisoned")
            .total_entry_count()
    }

    pub fn null_bucket(&self) -> ObjectId {
        self.header.lock().expect("header lock poisoned").null_bucket()
    }

    pub fn all_null_bucket(&self) -> ObjectId {
        self.header
            .lock()
            .expect("header lock poisoned")
            .all_null_bucket()
    }

    /// Ensures a root leaf exists, creating a single-leaf root if the tree is
    /// currently empty ( step 3).
    fn ensure_root(&self, header: &mut HeaderPage) -> Result<()> {
        if header.has_root() {
            return Ok(());
        }
        let fix = self.cache.allocate(true)?;
        let pid = fix.pid();
        drop(fix);
        header.set_root_id(pid);
        header.set_left_leaf_id(pid);
        header.set_right_leaf_id(pid);
        header.set_tree_height(1);
        debug!("created first leaf/root, page {}", pid);
        Ok(())
    }

    /// insert: `key = None` routes to the NULL side-bucket
    /// instead of descending the tree (step 1); `is_array_null` selects the
    /// all-NULL bucket over the plain NULL bucket (bitmap variant).
    pub fn insert(&self, key: Option<&[u8]>, value: &[u8], is_array_null: bool) -> Result<()> {
        let mut header = self.header.lock().expect("header lock poisoned");

        let key = match key {
            Some(k) => k,
            None => {
                let id = value_to_object_id(value);
                if is_array_null {
                    header.set_all_null_bucket(id);
                } else {
                    header.set_null_bucket(id);
                }
                return Ok(());
            }
        };

        let mut entry = key.to_vec();
        entry.extend_from_slice(value);
        if entry.len() > self.file_id.tuple_max_size {
            return Err(Error::BadArgument(format!(
                "packed entry of {} bytes exceeds this file's tuple size {}",
                entry.len(),
                self.file_id.tuple_max_size
            )));
        }

        self.ensure_root(&mut header)?;
        let (ancestors, leaf_pid) =
            descent::find_path_to_leaf(&self.cache, &self.compare, &header, &entry, false)?
                .expect("ensure_root just guaranteed a root exists");

        if self.compare.is_unique() {
            let leaf_fix = self.cache.fix(leaf_pid, None, &self.compare)?;
            let idx = descent::lower_bound(&leaf_fix.page(), key, &self.compare)?;
            if idx < leaf_fix.page().entry_count()
                && self.compare.compare(leaf_fix.page().entry_bytes(idx), key)?
                    == std::cmp::Ordering::Equal
            {
                return Err(Error::UniquenessViolation(format!(
                    "duplicate key on page {}",
                    leaf_pid
                )));
            }
        }

        expand::insert_leaf_entry(&self.cache, &self.compare, &mut header, ancestors, leaf_pid, &entry)?;
        header.increment_count(1, now_ms());
        Ok(())
    }

    /// expunge: descend; error if the key or the exact
    /// (key, value) pair is absent; reduce the leaf if it underflows.
    pub fn expunge(&self, key: Option<&[u8]>, value: &[u8]) -> Result<()> {
        let mut header = self.header.lock().expect("header lock poisoned");

        let key = match key {
            Some(k) => k,
            None => {
                header.set_null_bucket(ObjectId::undefined());
                return Ok(());
            }
        };

        let found =
            descent::find_path_to_leaf(&self.cache, &self.compare, &header, key, false)?;
        let (ancestors, leaf_pid) = found.ok_or_else(|| {
            Error::BadArgument("expunge on an empty tree".into())
        })?;

        let idx = {
            let leaf_fix = self.cache.fix(leaf_pid, None, &self.compare)?;
            let page = leaf_fix.page();
            let mut found_idx = None;
            let mut i = descent::lower_bound(&page, key, &self.compare)?;
            while i < page.entry_count()
                && self.compare.compare(page.entry_bytes(i), key)? == std::cmp::Ordering::Equal
            {
                if page.value_bytes(i) == value {
                    found_idx = Some(i);
                    break;
                }
                i += 1;
            }
            found_idx
        };
        let idx = idx.ok_or_else(|| {
            Error::BadArgument("expunge of a non-existent (key, value) entry".into())
        })?;

        let page_size;
        {
            let mut leaf_fix = self.cache.fix(leaf_pid, None, &self.compare)?;
            leaf_fix.page_mut().erase_at(idx);
            page_size = leaf_fix.page().page_size();
        }
        header.decrement_count(1, now_ms());

        let underflow = {
            let leaf_fix = self.cache.fix(leaf_pid, None, &self.compare)?;
            leaf_fix.page().used_size() < page_size / 2
        };
        if underflow {
            reduce::reduce_page(&self.cache, &self.compare, &mut header, ancestors, leaf_pid)?;
        } else {
            reduce::handle_root_after_change(&self.cache, &self.compare, &mut header)?;
        }
        Ok(())
    }

    /// update: overwrites the value half in place; key
    /// length and position never change ("key uniqueness ensures the slot is
    /// unambiguous").
    pub fn update(&self, key: Option<&[u8]>, new_value: &[u8]) -> Result<()> {
        let header = self.header.lock().expect("header lock poisoned");

        let key = match key {
            Some(k) => k,
            None => {
                drop(header);
                let id = value_to_object_id(new_value);
                self.header.lock().expect("header lock poisoned").set_null_bucket(id);
                return Ok(());
            }
        };

        let found =
            descent::find_path_to_leaf(&self.cache, &self.compare, &header, key, false)?;
        let (_, leaf_pid) = found.ok_or_else(|| {
            Error::BadArgument("update on an empty tree".into())
        })?;

        let mut leaf_fix = self.cache.fix(leaf_pid, None, &self.compare)?;
        let idx = descent::lower_bound(&leaf_fix.page(), key, &self.compare)?;
        if idx >= leaf_fix.page().entry_count()
            || self.compare.compare(leaf_fix.page().entry_bytes(idx), key)?
                != std::cmp::Ordering::Equal
        {
            return Err(Error::BadArgument("update of a non-existent key".into()));
        }
        leaf_fix.page_mut().set_value_bytes(idx, new_value)?;
        Ok(())
    }

    /// "point get(key, outValue): descend; find; extract
    /// value; return."
    pub fn get(&self, key: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        let header = self.header.lock().expect("header lock poisoned");

        let key = match key {
            Some(k) => k,
            None => {
                let id = header.null_bucket();
                return Ok(if id.is_defined() {
                    Some(object_id_to_value(id, self.value_width()))
                } else {
                    None
                });
            }
        };

        let found =
            descent::find_path_to_leaf(&self.cache, &self.compare, &header, key, false)?;
        let (_, leaf_pid) = match found {
            Some(v) => v,
            None => return Ok(None),
        };
        let leaf_fix = self.cache.fix(leaf_pid, Some(crate::physical::FixMode::ReadOnly), &self.compare)?;
        let page = leaf_fix.page();
        let idx = descent::lower_bound(&page, key, &self.compare)?;
        if idx < page.entry_count() && self.compare.compare(page.entry_bytes(idx), key)? == std::cmp::Ordering::Equal {
            Ok(Some(page.value_bytes(idx).to_vec()))
        } else {
            Ok(None)
        }
    }

    /// iteration: an unbounded or half/fully-bounded ascending
    /// scan over the leaf chain. The bitmap overlay's NULL-bucket-first
    /// semantics are layered on top by `bitmap::BitmapOverlay`,
    /// which never touches a leaf for those rows.
    pub fn scan(&self, lower: Option<&[u8]>, upper: Option<&[u8]>) -> Result<Cursor<'_, PF>> {
        let header = self.header.lock().expect("header lock poisoned");
        let mut cursor = match lower {
            Some(lo) => Cursor::from_lower_bound(&self.cache, self.compare.clone(), &header, lo)?,
            None => Cursor::unbounded(&self.cache, self.compare.clone(), &header)?,
        };
        if let Some(hi) = upper {
            cursor = cursor.with_upper_bound(hi.to_vec());
        }
        Ok(cursor)
    }

    /// Verify.
    pub fn verify(&self, is_canceled: &dyn Fn() -> bool, continue_on_error: bool) -> Result<VerifyReport> {
        let header = self.header.lock().expect("header lock poisoned");
        verify::verify(&self.cache, &self.compare, &header, is_canceled, continue_on_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::value::LeafType;
    use crate::file_id::FileId;
    use crate::physical::FilePhysicalFile;
    use tempfile::tempdir;

    fn uint_file_id(config: &EngineConfig) -> FileId {
        FileId::build(config, vec![LeafType::UInt], true, false, 1, "").unwrap()
    }

    fn open_file(dir: &std::path::Path, config: &EngineConfig, file_id: &FileId) -> BtreeFile<FilePhysicalFile> {
        let physical = FilePhysicalFile::new(dir, file_id.page_size);
        BtreeFile::create(physical, config, file_id.clone()).unwrap()
    }

    fn key(k: u32) -> Vec<u8> {
        k.to_le_bytes().to_vec()
    }

    fn val(v: u32) -> Vec<u8> {
        v.to_le_bytes().to_vec()
    }

    #[test]
    fn single_insert_and_get_matches_scenario_1() {
        crate::test_utils::init_log();
        let dir = tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.basic_page_size_kib = 4;
        let file_id = uint_file_id(&config);
        let btree = open_file(dir.path(), &config, &file_id);

        btree.insert(Some(&key(7)), &val(100), false).unwrap();
        assert_eq!(btree.get(Some(&key(7))).unwrap(), Some(val(100)));
        assert_eq!(btree.root_id(), {
            // leftLeafId and rightLeafId must both equal rootId for a
            // single-leaf tree ( scenario 1).
            let h = btree.header.lock().unwrap();
            assert_eq!(h.root_id(), h.left_leaf_id());
            assert_eq!(h.root_id(), h.right_leaf_id());
            h.root_id()
        });
        assert_eq!(btree.tree_height(), 1);
        assert_eq!(btree.total_entry_count(), 1);
    }

    #[test]
    fn sequential_load_splits_and_scans_in_order_scenario_2() {
        crate::test_utils::init_log();
        let dir = tempdir().unwrap();
        let config = EngineConfig::default();
        let file_id = uint_file_id(&config);
        let btree = open_file(dir.path(), &config, &file_id);

        let n = 400u32;
        for k in 1..=n {
            btree.insert(Some(&key(k)), &val(k * 10), false).unwrap();
        }
        assert!(btree.tree_height() >= 2);

        let mut cursor = btree.scan(None, None).unwrap();
        let mut seen = Vec::new();
        while let Some(entry) = cursor.next().unwrap() {
            let k = u32::from_le_bytes(entry[0..4].try_into().unwrap());
            let v = u32::from_le_bytes(entry[4..8].try_into().unwrap());
            seen.push((k, v));
        }
        let expected: Vec<(u32, u32)> = (1..=n).map(|k| (k, k * 10)).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn underflow_merge_demotes_root_scenario_3() {
        crate::test_utils::init_log();
        let dir = tempdir().unwrap();
        let config = EngineConfig::default();
        let file_id = uint_file_id(&config);
        let btree = open_file(dir.path(), &config, &file_id);

        let n = 300u32;
        for k in 1..=n {
            btree.insert(Some(&key(k)), &val(k), false).unwrap();
        }
        assert!(btree.tree_height() >= 2);

        for k in (1..=n).rev() {
            btree.expunge(Some(&key(k)), &val(k)).unwrap();
        }
        assert_eq!(btree.total_entry_count(), 0);
        assert_eq!(btree.root_id(), crate::types::UNDEFINED_PAGE_ID);
        assert_eq!(btree.tree_height(), 0);
    }

    #[test]
    fn uniqueness_violation_leaves_tree_unchanged_scenario_4() {
        crate::test_utils::init_log();
        let dir = tempdir().unwrap();
        let config = EngineConfig::default();
        let file_id = uint_file_id(&config);
        let btree = open_file(dir.path(), &config, &file_id);

        btree.insert(Some(&key(5)), &val(50), false).unwrap();
        let err = btree.insert(Some(&key(5)), &val(99), false).unwrap_err();
        assert!(matches!(err, Error::UniquenessViolation(_)));
        assert_eq!(btree.get(Some(&key(5))).unwrap(), Some(val(50)));
    }

    #[test]
    fn update_changes_value_but_not_key_order() {
        crate::test_utils::init_log();
        let dir = tempdir().unwrap();
        let config = EngineConfig::default();
        let file_id = uint_file_id(&config);
        let btree = open_file(dir.path(), &config, &file_id);

        btree.insert(Some(&key(1)), &val(10), false).unwrap();
        btree.insert(Some(&key(2)), &val(20), false).unwrap();
        btree.update(Some(&key(1)), &val(999)).unwrap();
        assert_eq!(btree.get(Some(&key(1))).unwrap(), Some(val(999)));

        let mut cursor = btree.scan(None, None).unwrap();
        let first = cursor.next().unwrap().unwrap();
        assert_eq!(u32::from_le_bytes(first[0..4].try_into().unwrap()), 1);
    }

    #[test]
    fn null_key_routes_to_header_bucket() {
        crate::test_utils::init_log();
        let dir = tempdir().unwrap();
        let config = EngineConfig::default();
        let file_id = uint_file_id(&config);
        let btree = open_file(dir.path(), &config, &file_id);

        btree.insert(None, &val(77), false).unwrap();
        assert_eq!(btree.get(None).unwrap(), Some(val(77)));
        // the plain (non-bitmap) tree never grows a root for the NULL bucket.
        assert_eq!(btree.root_id(), crate::types::UNDEFINED_PAGE_ID);
    }

    #[test]
    fn flush_then_recover_is_a_no_op_on_disk_state() {
        crate::test_utils::init_log();
        let dir = tempdir().unwrap();
        let config = EngineConfig::default();
        let file_id = uint_file_id(&config);
        let btree = open_file(dir.path(), &config, &file_id);

        btree.insert(Some(&key(1)), &val(10), false).unwrap();
        btree.flush().unwrap();
        btree.recover_all().unwrap();
        assert_eq!(btree.get(Some(&key(1))).unwrap(), Some(val(10)));
        assert_eq!(btree.total_entry_count(), 1);
    }

    #[test]
    fn expunge_of_missing_entry_is_bad_argument() {
        crate::test_utils::init_log();
        let dir = tempdir().unwrap();
        let config = EngineConfig::default();
        let file_id = uint_file_id(&config);
        let btree = open_file(dir.path(), &config, &file_id);

        btree.insert(Some(&key(1)), &val(10), false).unwrap();
        let err = btree.expunge(Some(&key(2)), &val(10)).unwrap_err();
        assert!(matches!(err, Error::BadArgument(_)));
    }
}
