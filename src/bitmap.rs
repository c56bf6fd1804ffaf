//! C9 BitmapOverlay — the compressed-bitmap value variant.
//! Feature-gated since a plain ordered index never touches the sibling
//! bitmap file (`Cargo.toml`'s `bitmap` feature). Grounded on
//! `examples/original_source/sydney/Driver/Bitmap/` (`BitmapFile`/
//! `Compressor`): a key B+ tree whose leaf values are `(pageId, areaId)`
//! pointers into a second file of per-key bit-vectors, rather than bare row
//! ids. This crate's bitmap storage is a direct packed `BitVec` per area —
//! not the original's run-length/delta compression — since reproducing that
//! exact codec is out of scope; see DESIGN.md.

use bit_vec::BitVec;

use crate::btree::BtreeFile;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::file_id::FileId;
use crate::page_cache::PageCache;
use crate::paged_file::PagedFile;
use crate::physical::{OpenMode, PhysicalFile};
use crate::types::ObjectId;

/// One physical bitmap page: a small directory of `(areaId -> byte range)`
/// followed by the packed bit-vector bytes themselves. `areaId`s are never
/// reused within a page so a stale `ObjectId` can never silently resolve to
/// a different key's bitmap after an area is freed.
struct BitmapPage {
    areas: Vec<Vec<u8>>,
}

const BITMAP_PAGE_HEADER: usize = 2;

impl BitmapPage {
    fn empty() -> Self {
        Self { areas: Vec::new() }
    }

    fn load(buffer: &[u8]) -> Self {
        if buffer.len() < BITMAP_PAGE_HEADER {
            return Self::empty();
        }
        let count = u16::from_le_bytes([buffer[0], buffer[1]]) as usize;
        let mut cursor = BITMAP_PAGE_HEADER;
        let mut areas = Vec::with_capacity(count);
        for _ in 0..count {
            let len = u16::from_le_bytes([buffer[cursor], buffer[cursor + 1]]) as usize;
            cursor += 2;
            areas.push(buffer[cursor..cursor + len].to_vec());
            cursor += len;
        }
        Self { areas }
    }

    fn store(&self, page_size: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; page_size];
        out[0..2].copy_from_slice(&(self.areas.len() as u16).to_le_bytes());
        let mut cursor = BITMAP_PAGE_HEADER;
        for area in &self.areas {
            if cursor + 2 + area.len() > page_size {
                return Err(Error::BadArgument(
                    "bitmap page overflowed; too many distinct keys landed on one page".into(),
                ));
            }
            out[cursor..cursor + 2].copy_from_slice(&(area.len() as u16).to_le_bytes());
            cursor += 2;
            out[cursor..cursor + area.len()].copy_from_slice(area);
            cursor += area.len();
        }
        Ok(out)
    }

    fn used_bytes(&self) -> usize {
        BITMAP_PAGE_HEADER + self.areas.iter().map(|a| 2 + a.len()).sum::<usize>()
    }

    fn allocate_area(&mut self) -> u16 {
        self.areas.push(Vec::new());
        (self.areas.len() - 1) as u16
    }

    fn bitmap(&self, area_id: u16) -> BitVec {
        match self.areas.get(area_id as usize) {
            Some(bytes) if !bytes.is_empty() => BitVec::from_bytes(bytes),
            _ => BitVec::new(),
        }
    }

    fn set_bitmap(&mut self, area_id: u16, bits: &BitVec) {
        self.areas[area_id as usize] = bits.to_bytes();
    }
}

fn set_bit(bits: &mut BitVec, row_id: u32) {
    let idx = row_id as usize;
    if bits.len() <= idx {
        bits.grow(idx + 1 - bits.len(), false);
    }
    bits.set(idx, true);
}

fn clear_bit(bits: &mut BitVec, row_id: u32) {
    let idx = row_id as usize;
    if idx < bits.len() {
        bits.set(idx, false);
    }
}

/// The compressed-bitmap secondary index: a key `BtreeFile` over a separate
/// companion file of per-key row-id bitmaps. NULL and
/// all-NULL keys never enter either file — they resolve straight to
/// `HeaderPage`'s null/all-null buckets, exactly as the plain variant does
/// ( resolved Open Question).
pub struct BitmapOverlay<PF: PhysicalFile> {
    keys: BtreeFile<PF>,
    bitmap_cache: PageCache<PF>,
}

impl<PF: PhysicalFile> BitmapOverlay<PF> {
    pub fn create(
        key_physical: PF,
        bitmap_physical: PF,
        config: &EngineConfig,
        file_id: FileId,
    ) -> Result<Self> {
        if !file_id.compressed {
            return Err(Error::BadArgument(
                    "BitmapOverlay requires a FileId built with compressed = true".into(),
            ));
        }
        let keys = BtreeFile::create(key_physical, config, file_id)?;

        let mut bitmap_paged = PagedFile::new(bitmap_physical);
        bitmap_paged.create()?;
        bitmap_paged.open(OpenMode::Update);
        let bitmap_cache = PageCache::new(bitmap_paged, config.cache_count, 0, 0);
        // page 0 of the bitmap file is reserved exactly like the key file's
        // HeaderPage convention, kept empty here since BitmapOverlay has no
        // metadata of its own beyond what `keys`'s HeaderPage already tracks.
        let empty = BitmapPage::empty();
        let page_size = bitmap_cache.page_size();
        bitmap_cache.write_raw(0, &empty.store(page_size)?)?;
        bitmap_cache.flush_all()?;

        Ok(Self { keys, bitmap_cache })
    }

    pub fn mount(
        key_physical: PF,
        bitmap_physical: PF,
        config: &EngineConfig,
        file_id: FileId,
        mode: OpenMode,
    ) -> Result<Self> {
        let keys = BtreeFile::mount(key_physical, config, file_id, mode)?;

        let mut bitmap_paged = PagedFile::new(bitmap_physical);
        bitmap_paged.mount()?;
        bitmap_paged.open(mode);
        let bitmap_cache = PageCache::new(bitmap_paged, config.cache_count, 0, 0);

        Ok(Self { keys, bitmap_cache })
    }

    pub fn close(&self) -> Result<()> {
        self.keys.close()?;
        self.bitmap_cache.flush_all()?;
        self.bitmap_cache.close()
    }

    pub fn flush(&self) -> Result<()> {
        self.keys.flush()?;
        self.bitmap_cache.flush_all()
    }

    /// The bitmap arena's pages are a flat directory-of-areas format, not a
    /// slotted `Page` — they never go through `PageCache::fix`, only the
    /// raw `read_raw`/`write_raw` path `HeaderPage` also uses (
    /// precedent: a page whose layout the cache never needs to parse).
    fn load_bitmap_page(&self, pid: crate::types::PageId) -> Result<BitmapPage> {
        let bytes = self.bitmap_cache.read_raw(pid)?;
        Ok(BitmapPage::load(&bytes))
    }

    fn store_bitmap_page(&self, pid: crate::types::PageId, page: &BitmapPage) -> Result<()> {
        let page_size = self.bitmap_cache.page_size();
        self.bitmap_cache.write_raw(pid, &page.store(page_size)?)
    }

    /// Finds (or creates) the bitmap area backing `key`, ORs in `row_id`,
    /// and — only on first insertion of this key — writes the new
    /// `(pageId, areaId)` pointer into the key tree.
    pub fn insert(&self, key: Option<&[u8]>, row_id: u32, is_array_null: bool) -> Result<()> {
        let existing = self.keys.get(key)?;
        match existing {
            Some(value) => {
                let id = parse_object_id(&value)?;
                let mut page = self.load_bitmap_page(id.page_id)?;
                let mut bits = page.bitmap(id.area_id);
                set_bit(&mut bits, row_id);
                page.set_bitmap(id.area_id, &bits);
                self.store_bitmap_page(id.page_id, &page)?;
                Ok(())
            }
            None => {
                let (pid, area_id) = self.allocate_area()?;
                let mut page = self.load_bitmap_page(pid)?;
                let mut bits = BitVec::new();
                set_bit(&mut bits, row_id);
                page.set_bitmap(area_id, &bits);
                self.store_bitmap_page(pid, &page)?;

                let id = ObjectId { page_id: pid, area_id };
                self.keys.insert(key, &serialize_object_id(id), is_array_null)
            }
        }
    }

    /// Clears `row_id` out of the bitmap backing `key`; if that empties the
    /// bitmap, the key is removed from the tree too ("an empty
    /// bitmap is equivalent to the key being absent").
    pub fn expunge(&self, key: Option<&[u8]>, row_id: u32) -> Result<()> {
        let value = self
            .keys
            .get(key)?
            .ok_or_else(|| Error::BadArgument("expunge of a non-existent bitmap key".into()))?;
        let id = parse_object_id(&value)?;
        let mut page = self.load_bitmap_page(id.page_id)?;
        let mut bits = page.bitmap(id.area_id);
        clear_bit(&mut bits, row_id);
        let now_empty = bits.none();
        page.set_bitmap(id.area_id, &bits);
        self.store_bitmap_page(id.page_id, &page)?;

        if now_empty {
            self.keys.expunge(key, &value)?;
        }
        Ok(())
    }

    /// Returns the row ids set for `key`, or an empty set if the key is
    /// absent ("search(key): returns the bitmap, empty if
    /// unmatched").
    pub fn get(&self, key: Option<&[u8]>) -> Result<BitVec> {
        match self.keys.get(key)? {
            Some(value) => {
                let id = parse_object_id(&value)?;
                let page = self.load_bitmap_page(id.page_id)?;
                Ok(page.bitmap(id.area_id))
            }
            None => Ok(BitVec::new()),
        }
    }

    fn allocate_area(&self) -> Result<(crate::types::PageId, u16)> {
        // Single-page arena: every key lands on page 0 until it is full,
        // then a fresh page is allocated. A directory of which pages still
        // have room would let this scale past one page of churn; out of
        // scope here (see DESIGN.md).
        let page_size = self.bitmap_cache.page_size();
        let pid = 0;
        let mut page = self.load_bitmap_page(pid)?;
        if page.used_bytes() + 2 > page_size {
            return Err(Error::NotSupported(
                "bitmap arena page is full; multi-page bitmap allocation is not implemented".into(),
            ));
        }
        let area_id = page.allocate_area();
        self.store_bitmap_page(pid, &page)?;
        Ok((pid, area_id))
    }
}

fn serialize_object_id(id: ObjectId) -> Vec<u8> {
    let mut out = id.page_id.to_le_bytes().to_vec();
    out.extend_from_slice(&id.area_id.to_le_bytes());
    out
}

fn parse_object_id(buf: &[u8]) -> Result<ObjectId> {
    if buf.len() < 6 {
        return Err(Error::BadArgument("bitmap value too short for an ObjectId".into()));
    }
    Ok(ObjectId {
        page_id: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
        area_id: u16::from_le_bytes(buf[4..6].try_into().unwrap()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::value::LeafType;
    use crate::physical::FilePhysicalFile;
    use tempfile::tempdir;

    fn file_id(config: &EngineConfig) -> FileId {
        FileId::build(config, vec![LeafType::UInt], true, true, 1, "").unwrap()
    }

    fn key(k: u32) -> Vec<u8> {
        k.to_le_bytes().to_vec()
    }

    #[test]
    fn inserting_two_row_ids_under_one_key_sets_both_bits() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::default();
        let fid = file_id(&config);
        let key_physical = FilePhysicalFile::new(dir.path().join("keys"), fid.page_size);
        let bitmap_physical = FilePhysicalFile::new(dir.path().join("bitmaps"), fid.page_size);
        let overlay = BitmapOverlay::create(key_physical, bitmap_physical, &config, fid).unwrap();

        overlay.insert(Some(&key(7)), 3, false).unwrap();
        overlay.insert(Some(&key(7)), 9, false).unwrap();

        let bits = overlay.get(Some(&key(7))).unwrap();
        assert!(bits.get(3).unwrap_or(false));
        assert!(bits.get(9).unwrap_or(false));
        assert!(!bits.get(4).unwrap_or(false));
    }

    #[test]
    fn expunging_the_last_row_id_removes_the_key() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::default();
        let fid = file_id(&config);
        let key_physical = FilePhysicalFile::new(dir.path().join("keys"), fid.page_size);
        let bitmap_physical = FilePhysicalFile::new(dir.path().join("bitmaps"), fid.page_size);
        let overlay = BitmapOverlay::create(key_physical, bitmap_physical, &config, fid).unwrap();

        overlay.insert(Some(&key(1)), 5, false).unwrap();
        overlay.expunge(Some(&key(1)), 5).unwrap();

        let bits = overlay.get(Some(&key(1))).unwrap();
        assert!(bits.none());
        assert!(overlay.keys.get(Some(&key(1))).unwrap().is_none());
    }
}
