//! The slotted Node/Leaf page: a fixed-size header followed by a packed,
//! sorted entry region. The slot vector (byte offsets into the buffer) is
//! rebuilt at load time and never persisted (spec.md §4.3 "slot offsets are
//! recomputed at load time and are not persisted"); on disk there is
//! nothing but the header and the entries themselves, back to back.
//!
//! Grounded in shape on the teacher's `BTreeLeafPage`/`BTreeInternalPage`
//! (`small-db::btree::page`), generalized from that fixed-slot/bitmap-header
//! design to the variable-length, compacted layout spec.md §3.3 calls for.

use crate::error::{Error, Result};
use crate::types::{is_defined, PageId, UNDEFINED_PAGE_ID};

/// `entryCount | leafBit` (4) + `prevPageId` (4) + `nextPageId` (4).
pub const HEADER_SIZE_BYTES: usize = 12;

const LEAF_BIT: u32 = 0x8000_0000;

/// A function that, given a buffer positioned at the start of one entry,
/// returns how many bytes that entry's key portion occupies. This is
/// `Compare::key_size` in practice; `Page` takes it as a closure so it
/// never needs to know about `FileId`/`Codec` directly.
pub type KeySizer<'a> = &'a dyn Fn(&[u8]) -> Result<usize>;

pub struct Page {
    pid: PageId,
    page_size: usize,
    is_leaf: bool,
    prev: PageId,
    next: PageId,
    /// `HEADER_SIZE_BYTES` + packed entries, padded with zeros to
    /// `page_size`.
    buffer: Vec<u8>,
    /// Byte offsets of each entry, plus one sentinel at `end`. Length is
    /// always `entry_count + 1`.
    slots: Vec<usize>,
    /// Fixed width, in bytes, of the value field following each entry's
    /// key (spec.md §3.2: uint32 row id, 6-byte object id, or a child
    /// page id).
    value_width: usize,
}

/// Reads the leaf bit out of a freshly-read page buffer without fully
/// loading it, so the caller can pick the right value width (row id vs.
/// bitmap object id) before calling `Page::load`.
pub fn peek_is_leaf(buffer: &[u8]) -> bool {
    let raw = u32::from_le_bytes(buffer[0..4].try_into().unwrap());
    raw & LEAF_BIT != 0
}

impl Page {
    /// Builds an empty page of the given kind.
    pub fn empty(pid: PageId, page_size: usize, is_leaf: bool, value_width: usize) -> Self {
        Self {
            pid,
            page_size,
            is_leaf,
            prev: UNDEFINED_PAGE_ID,
            next: UNDEFINED_PAGE_ID,
            buffer: vec![0u8; page_size],
            slots: vec![HEADER_SIZE_BYTES],
            value_width,
        }
    }

    /// "load(count): given the header's entry count, fill the
    /// slot vector by walking the buffer... The sentinel end-slot points
    /// to the first byte past the last entry."
    pub fn load(
        pid: PageId,
        buffer: Vec<u8>,
        value_width: usize,
        key_sizer: KeySizer,
    ) -> Result<Self> {
        if buffer.len() < HEADER_SIZE_BYTES {
            return Err(Error::BadArgument("page buffer too small".into()));
        }
        let page_size = buffer.len();
        let raw_count = u32::from_le_bytes(buffer[0..4].try_into().unwrap());
        let is_leaf = raw_count & LEAF_BIT != 0;
        let entry_count = (raw_count & !LEAF_BIT) as usize;
        let prev = u32::from_le_bytes(buffer[4..8].try_into().unwrap());
        let next = u32::from_le_bytes(buffer[8..12].try_into().unwrap());

        let mut slots = Vec::with_capacity(entry_count + 1);
        let mut offset = HEADER_SIZE_BYTES;
        slots.push(offset);
        for _ in 0..entry_count {
            let key_len = key_sizer(&buffer[offset..])?;
            offset += key_len + value_width;
            slots.push(offset);
        }

        Ok(Self {
            pid,
            page_size,
            is_leaf,
            prev,
            next,
            buffer,
            slots,
            value_width,
        })
    }

    pub fn pid(&self) -> PageId {
        self.pid
    }

    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    pub fn set_leaf(&mut self, is_leaf: bool) {
        self.is_leaf = is_leaf;
    }

    pub fn prev(&self) -> PageId {
        self.prev
    }

    pub fn set_prev(&mut self, prev: PageId) {
        self.prev = prev;
    }

    pub fn next(&self) -> PageId {
        self.next
    }

    pub fn set_next(&mut self, next: PageId) {
        self.next = next;
    }

    /// "A page is the root iff both sibling pointers are
    /// Undefined."
    pub fn is_root(&self) -> bool {
        !is_defined(self.prev) && !is_defined(self.next)
    }

    pub fn entry_count(&self) -> usize {
        self.slots.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    fn begin(&self) -> usize {
        self.slots[0]
    }

    fn end(&self) -> usize {
        *self.slots.last().unwrap()
    }

    /// "end − begin yields used size in words" (here:
    /// bytes, since this crate's buffers are addressed byte-wise).
    pub fn used_size(&self) -> usize {
        self.end() - self.begin()
    }

    pub fn free_size(&self) -> usize {
        self.page_size - HEADER_SIZE_BYTES - self.used_size()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn entry_bytes(&self, i: usize) -> &[u8] {
        &self.buffer[self.slots[i]..self.slots[i + 1]]
    }

    pub fn first_entry(&self) -> Option<&[u8]> {
        if self.is_empty() {
            None
        } else {
            Some(self.entry_bytes(0))
        }
    }

    pub fn last_entry(&self) -> Option<&[u8]> {
        let n = self.entry_count();
        if n == 0 {
            None
        } else {
            Some(self.entry_bytes(n - 1))
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &[u8]> {
        (0..self.entry_count()).map(move |i| self.entry_bytes(i))
    }

    /// The value field of entry `i`, i.e. the trailing `value_width` bytes.
    pub fn value_bytes(&self, i: usize) -> &[u8] {
        let bytes = self.entry_bytes(i);
        &bytes[bytes.len() - self.value_width..]
    }

    /// Overwrites entry `i`'s trailing value field in place without moving
    /// any other entry (spec.md §4.4.B update: "Must not change key length;
    /// key uniqueness ensures the slot is unambiguous.").
    pub fn set_value_bytes(&mut self, i: usize, new_value: &[u8]) -> Result<()> {
        if new_value.len() != self.value_width {
            return Err(Error::BadArgument(format!(
                "update value of {} bytes does not match this file's value width {}",
                new_value.len(),
                self.value_width
            )));
        }
        let end = self.slots[i + 1];
        let start = end - self.value_width;
        self.buffer[start..end].copy_from_slice(new_value);
        Ok(())
    }

    /// "insertAt(iter, srcBuffer, words): memmove the suffix
    /// forward, memcpy the new entry, patch all slots ≥ iter by +words,
    /// insert a new slot, increment count." Operates on this page alone: if
    /// `i == 0` and this page is not the root, the caller is responsible for
    /// rewriting the delegate-key this page's parent holds (this page's
    /// first entry just changed), since a single `Page` has no way to reach
    /// its parent or the `Compare` needed to rebuild that entry. See
    /// `btree::expand::insert_entry_or_split` and
    /// `btree::expand::fixup_ancestor_chain`.
    pub fn insert_at(&mut self, i: usize, entry: &[u8]) -> Result<()> {
        if entry.len() > self.free_size() {
            return Err(Error::BadArgument(
                "entry does not fit in free space".into(),
            ));
        }
        let at = self.slots[i];
        let tail_start = self.end();
        let grow = entry.len();

        // memmove the suffix forward by `grow` bytes.
        self.buffer.copy_within(at..tail_start, at + grow);
        self.buffer[at..at + grow].copy_from_slice(entry);

        for s in self.slots.iter_mut().skip(i + 1) {
            *s += grow;
        }
        self.slots.insert(i + 1, at + grow);
        Ok(())
    }

    /// "eraseAt(iter): symmetric; if count becomes 0 and this
    /// is the root, mark the root undefined on HeaderPage." (root handling
    /// lives in the B+ tree façade, not here.)
    pub fn erase_at(&mut self, i: usize) {
        let start = self.slots[i];
        let removed = self.slots[i + 1] - start;
        let tail_start = self.slots[i + 1];
        let tail_end = self.end();

        self.buffer.copy_within(tail_start..tail_end, start);
        for s in self.slots.iter_mut().skip(i + 2) {
            *s -= removed;
        }
        self.slots.remove(i + 1);
    }

    /// Removes and returns the last `n` entries, for use by split/reduce.
    pub fn take_suffix(&mut self, n: usize) -> Vec<Vec<u8>> {
        let total = self.entry_count();
        let start = total - n;
        let mut out = Vec::with_capacity(n);
        for i in (start..total).rev() {
            out.push(self.entry_bytes(i).to_vec());
            self.erase_at(i);
        }
        out.reverse();
        out
    }

    /// Removes and returns the first `n` entries.
    pub fn take_prefix(&mut self, n: usize) -> Vec<Vec<u8>> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.entry_bytes(0).to_vec());
            self.erase_at(0);
        }
        out
    }

    /// Appends already-sorted entries to the end of the page.
    pub fn append_entries(&mut self, entries: &[Vec<u8>]) -> Result<()> {
        for e in entries {
            let at = self.entry_count();
            self.insert_at(at, e)?;
        }
        Ok(())
    }

    /// Prepends already-sorted entries to the front of the page.
    pub fn prepend_entries(&mut self, entries: &[Vec<u8>]) -> Result<()> {
        for (i, e) in entries.iter().enumerate() {
            self.insert_at(i, e)?;
        }
        Ok(())
    }

    /// "concatenate(prev): move all entries to prev, re-link
    /// siblings... free self." The actual free + HeaderPage sibling
    /// bookkeeping is driven by `btree::reduce`; this just does the byte
    /// move.
    pub fn drain_into(&mut self, dst: &mut Page) -> Result<()> {
        let all = self.take_suffix(self.entry_count());
        dst.append_entries(&all)
    }

    /// Rewrites the page's on-disk byte image (header + compacted
    /// entries) and returns it for `PagedFile::write_back`.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.buffer.clone();
        let count = self.entry_count() as u32;
        let raw = if self.is_leaf {
            count | LEAF_BIT
        } else {
            count
        };
        out[0..4].copy_from_slice(&raw.to_le_bytes());
        out[4..8].copy_from_slice(&self.prev.to_le_bytes());
        out[8..12].copy_from_slice(&self.next.to_le_bytes());
        // zero the dead suffix past the last entry so re-loads never read
        // stale bytes as part of a resized entry.
        let end = self.end();
        for b in out.iter_mut().skip(end) {
            *b = 0;
        }
        out
    }

    pub fn value_width(&self) -> usize {
        self.value_width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_key_sizer(n: usize) -> impl Fn(&[u8]) -> Result<usize> {
        move |_| Ok(n)
    }

    #[test]
    fn insert_and_erase_keep_entries_contiguous() {
        let mut page = Page::empty(1, 256, true, 4);
        page.insert_at(0, &[1, 0, 0, 0, 9, 0, 0, 0]).unwrap();
        page.insert_at(1, &[2, 0, 0, 0, 8, 0, 0, 0]).unwrap();
        assert_eq!(page.entry_count(), 2);
        assert_eq!(page.used_size(), 16);

        page.erase_at(0);
        assert_eq!(page.entry_count(), 1);
        assert_eq!(page.entry_bytes(0), &[2, 0, 0, 0, 8, 0, 0, 0]);
    }

    #[test]
    fn round_trips_through_serialize_and_load() {
        let mut page = Page::empty(3, 256, false, 4);
        page.set_prev(7);
        page.set_next(9);
        page.insert_at(0, &[5, 0, 0, 0, 1, 0, 0, 0]).unwrap();
        page.insert_at(1, &[6, 0, 0, 0, 2, 0, 0, 0]).unwrap();

        let bytes = page.serialize();
        let sizer = fixed_key_sizer(4);
        let loaded = Page::load(3, bytes, 4, &sizer).unwrap();
        assert_eq!(loaded.entry_count(), 2);
        assert!(!loaded.is_leaf());
        assert_eq!(loaded.prev(), 7);
        assert_eq!(loaded.next(), 9);
        assert_eq!(loaded.entry_bytes(1), &[6, 0, 0, 0, 2, 0, 0, 0]);
    }

    #[test]
    fn take_suffix_removes_from_the_end() {
        let mut page = Page::empty(1, 256, true, 4);
        for i in 0..5u32 {
            let mut entry = i.to_le_bytes().to_vec();
            entry.extend_from_slice(&[0, 0, 0, 0]);
            page.insert_at(page.entry_count(), &entry).unwrap();
        }
        let tail = page.take_suffix(2);
        assert_eq!(page.entry_count(), 3);
        assert_eq!(tail.len(), 2);
        assert_eq!(&tail[0][0..4], &3u32.to_le_bytes());
        assert_eq!(&tail[1][0..4], &4u32.to_le_bytes());
    }
}
