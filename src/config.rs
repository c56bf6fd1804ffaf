//! `EngineConfig` — the explicit, host-supplied replacement for the module
//! globals the original C++ driver kept as static parameters
//! (`basicPageSize`, the default normalizing method id,...). See DESIGN
//! NOTES §9 "Global mutable state": read at file-create time, overridden
//! per-file by hint strings layered on top, never a process-wide `static`.

/// Maximum packed entry size, in 4-byte words, for an ordinary B+ tree file
/// ( step 4: "MAX_SIZE is... 1250 for B+ tree").
pub const MAX_SIZE_BTREE_WORDS: usize = 1250;

/// Maximum packed entry size, in 4-byte words, for the bitmap-index variant
/// ( step 4: "MAX_SIZE is 250 for bitmap").
pub const MAX_SIZE_BITMAP_WORDS: usize = 250;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Starting page size candidate, in KiB, before doubling to fit the
    /// assumed tuple count ( step 3).
    pub basic_page_size_kib: u32,
    /// Hard cap on page size, in KiB.
    pub max_page_size_kib: u32,
    /// Planning assumption used only to pick an initial page size; not
    /// enforced at runtime.
    pub assumed_tuple_count: u32,
    /// Default bound on `PageCache`'s idle, clean handle count (spec.md
    /// §4.2 "configured cacheCount").
    pub cache_count: usize,
    /// Normalizing method id used when a file's hint does not name one
    /// explicitly ("Normalization").
    pub default_normalizing_method: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            basic_page_size_kib: 4,
            max_page_size_kib: 64,
            assumed_tuple_count: 1,
            cache_count: 256,
            default_normalizing_method: 0,
        }
    }
}
