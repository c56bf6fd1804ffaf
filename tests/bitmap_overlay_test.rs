//! Cross-module bitmap overlay behavior (spec.md §4.7, C9). Only compiled
//! when the `bitmap` feature is enabled: `cargo test --features bitmap`.

#![cfg(feature = "bitmap")]

use secidx_btree::bitmap::BitmapOverlay;
use secidx_btree::{EngineConfig, FileId, FilePhysicalFile, LeafType};
use tempfile::tempdir;

fn key(k: u32) -> Vec<u8> {
    k.to_le_bytes().to_vec()
}

fn open(
    key_dir: &std::path::Path,
    bitmap_dir: &std::path::Path,
    config: &EngineConfig,
) -> BitmapOverlay<FilePhysicalFile> {
    let file_id =
        FileId::build(config, vec![LeafType::UInt], false, true, 1, "").unwrap();
    let key_physical = FilePhysicalFile::new(key_dir, file_id.page_size);
    let bitmap_physical = FilePhysicalFile::new(bitmap_dir, file_id.page_size);
    BitmapOverlay::create(key_physical, bitmap_physical, config, file_id).unwrap()
}

#[test]
fn two_row_ids_under_the_same_key_both_set_a_bit() {
    let key_dir = tempdir().unwrap();
    let bitmap_dir = tempdir().unwrap();
    let config = EngineConfig::default();
    let overlay = open(key_dir.path(), bitmap_dir.path(), &config);

    overlay.insert(Some(&key(7)), 10, false).unwrap();
    overlay.insert(Some(&key(7)), 20, false).unwrap();

    let bits = overlay.get(Some(&key(7))).unwrap();
    assert!(bits.get(10).unwrap_or(false));
    assert!(bits.get(20).unwrap_or(false));
    assert!(!bits.get(11).unwrap_or(false));
}

#[test]
fn expunging_the_only_row_id_removes_the_key_entirely() {
    let key_dir = tempdir().unwrap();
    let bitmap_dir = tempdir().unwrap();
    let config = EngineConfig::default();
    let overlay = open(key_dir.path(), bitmap_dir.path(), &config);

    overlay.insert(Some(&key(3)), 5, false).unwrap();
    overlay.expunge(Some(&key(3)), 5).unwrap();

    let bits = overlay.get(Some(&key(3))).unwrap();
    assert!(bits.none());
}

#[test]
fn distinct_keys_get_independent_bitmaps() {
    let key_dir = tempdir().unwrap();
    let bitmap_dir = tempdir().unwrap();
    let config = EngineConfig::default();
    let overlay = open(key_dir.path(), bitmap_dir.path(), &config);

    overlay.insert(Some(&key(1)), 1, false).unwrap();
    overlay.insert(Some(&key(2)), 2, false).unwrap();

    let bits1 = overlay.get(Some(&key(1))).unwrap();
    let bits2 = overlay.get(Some(&key(2))).unwrap();
    assert!(bits1.get(1).unwrap_or(false));
    assert!(!bits1.get(2).unwrap_or(false));
    assert!(bits2.get(2).unwrap_or(false));
    assert!(!bits2.get(1).unwrap_or(false));
}
