//! Cross-module range-scan behavior, following the structure of the
//! teacher's `tests/btree_scan_test.rs`.

use secidx_btree::{BtreeFile, EngineConfig, FileId, FilePhysicalFile, LeafType};
use tempfile::tempdir;

fn uint_file_id(config: &EngineConfig) -> FileId {
    FileId::build(config, vec![LeafType::UInt], true, false, 1, "").unwrap()
}

fn open(dir: &std::path::Path, config: &EngineConfig, file_id: &FileId) -> BtreeFile<FilePhysicalFile> {
    let physical = FilePhysicalFile::new(dir, file_id.page_size);
    BtreeFile::create(physical, config, file_id.clone()).unwrap()
}

fn key(k: u32) -> Vec<u8> {
    k.to_le_bytes().to_vec()
}

fn val(v: u32) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

fn seeded_tree(dir: &std::path::Path, config: &EngineConfig, file_id: &FileId, n: u32) -> BtreeFile<FilePhysicalFile> {
    let btree = open(dir, config, file_id);
    for k in 0..n {
        btree.insert(Some(&key(k)), &val(k * 10), false).unwrap();
    }
    btree
}

#[test]
fn a_bounded_scan_returns_only_the_keys_inside_the_range() {
    let dir = tempdir().unwrap();
    let config = EngineConfig::default();
    let file_id = uint_file_id(&config);
    let btree = seeded_tree(dir.path(), &config, &file_id, 300);

    let lower = key(50);
    let upper = key(60);
    let mut cursor = btree.scan(Some(&lower), Some(&upper)).unwrap();
    let mut seen = Vec::new();
    while let Some(entry) = cursor.next().unwrap() {
        seen.push(u32::from_le_bytes(entry[0..4].try_into().unwrap()));
    }
    let expected: Vec<u32> = (50..60).collect();
    assert_eq!(seen, expected);
}

#[test]
fn a_lower_bound_with_no_upper_bound_scans_to_the_end() {
    let dir = tempdir().unwrap();
    let config = EngineConfig::default();
    let file_id = uint_file_id(&config);
    let btree = seeded_tree(dir.path(), &config, &file_id, 100);

    let lower = key(90);
    let mut cursor = btree.scan(Some(&lower), None).unwrap();
    let mut seen = Vec::new();
    while let Some(entry) = cursor.next().unwrap() {
        seen.push(u32::from_le_bytes(entry[0..4].try_into().unwrap()));
    }
    let expected: Vec<u32> = (90..100).collect();
    assert_eq!(seen, expected);
}

#[test]
fn scanning_an_empty_tree_yields_nothing() {
    let dir = tempdir().unwrap();
    let config = EngineConfig::default();
    let file_id = uint_file_id(&config);
    let btree = open(dir.path(), &config, &file_id);

    let mut cursor = btree.scan(None, None).unwrap();
    assert_eq!(cursor.next().unwrap(), None);
}
