//! Cross-module insert behavior against a real temp-file-backed
//! `FilePhysicalFile`, following the structure of the teacher's
//! `tests/btree_insert_test.rs`.

use secidx_btree::{BtreeFile, EngineConfig, Error, FileId, FilePhysicalFile, LeafType};
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

#[test]
fn inserting_many_keys_out_of_order_still_scans_ascending() {
    let dir = tempdir().unwrap();
    let config = EngineConfig::default();
    let file_id = uint_file_id(&config);
    let btree = open(dir.path(), &config, &file_id);

    let mut keys: Vec<u32> = (0..500).collect();
    // A fixed, deterministic shuffle (no RNG available to this build).
    keys.sort_by_key(|k| (k * 2654435761u32) % 500);

    for k in &keys {
        btree.insert(Some(&key(*k)), &val(*k * 3), false).unwrap();
    }
    assert_eq!(btree.total_entry_count(), 500);

    let mut cursor = btree.scan(None, None).unwrap();
    let mut seen = Vec::new();
    while let Some(entry) = cursor.next().unwrap() {
        seen.push(u32::from_le_bytes(entry[0..4].try_into().unwrap()));
    }
    let expected: Vec<u32> = (0..500).collect();
    assert_eq!(seen, expected);
}

#[test]
fn inserting_descending_keys_keeps_leftmost_leaf_separators_correct() {
    // A new minimum always descends to the leftmost leaf and, once the tree
    // has more than one leaf, lands at slot 0 of a non-root page, the one
    // insert shape ascending-order tests never reach.
    let dir = tempdir().unwrap();
    let config = EngineConfig {
        basic_page_size_kib: 1,
        max_page_size_kib: 1,
        ..EngineConfig::default()
    };
    let file_id = uint_file_id(&config);
    let btree = open(dir.path(), &config, &file_id);

    for k in (0..500u32).rev() {
        btree.insert(Some(&key(k)), &val(k), false).unwrap();
    }
    assert_eq!(btree.total_entry_count(), 500);

    let report = btree.verify(&|| false, true).unwrap();
    assert!(report.is_clean(), "findings: {:?}", report.findings);

    let mut cursor = btree.scan(None, None).unwrap();
    let mut seen = Vec::new();
    while let Some(entry) = cursor.next().unwrap() {
        seen.push(u32::from_le_bytes(entry[0..4].try_into().unwrap()));
    }
    let expected: Vec<u32> = (0..500).collect();
    assert_eq!(seen, expected);
}

#[test]
fn a_unique_index_rejects_a_duplicate_key_and_a_non_unique_index_accepts_it() {
    let dir_unique = tempdir().unwrap();
    let config = EngineConfig::default();
    let unique_file_id =
        FileId::build(&config, vec![LeafType::UInt], true, false, 1, "").unwrap();
    let unique = open(dir_unique.path(), &config, &unique_file_id);
    unique.insert(Some(&key(1)), &val(10), false).unwrap();
    let err = unique.insert(Some(&key(1)), &val(20), false).unwrap_err();
    assert!(matches!(err, Error::UniquenessViolation(_)));

    let dir_dup = tempdir().unwrap();
    let dup_file_id =
        FileId::build(&config, vec![LeafType::UInt], false, false, 1, "").unwrap();
    let dup = open(dir_dup.path(), &config, &dup_file_id);
    dup.insert(Some(&key(1)), &val(10), false).unwrap();
    dup.insert(Some(&key(1)), &val(20), false).unwrap();
    assert_eq!(dup.total_entry_count(), 2);
}

#[test]
fn inserting_a_null_key_never_touches_the_tree() {
    let dir = tempdir().unwrap();
    let config = EngineConfig::default();
    let file_id = uint_file_id(&config);
    let btree = open(dir.path(), &config, &file_id);

    btree.insert(None, &val(77), false).unwrap();
    assert_eq!(btree.total_entry_count(), 0);
    assert_eq!(btree.root_id(), secidx_btree::types::UNDEFINED_PAGE_ID);
    assert_eq!(btree.get(None).unwrap(), Some(val(77)));
}
