//! Cross-module expunge behavior, following the structure of the teacher's
//! `tests/btree_delete_test.rs`.

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
fn deleting_every_other_key_leaves_the_rest_in_order() {
    let dir = tempdir().unwrap();
    let config = EngineConfig::default();
    let file_id = uint_file_id(&config);
    let btree = open(dir.path(), &config, &file_id);

    let n = 200u32;
    for k in 0..n {
        btree.insert(Some(&key(k)), &val(k), false).unwrap();
    }
    for k in (0..n).step_by(2) {
        btree.expunge(Some(&key(k)), &val(k)).unwrap();
    }
    assert_eq!(btree.total_entry_count(), (n / 2) as u64);

    let mut cursor = btree.scan(None, None).unwrap();
    let mut seen = Vec::new();
    while let Some(entry) = cursor.next().unwrap() {
        seen.push(u32::from_le_bytes(entry[0..4].try_into().unwrap()));
    }
    let expected: Vec<u32> = (0..n).filter(|k| k % 2 == 1).collect();
    assert_eq!(seen, expected);
}

#[test]
fn expunging_a_key_that_was_never_inserted_is_a_bad_argument() {
    let dir = tempdir().unwrap();
    let config = EngineConfig::default();
    let file_id = uint_file_id(&config);
    let btree = open(dir.path(), &config, &file_id);

    btree.insert(Some(&key(1)), &val(1), false).unwrap();
    let err = btree.expunge(Some(&key(2)), &val(2)).unwrap_err();
    assert!(matches!(err, Error::BadArgument(_)));
}

#[test]
fn deleting_down_to_one_entry_keeps_a_single_leaf_root() {
    let dir = tempdir().unwrap();
    let config = EngineConfig::default();
    let file_id = uint_file_id(&config);
    let btree = open(dir.path(), &config, &file_id);

    let n = 150u32;
    for k in 0..n {
        btree.insert(Some(&key(k)), &val(k), false).unwrap();
    }
    for k in 1..n {
        btree.expunge(Some(&key(k)), &val(k)).unwrap();
    }
    assert_eq!(btree.total_entry_count(), 1);
    assert_eq!(btree.get(Some(&key(0))).unwrap(), Some(val(0)));
}
