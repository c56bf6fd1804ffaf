//! §6.4 Catalog (consumed) — opaque schema-metadata handles the core reads
//! but never owns or persists ("the core never opens the catalog's own
//! tables; it only receives pre-resolved objects"). Grounded on spec.md
//! §9's resolved strategy for the catalog's cyclic object graph: callers
//! pass stable 64-bit ids across this boundary and resolve through their own
//! arena, so this module only declares the accessor surface, not storage.

use crate::codec::value::LeafType;

/// A resolved column's type and nullability, the minimum a `FileId` needs
/// to build a `Compare` ("column type").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnType {
    pub leaf_type: LeafType,
    pub nullable: bool,
}

/// One schema object, identified by a stable id the catalog itself owns.
/// This core treats every field as read-only; only the host's catalog
/// component ever constructs or mutates one.
pub trait CatalogObject {
    fn object_id(&self) -> u64;
    fn name(&self) -> &str;
}

/// A table handle: id, name, and the column ids that belong to it, in
/// declaration order.
pub trait TableHandle: CatalogObject {
    fn column_ids(&self) -> &[u64];
}

/// A column handle: id, name, type, and nullability.
pub trait ColumnHandle: CatalogObject {
    fn column_type(&self) -> ColumnType;
}

/// An index handle: id, name, the column ids forming its composite key (in
/// key order), uniqueness, and whether it is the compressed-bitmap variant
/// ("index id"; §4.6 "is_unique"/"compressed" feed `FileId`).
pub trait IndexHandle: CatalogObject {
    fn key_column_ids(&self) -> &[u64];
    fn is_unique(&self) -> bool;
    fn is_bitmap(&self) -> bool;
    /// The raw hint string this index was declared with ( step
    /// 1), e.g. `"normalized, splitratio=0.33"`.
    fn hint(&self) -> &str;
}

/// An in-memory `CatalogObject`/`IndexHandle` implementation for tests and
/// for hosts too small to need their own arena-backed catalog.
#[derive(Debug, Clone)]
pub struct StaticIndex {
    pub object_id: u64,
    pub name: String,
    pub key_column_ids: Vec<u64>,
    pub is_unique: bool,
    pub is_bitmap: bool,
    pub hint: String,
}

impl CatalogObject for StaticIndex {
    fn object_id(&self) -> u64 {
        self.object_id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl IndexHandle for StaticIndex {
    fn key_column_ids(&self) -> &[u64] {
        &self.key_column_ids
    }

    fn is_unique(&self) -> bool {
        self.is_unique
    }

    fn is_bitmap(&self) -> bool {
        self.is_bitmap
    }

    fn hint(&self) -> &str {
        &self.hint
    }
}
