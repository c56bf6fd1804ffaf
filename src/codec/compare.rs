//! C6 Compare — selects per-type comparators and walks a composite key
//! column-by-column. Grounded on `Bitmap::Compare` (original_source): a
//! type tag plus a "this comparator makes entries unique" flag, with
//! `operator` walking two buffer cursors.

use std::cmp::Ordering;

use crate::error::Result;

use super::value::LeafType;

/// Assembles a whole-key comparison out of the per-column `LeafType`
/// comparators declared by a file's `FileId` ("Compare
/// assembly").
#[derive(Debug, Clone)]
pub struct Compare {
    column_types: Vec<LeafType>,
    is_unique: bool,
}

impl Compare {
    pub fn new(column_types: Vec<LeafType>, is_unique: bool) -> Self {
        Self {
            column_types,
            is_unique,
        }
    }

    pub fn is_unique(&self) -> bool {
        self.is_unique
    }

    pub fn column_types(&self) -> &[LeafType] {
        &self.column_types
    }

    /// Walks each column's codec in turn, advancing two cursors, and
    /// returns the first nonzero per-type result ("Compare
    /// assembly"). Equal composite keys compare as `Ordering::Equal`.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Result<Ordering> {
        let mut ca = a;
        let mut cb = b;
        for t in &self.column_types {
            let (ord, n) = t.compare(ca, cb)?;
            if ord != Ordering::Equal {
                return Ok(ord);
            }
            ca = &ca[n..];
            cb = &cb[n..];
        }
        Ok(Ordering::Equal)
    }

    /// Byte length, in the packed buffer, of the composite key alone (the
    /// entry's value field follows immediately after).
    pub fn key_size(&self, buf: &[u8]) -> Result<usize> {
        let mut cursor = buf;
        let mut total = 0;
        for t in &self.column_types {
            let n = t.size_of(cursor)?;
            cursor = &cursor[n..];
            total += n;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::value::Value;

    fn pack(types: &[LeafType], values: &[Value]) -> Vec<u8> {
        let mut buf = Vec::new();
        for (t, v) in types.iter().zip(values) {
            t.serialize(&mut buf, v).unwrap();
        }
        buf
    }

    #[test]
    fn composite_key_compares_column_by_column() {
        let types = vec![LeafType::Int, LeafType::UInt];
        let cmp = Compare::new(types.clone(), true);

        let a = pack(&types, &[Value::Int(1), Value::UInt(9)]);
        let b = pack(&types, &[Value::Int(1), Value::UInt(10)]);
        assert_eq!(cmp.compare(&a, &b).unwrap(), Ordering::Less);

        let c = pack(&types, &[Value::Int(2), Value::UInt(0)]);
        assert_eq!(cmp.compare(&a, &c).unwrap(), Ordering::Less);
    }
}
