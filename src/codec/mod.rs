//! C5 Codec / C6 Compare — packs and unpacks typed entries into the flat
//! byte buffer a `Page` stores, and compares two already-packed buffers
//! without necessarily decoding them. Grounded on the original's
//! `Bitmap::Compare`/`Data` split (`examples/original_source/.../Compare.h`):
//! one small dispatch-by-type function for size, serialize, deserialize and
//! compare, called once per key column by `compare::Compare`.

pub mod compare;
pub mod value;

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::types::ObjectId;
use value::{Decimal, LeafType, Value};

/// Resolution of an Open Question spec.md leaves implicit: which of the
/// four string kinds are "Fixed" vs. "Variable". The
/// blank-padded kinds (`CharString`, `UnicodeString`) always occupy their
/// declared maximum width, so a page can skip over them in O(1) without
/// decoding — exactly the property "load(count)" needs from a
/// fixed type. The `NoPad*` kinds carry a 2-byte length prefix instead.
impl LeafType {
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            LeafType::Int => Some(4),
            LeafType::UInt => Some(4),
            LeafType::Int64 => Some(8),
            LeafType::Double => Some(8),
            LeafType::Decimal { .. } => Some(8),
            LeafType::DateTime => Some(8),
            LeafType::LanguageSet => Some(8),
            LeafType::ObjectId => Some(6),
            LeafType::CharString { max_len } => Some(*max_len as usize),
            LeafType::UnicodeString { max_len } => Some(*max_len as usize * 2),
            LeafType::NoPadCharString { .. } => None,
            LeafType::NoPadUnicodeString { .. } => None,
        }
    }

    /// Number of bytes the encoded value at the front of `buf` occupies,
    /// including any length prefix. For fixed types this is a constant;
    /// for variable types it is read out of the 2-byte prefix (spec.md
    /// §4.5 "Fixed vs. variable").
    pub fn size_of(&self, buf: &[u8]) -> Result<usize> {
        if let Some(n) = self.fixed_size() {
            return Ok(n);
        }
        if buf.len() < 2 {
            return Err(Error::BadArgument(
                "truncated variable-length entry".into(),
            ));
        }
        let payload = u16::from_le_bytes([buf[0], buf[1]]) as usize;
        Ok(2 + payload)
    }

    pub fn serialize(&self, out: &mut Vec<u8>, value: &Value) -> Result<()> {
        match (self, value) {
            (LeafType::Int, Value::Int(v)) => {
                out.extend_from_slice(&v.to_le_bytes());
            }
            (LeafType::UInt, Value::UInt(v)) => {
                out.extend_from_slice(&v.to_le_bytes());
            }
            (LeafType::Int64, Value::Int64(v)) => {
                out.extend_from_slice(&v.to_le_bytes());
            }
            (LeafType::Double, Value::Double(v)) => {
                out.extend_from_slice(&v.to_le_bytes());
            }
            (LeafType::Decimal { scale, .. }, Value::Decimal(d)) => {
                if d.scale != *scale {
                    return Err(Error::BadArgument(format!(
                        "decimal scale mismatch: column scale {}, value scale {}",
                        scale, d.scale
                    )));
                }
                out.extend_from_slice(&d.unscaled.to_le_bytes());
            }
            (LeafType::DateTime, Value::DateTime(v)) => {
                out.extend_from_slice(&v.to_le_bytes());
            }
            (LeafType::LanguageSet, Value::LanguageSet(v)) => {
                out.extend_from_slice(&v.to_le_bytes());
            }
            (LeafType::ObjectId, Value::ObjectId(o)) => {
                out.extend_from_slice(&o.page_id.to_le_bytes());
                out.extend_from_slice(&o.area_id.to_le_bytes());
            }
            (LeafType::CharString { max_len }, Value::Str(s)) => {
                serialize_padded(out, s.as_bytes(), *max_len as usize, b' ')?;
            }
            (LeafType::NoPadCharString { max_len }, Value::Str(s)) => {
                serialize_prefixed(out, s.as_bytes(), *max_len as usize)?;
            }
            (LeafType::UnicodeString { max_len }, Value::Str(s)) => {
                let units: Vec<u16> = s.encode_utf16().collect();
                let mut bytes = Vec::with_capacity(units.len() * 2);
                for u in &units {
                    bytes.extend_from_slice(&u.to_le_bytes());
                }
                serialize_padded(out, &bytes, *max_len as usize * 2, 0)?;
            }
            (LeafType::NoPadUnicodeString { max_len }, Value::Str(s)) => {
                let units: Vec<u16> = s.encode_utf16().collect();
                let mut bytes = Vec::with_capacity(units.len() * 2);
                for u in &units {
                    bytes.extend_from_slice(&u.to_le_bytes());
                }
                serialize_prefixed(out, &bytes, *max_len as usize * 2)?;
            }
            _ => {
                return Err(Error::NotSupported(format!(
                    "value {:?} does not match leaf type {:?}",
                    value, self
                )))
            }
        }
        Ok(())
    }

    pub fn deserialize(&self, buf: &[u8]) -> Result<(Value, usize)> {
        let need = self.size_of(buf)?;
        if buf.len() < need {
            return Err(Error::BadArgument("truncated entry buffer".into()));
        }
        let value = match self {
            LeafType::Int => Value::Int(i32::from_le_bytes(buf[0..4].try_into().unwrap())),
            LeafType::UInt => Value::UInt(u32::from_le_bytes(buf[0..4].try_into().unwrap())),
            LeafType::Int64 => Value::Int64(i64::from_le_bytes(buf[0..8].try_into().unwrap())),
            LeafType::Double => Value::Double(f64::from_le_bytes(buf[0..8].try_into().unwrap())),
            LeafType::Decimal { scale, .. } => {
                let unscaled = i64::from_le_bytes(buf[0..8].try_into().unwrap());
                Value::Decimal(Decimal {
                    unscaled,
                    scale: *scale,
                })
            }
            LeafType::DateTime => Value::DateTime(i64::from_le_bytes(buf[0..8].try_into().unwrap())),
            LeafType::LanguageSet => {
                Value::LanguageSet(u64::from_le_bytes(buf[0..8].try_into().unwrap()))
            }
            LeafType::ObjectId => {
                let page_id = u32::from_le_bytes(buf[0..4].try_into().unwrap());
                let area_id = u16::from_le_bytes(buf[4..6].try_into().unwrap());
                Value::ObjectId(ObjectId { page_id, area_id })
            }
            LeafType::CharString { .. } => {
                let trimmed = trim_trailing(&buf[..need], b' ');
                Value::Str(String::from_utf8_lossy(trimmed).into_owned())
            }
            LeafType::NoPadCharString { .. } => {
                let payload = &buf[2..need];
                Value::Str(String::from_utf8_lossy(payload).into_owned())
            }
            LeafType::UnicodeString { .. } => {
                let trimmed = trim_trailing_u16(&buf[..need]);
                Value::Str(decode_utf16_le(trimmed))
            }
            LeafType::NoPadUnicodeString { .. } => Value::Str(decode_utf16_le(&buf[2..need])),
        };
        Ok((value, need))
    }

    /// Byte-wise comparison of two already-packed, same-typed fields,
    /// positioned at the front of `a`/`b`. Returns `(ordering, bytes
    /// consumed from each side)` so `compare::Compare` can advance its two
    /// cursors.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Result<(Ordering, usize)> {
        let (va, na) = self.deserialize(a)?;
        let (vb, nb) = self.deserialize(b)?;
        debug_assert_eq!(na, nb, "same leaf type must consume equal bytes");
        Ok((compare_values(&va, &vb), na))
    }

    /// SQL `LIKE`-style match; only meaningful for string types (spec.md
    /// §4.5 "like(patternBuf, textBuf, escape)... string types only").
    pub fn like(&self, pattern_buf: &[u8], text_buf: &[u8], escape: Option<char>) -> Result<bool> {
        let (pattern, _) = self.deserialize(pattern_buf)?;
        let (text, _) = self.deserialize(text_buf)?;
        match (pattern, text) {
            (Value::Str(p), Value::Str(t)) => Ok(like_match(&p, &t, escape)),
            _ => Err(Error::NotSupported(
                "LIKE is only defined for string leaf types".into(),
            )),
        }
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::UInt(x), Value::UInt(y)) => x.cmp(y),
        (Value::Int64(x), Value::Int64(y)) => x.cmp(y),
        (Value::Double(x), Value::Double(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Decimal(x), Value::Decimal(y)) => x.unscaled.cmp(&y.unscaled),
        (Value::DateTime(x), Value::DateTime(y)) => x.cmp(y),
        (Value::LanguageSet(x), Value::LanguageSet(y)) => x.cmp(y),
        (Value::ObjectId(x), Value::ObjectId(y)) => {
            (x.page_id, x.area_id).cmp(&(y.page_id, y.area_id))
        }
        (Value::Str(x), Value::Str(y)) => x.as_bytes().cmp(y.as_bytes()),
        _ => Ordering::Equal,
    }
}

fn serialize_padded(out: &mut Vec<u8>, payload: &[u8], max_len: usize, pad: u8) -> Result<()> {
    if payload.len() > max_len {
        return Err(Error::BadArgument(format!(
            "value of {} bytes exceeds declared width {}",
            payload.len(),
            max_len
        )));
    }
    out.extend_from_slice(payload);
    out.resize(out.len() + (max_len - payload.len()), pad);
    Ok(())
}

fn serialize_prefixed(out: &mut Vec<u8>, payload: &[u8], max_len: usize) -> Result<()> {
    if payload.len() > max_len {
        return Err(Error::BadArgument(format!(
            "value of {} bytes exceeds declared width {}",
            payload.len(),
            max_len
        )));
    }
    if payload.len() > u16::MAX as usize {
        return Err(Error::BadArgument("value too long".into()));
    }
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(payload);
    Ok(())
}

fn trim_trailing(buf: &[u8], pad: u8) -> &[u8] {
    let mut end = buf.len();
    while end > 0 && buf[end - 1] == pad {
        end -= 1;
    }
    &buf[..end]
}

fn trim_trailing_u16(buf: &[u8]) -> &[u8] {
    let mut end = buf.len();
    while end >= 2 && buf[end - 2] == 0 && buf[end - 1] == 0 {
        end -= 2;
    }
    &buf[..end]
}

fn decode_utf16_le(buf: &[u8]) -> String {
    let units: Vec<u16> = buf
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// A minimal SQL `LIKE`: `%` matches any run, `_` matches one character,
/// `escape` (if given) makes the following character literal.
fn like_match(pattern: &str, text: &str, escape: Option<char>) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    like_match_inner(&p, &t, escape)
}

fn like_match_inner(p: &[char], t: &[char], escape: Option<char>) -> bool {
    let mut pi = 0;
    let mut ti = 0;
    let mut star_p: Option<usize> = None;
    let mut star_t = 0;

    while ti < t.len() {
        let literal = pi < p.len() && Some(p[pi]) == escape;
        let cur = if literal {
            p.get(pi + 1).copied()
        } else {
            p.get(pi).copied()
        };

        if !literal && cur == Some('%') {
            star_p = Some(pi);
            star_t = ti;
            pi += 1;
            continue;
        }
        let matches_one = cur == Some('_') && !literal;
        if cur.is_some() && (matches_one || cur == Some(t[ti])) {
            pi += if literal { 2 } else { 1 };
            ti += 1;
            continue;
        }
        if let Some(sp) = star_p {
            pi = sp + 1;
            star_t += 1;
            ti = star_t;
            continue;
        }
        return false;
    }
    while pi < p.len() && p[pi] == '%' {
        pi += 1;
    }
    pi == p.len()
}
