//! C7 FileId — validated, durable per-file metadata.
//! Grounded on `FileCommon::HintArray` (original_source) for the
//! parenthesis/quote-aware hint grammar, and on `Bitmap::FileID`/`Btree2::FileID`
//! for the page-size-doubling and MAX_SIZE rules.

use crate::codec::value::LeafType;
use crate::config::{EngineConfig, MAX_SIZE_BITMAP_WORDS, MAX_SIZE_BTREE_WORDS};
use crate::error::{Error, Result};
use crate::types::WORD_SIZE;

#[derive(Debug, Clone)]
pub struct FileId {
    pub leaf_key_types: Vec<LeafType>,
    /// Key size, in units of 4-byte words.
    pub key_size_words: usize,
    /// Maximum packed entry size, in bytes.
    pub tuple_max_size: usize,
    /// Page size, in bytes (chosen by `choose_page_size`, always a multiple
    /// of 1 KiB and ≤ `max_page_size_kib`).
    pub page_size: usize,
    pub normalized: bool,
    pub normalizing_method: u32,
    pub compressed: bool,
    /// Monotonically increasing schema version, pinned at creation.
    pub version: u32,
    pub hint: String,
    pub is_unique: bool,
    /// `Bitmap::HeaderPage::getSplitRatio`'s fraction of a page kept on the
    /// low side of a split, parsed from the `splitratio=` hint token
    /// (default 0.5). The three-way L/M/R split this ratio governs upstream
    /// is not implemented here (`btree::expand` does a plain two-way split,
    /// see DESIGN.md); the field is retained on `FileId` so a hint carrying
    /// it round-trips intact, but `expand::split_page` does not read it.
    pub split_ratio: f32,
}

impl FileId {
    /// Builds a `FileId` from a composite key type list and a raw hint
    /// string, following five-step creation sequence.
    pub fn build(
        config: &EngineConfig,
        leaf_key_types: Vec<LeafType>,
        is_unique: bool,
        compressed: bool,
        version: u32,
        hint: &str,
    ) -> Result<Self> {
        // Step 1: split the hint string.
        let tokens = split_hint(hint);

        // Step 2/3a: normalization hints.
        let normalized = tokens.iter().any(|t| t.eq_ignore_ascii_case("normalized"));
        let normalizing_method = tokens
            .iter()
            .find_map(|t| {
                t.strip_prefix("normalizingmethod=")
                    .or_else(|| t.strip_prefix("NormalizingMethod="))
            })
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(config.default_normalizing_method);
        let split_ratio = tokens
            .iter()
            .find_map(|t| {
                t.strip_prefix("splitratio=")
                    .or_else(|| t.strip_prefix("SplitRatio="))
            })
            .and_then(|v| v.parse::<f32>().ok())
            .filter(|r| *r > 0.0 && *r < 1.0)
            .unwrap_or(0.5);

        // Step 4: infer key column count and key size; reject oversize keys.
        let mut key_size_words = 0usize;
        for t in &leaf_key_types {
            let bytes = t.fixed_size().unwrap_or_else(|| fixed_upper_bound(t));
            key_size_words += words_for(bytes);
        }

        let max_words = if compressed {
            MAX_SIZE_BITMAP_WORDS
        } else {
            MAX_SIZE_BTREE_WORDS
        };
        // value field: uint32 row id, or 6-byte object id rounded to a word.
        let value_words = if compressed { words_for(6) } else { 1 };
        let tuple_max_words = key_size_words + value_words;
        if tuple_max_words > max_words {
            return Err(Error::BadArgument(format!(
                        "composite key of {} words exceeds MAX_SIZE {} words",
                        tuple_max_words, max_words
            )));
        }

        // Step 3b: choose a page size that fits `assumed_tuple_count`
        // entries of `tuple_max_words` words, capped and rounded per
        // step 3.
        let tuple_max_size = tuple_max_words * WORD_SIZE;
        let page_size = choose_page_size(config, tuple_max_size);

        Ok(Self {
                leaf_key_types,
                key_size_words,
                tuple_max_size,
                page_size,
                normalized,
                normalizing_method,
                compressed,
                version,
                hint: hint.to_string(),
                is_unique,
                split_ratio,
        })
    }
}

fn words_for(bytes: usize) -> usize {
    (bytes + WORD_SIZE - 1) / WORD_SIZE
}

/// Variable-length columns have no static size; FileId only needs an upper
/// bound to validate against MAX_SIZE, so it uses the declared max length
/// plus the 2-byte length prefix.
fn fixed_upper_bound(t: &LeafType) -> usize {
    match t {
        LeafType::NoPadCharString { max_len } => 2 + *max_len as usize,
        LeafType::NoPadUnicodeString { max_len } => {
            2 + *max_len as usize * 2
        }
        other => other.fixed_size().unwrap_or(0),
    }
}

/// step 3: "Choose page size: start at basicPageSize (KiB),
/// double until assumedTupleCount * tupleSize fits, cap at maxPageSize,
/// round down to a power supported by the version manager."
fn choose_page_size(config: &EngineConfig, tuple_max_size: usize) -> usize {
    let mut page_size_kib = config.basic_page_size_kib.max(1);
    let needed = (config.assumed_tuple_count as usize).max(1) * tuple_max_size;
    while (page_size_kib as usize) * 1024 < needed
    && page_size_kib < config.max_page_size_kib
    {
        page_size_kib = (page_size_kib * 2).min(config.max_page_size_kib);
    }
    let page_size_kib = page_size_kib.min(config.max_page_size_kib);
    // "round down to a power supported by the version manager": the
    // version manager here only hands out power-of-two KiB page sizes.
    let mut rounded = 1u32;
    while rounded * 2 <= page_size_kib {
        rounded *= 2;
    }
    rounded as usize * 1024
}

/// Splits a hint string on commas, honoring nested `(...)` and quoted
/// `'...'`/`"..."` spans the way `FileCommon::HintArray` does, so a hint
/// like `normalized, param(1,2), name='a,b'` splits into three tokens, not
/// five.
pub fn split_hint(hint: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut current = String::new();

    for c in hint.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' => {
                    depth += 1;
                    current.push(c);
                }
                ')' => {
                    depth -= 1;
                    current.push(c);
                }
                ',' if depth <= 0 => {
                    let t = current.trim().to_string();
                    if !t.is_empty() {
                        tokens.push(t);
                    }
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }
    let t = current.trim().to_string();
    if !t.is_empty() {
        tokens.push(t);
    }
    tokens
}
