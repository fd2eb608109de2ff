//! Batch feed context.
//!
//! A [`Feed`] carries the host-side arrays one encoding call needs. Callers
//! build a fresh one per batch and thread it through each vocabulary's
//! `set_placeholders`.

use std::collections::{BTreeMap, HashMap};

use crate::{
    bucket::PAD_WORD,
    error::{SubtokenError, SubtokenResult},
};

/// Character ids of the requested members of one bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketFeed {
    /// Bucket position in the store.
    pub bucket: usize,
    pub width: usize,
    /// Row-major `rows × width` ids, padded with the pad id.
    pub char_ids: Vec<usize>,
    pub seq_lengths: Vec<usize>,
}

impl BucketFeed {
    pub fn rows(&self) -> usize {
        self.seq_lengths.len()
    }
}

/// Per-bucket inputs plus the permutation back to request order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MultibucketFeed {
    /// Non-empty buckets, in bucket order.
    pub buckets: Vec<BucketFeed>,
    /// Requested position -> row of the concatenated bucket outputs.
    pub gather: Vec<usize>,
}

/// Everything one vocabulary needs to encode a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubtokenFeed {
    pub shape: Vec<usize>,
    /// Batch position -> index into the batch's unique words.
    pub inverse: Vec<usize>,
    pub multibucket: MultibucketFeed,
}

#[derive(Clone, Debug, Default)]
pub struct Feed {
    entries: BTreeMap<String, SubtokenFeed>,
}

impl Feed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: SubtokenFeed) {
        self.entries.insert(key.into(), entry);
    }

    pub fn get(&self, key: &str) -> Option<&SubtokenFeed> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A multidimensional array of word indices, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WordBatch {
    shape: Vec<usize>,
    indices: Vec<usize>,
}

impl WordBatch {
    pub fn new(shape: Vec<usize>, indices: Vec<usize>) -> SubtokenResult<Self> {
        let expected = shape.iter().product::<usize>();
        if expected != indices.len() {
            return Err(SubtokenError::ShapeMismatch {
                shape,
                expected,
                actual: indices.len(),
            });
        }
        Ok(Self { shape, indices })
    }

    /// A `(sentences, max_len)` batch, short rows padded with [`PAD_WORD`].
    pub fn from_rows<R: AsRef<[usize]>>(rows: &[R]) -> Self {
        let width = rows.iter().map(|r| r.as_ref().len()).max().unwrap_or(0);
        let mut indices = Vec::with_capacity(rows.len() * width);
        for row in rows {
            let row = row.as_ref();
            indices.extend_from_slice(row);
            indices.extend(std::iter::repeat_n(PAD_WORD, width - row.len()));
        }
        Self {
            shape: vec![rows.len(), width],
            indices,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Unique values in first-seen order, and each input's position among them.
pub fn unique_with_inverse(values: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let mut positions = HashMap::with_capacity(values.len());
    let mut unique = Vec::new();
    let inverse = values
        .iter()
        .map(|v| {
            *positions.entry(*v).or_insert_with(|| {
                unique.push(*v);
                unique.len() - 1
            })
        })
        .collect();
    (unique, inverse)
}
