//! Bucketed storage for variable-length character sequences.
//!
//! Each distinct word form gets one sequence and one word index. On
//! [`Multibucket::close`] sequences are grouped into a few length buckets,
//! each padded only to its own width.

pub mod split;

use crate::{
    error::{SubtokenError, SubtokenResult},
    feed::{BucketFeed, MultibucketFeed},
    vocab::SpecialToken,
};

/// Word index reserved for batch padding; its sequence is empty.
pub const PAD_WORD: usize = 0;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum StoreState {
    Idle,
    Open,
    Closed,
}

/// One length bucket: member word indices and their padded character ids.
#[derive(Clone, Debug)]
pub struct Bucket {
    width: usize,
    members: Vec<usize>,
    buffer: Vec<usize>,
}

impl Bucket {
    fn new(width: usize) -> Self {
        Self {
            width,
            members: Vec::new(),
            buffer: Vec::new(),
        }
    }

    fn push(&mut self, word: usize, ids: &[usize]) -> usize {
        let pos = self.members.len();
        self.members.push(word);
        self.buffer.extend_from_slice(ids);
        self.buffer.extend(
            std::iter::repeat_n(SpecialToken::Pad.index(), self.width - ids.len()),
        );
        pos
    }

    pub fn width(&self) -> usize {
        self.width
    }
    pub fn members(&self) -> &[usize] {
        &self.members
    }
    pub fn len(&self) -> usize {
        self.members.len()
    }
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Padded character ids of the member at `pos`.
    pub fn row(&self, pos: usize) -> &[usize] {
        &self.buffer[pos * self.width..(pos + 1) * self.width]
    }
}

/// Sequence store that hands out word indices and length buckets.
#[derive(Clone, Debug)]
pub struct Multibucket {
    max_buckets: usize,
    state: StoreState,
    sequences: Vec<Vec<usize>>,
    tokens: Vec<Vec<char>>,
    buckets: Vec<Bucket>,
    /// Word index -> (bucket, position in bucket), valid while closed.
    assignment: Vec<(usize, usize)>,
}

impl Multibucket {
    pub fn new(max_buckets: usize) -> Self {
        Self {
            max_buckets: max_buckets.max(1),
            state: StoreState::Idle,
            sequences: vec![Vec::new()],
            tokens: vec![Vec::new()],
            buckets: Vec::new(),
            assignment: Vec::new(),
        }
    }

    pub fn max_buckets(&self) -> usize {
        self.max_buckets
    }

    /// Number of word indices handed out, the padding word included.
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.len() == 1
    }

    pub fn is_open(&self) -> bool {
        self.state == StoreState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state == StoreState::Closed
    }

    /// Accepts new sequences. Bucket assignments from a previous close are dropped.
    pub fn open(&mut self) {
        self.buckets.clear();
        self.assignment.clear();
        self.state = StoreState::Open;
    }

    /// Stores a sequence and returns its word index.
    ///
    /// Every call appends a new entry; deduplication is the caller's job.
    pub fn add(&mut self, ids: Vec<usize>, chars: Vec<char>) -> SubtokenResult<usize> {
        if self.state != StoreState::Open {
            return Err(SubtokenError::StoreNotOpen);
        }
        let index = self.sequences.len();
        self.sequences.push(ids);
        self.tokens.push(chars);
        Ok(index)
    }

    pub fn sequence(&self, word: usize) -> Option<&[usize]> {
        self.sequences.get(word).map(Vec::as_slice)
    }

    pub fn chars(&self, word: usize) -> Option<&[char]> {
        self.tokens.get(word).map(Vec::as_slice)
    }

    /// Assigns every stored sequence to a bucket and fills the padded buffers.
    pub fn close(&mut self) {
        let widths = split::split_widths(self.sequences.iter().map(Vec::len), self.max_buckets);
        let mut buckets: Vec<Bucket> = widths.iter().map(|w| Bucket::new(*w)).collect();
        let mut assignment = Vec::with_capacity(self.sequences.len());
        for (word, ids) in self.sequences.iter().enumerate() {
            let b = widths.partition_point(|w| *w < ids.len());
            let pos = buckets[b].push(word, ids);
            assignment.push((b, pos));
        }

        log::info!(
            "closed {} sequences into {} buckets, widths {:?}",
            self.sequences.len(),
            buckets.len(),
            widths
        );
        for (b, bucket) in buckets.iter().enumerate() {
            log::debug!("bucket {b}: width {}, {} members", bucket.width, bucket.len());
        }

        self.buckets = buckets;
        self.assignment = assignment;
        self.state = StoreState::Closed;
    }

    /// Drops every stored sequence except the padding word.
    pub fn reset(&mut self) {
        self.sequences.truncate(1);
        self.tokens.truncate(1);
        self.buckets.clear();
        self.assignment.clear();
        self.state = StoreState::Idle;
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// `(bucket, position)` of `word`, once closed.
    pub fn assignment(&self, word: usize) -> Option<(usize, usize)> {
        self.assignment.get(word).copied()
    }

    /// Collects the bucket rows for `words` and the permutation that maps
    /// each requested position to its row in the concatenated bucket outputs.
    ///
    /// Buckets no requested word falls into are left out.
    pub fn set_placeholders(&self, words: &[usize]) -> SubtokenResult<MultibucketFeed> {
        if self.state != StoreState::Closed {
            return Err(SubtokenError::StoreNotClosed);
        }

        let mut rows: Vec<Vec<usize>> = vec![Vec::new(); self.buckets.len()];
        let mut slots = Vec::with_capacity(words.len());
        for &word in words {
            let (b, pos) = self
                .assignment(word)
                .ok_or(SubtokenError::IndexNotFound(word))?;
            slots.push((b, rows[b].len()));
            rows[b].push(pos);
        }

        let mut offsets = vec![0; self.buckets.len()];
        let mut feeds = Vec::new();
        let mut total = 0;
        for (b, positions) in rows.into_iter().enumerate() {
            offsets[b] = total;
            if positions.is_empty() {
                continue;
            }
            total += positions.len();
            let bucket = &self.buckets[b];
            feeds.push(BucketFeed {
                bucket: b,
                width: bucket.width,
                char_ids: positions
                    .iter()
                    .flat_map(|pos| bucket.row(*pos).iter().copied())
                    .collect(),
                seq_lengths: positions
                    .iter()
                    .map(|pos| self.sequences[bucket.members[*pos]].len())
                    .collect(),
            });
        }

        Ok(MultibucketFeed {
            buckets: feeds,
            gather: slots.into_iter().map(|(b, row)| offsets[b] + row).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn filled(max_buckets: usize, words: &[&str]) -> Multibucket {
        let mut store = Multibucket::new(max_buckets);
        store.open();
        for word in words {
            let ids = word.chars().map(|c| c as usize).collect();
            store.add(ids, word.chars().collect()).unwrap();
        }
        store
    }

    #[test]
    fn test_add_requires_open() {
        let mut store = Multibucket::new(2);
        assert!(matches!(
            store.add(vec![5], vec!['a']),
            Err(SubtokenError::StoreNotOpen)
        ));
        store.open();
        assert_eq!(store.add(vec![5], vec!['a']).unwrap(), 1);
        store.close();
        assert!(matches!(
            store.add(vec![6], vec!['b']),
            Err(SubtokenError::StoreNotOpen)
        ));
    }

    #[test]
    fn test_close_partitions_all_words() {
        let mut store = filled(3, &["a", "to", "cat", "house", "elephant", "hippopotamus"]);
        store.close();

        assert!(store.buckets().len() <= 3);
        let mut seen = BTreeSet::new();
        for bucket in store.buckets() {
            for &word in bucket.members() {
                assert!(seen.insert(word), "word {word} in two buckets");
                assert!(store.sequence(word).unwrap().len() <= bucket.width());
            }
        }
        assert_eq!(seen, (0..store.len()).collect());
    }

    #[test]
    fn test_rows_are_padded_to_bucket_width() {
        let mut store = filled(1, &["ab", "abcd"]);
        store.close();

        let bucket = &store.buckets()[0];
        assert_eq!(bucket.width(), 4);
        let (b, pos) = store.assignment(1).unwrap();
        assert_eq!(b, 0);
        assert_eq!(bucket.row(pos), &[97, 98, 0, 0]);
        // The padding word is all pad ids.
        let (_, pos) = store.assignment(PAD_WORD).unwrap();
        assert_eq!(bucket.row(pos), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_set_placeholders_gathers_in_request_order() {
        let mut store = filled(2, &["a", "b", "abcdefgh"]);
        store.close();
        assert_eq!(store.buckets().len(), 2);

        let feed = store.set_placeholders(&[3, 1, 2]).unwrap();
        // "a" and "b" share the short bucket, which comes first.
        assert_eq!(feed.buckets.len(), 2);
        assert_eq!(feed.buckets[0].seq_lengths, vec![1, 1]);
        assert_eq!(feed.buckets[0].char_ids, vec![97, 98]);
        assert_eq!(feed.buckets[1].seq_lengths, vec![8]);
        assert_eq!(feed.gather, vec![2, 0, 1]);
    }

    #[test]
    fn test_set_placeholders_skips_unused_buckets() {
        let mut store = filled(2, &["a", "abcdefgh"]);
        store.close();

        let feed = store.set_placeholders(&[2]).unwrap();
        assert_eq!(feed.buckets.len(), 1);
        assert_eq!(feed.buckets[0].bucket, 1);
        assert_eq!(feed.gather, vec![0]);
    }

    #[test]
    fn test_set_placeholders_checks_state_and_range() {
        let mut store = filled(2, &["a"]);
        assert!(matches!(
            store.set_placeholders(&[1]),
            Err(SubtokenError::StoreNotClosed)
        ));
        store.close();
        assert!(matches!(
            store.set_placeholders(&[9]),
            Err(SubtokenError::IndexNotFound(9))
        ));
    }

    #[test]
    fn test_reset_keeps_only_padding_word() {
        let mut store = filled(2, &["a", "bc"]);
        store.close();
        store.reset();

        assert_eq!(store.len(), 1);
        assert!(store.buckets().is_empty());
        assert_eq!(store.assignment(1), None);
        store.open();
        assert_eq!(store.add(vec![7], vec!['x']).unwrap(), 1);
    }

    #[test]
    fn test_reopen_drops_stale_assignment() {
        let mut store = filled(2, &["a"]);
        store.close();
        store.open();
        assert_eq!(store.assignment(1), None);
        store.add(vec![1, 2, 3], vec!['x', 'y', 'z']).unwrap();
        store.close();
        assert!(store.assignment(2).is_some());
    }
}
