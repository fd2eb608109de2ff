use std::{
    collections::HashMap,
    fs::{self, File},
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use crate::error::{SubtokenError, SubtokenResult};

/// Reserved character ids, placed before every counted character.
///
/// `Pad` must stay at index zero: sequence lengths are recovered by counting
/// non-pad ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(usize)]
pub enum SpecialToken {
    Pad,
    Root,
    Unknown,
}

impl SpecialToken {
    pub const INDEX_MAP: [Self; 3] = [Self::Pad, Self::Root, Self::Unknown];
    pub const N: usize = const { Self::INDEX_MAP.len() };

    pub fn index(self) -> usize {
        self as usize
    }
    pub fn from_index(i: usize) -> Option<Self> {
        Self::INDEX_MAP.get(i).copied()
    }
    pub fn to_str(self) -> &'static str {
        match self {
            Self::Pad => "<PAD>",
            Self::Root => "<ROOT>",
            Self::Unknown => "<UNK>",
        }
    }
}

/// Frequency ranked character table.
///
/// Characters are accumulated with [`CountVocab::update`] and receive ids
/// from [`CountVocab::index_by_counts`]: most frequent first, ties broken by
/// character order, all after the [`SpecialToken`] block.
#[derive(Clone, Debug, Default)]
pub struct CountVocab {
    counts: HashMap<char, usize>,
    alphabet: Vec<char>,
    str2idx: HashMap<char, usize>,
}

impl CountVocab {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ids, specials included.
    pub fn len(&self) -> usize {
        SpecialToken::N + self.alphabet.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alphabet.is_empty()
    }

    pub fn counts(&self) -> &HashMap<char, usize> {
        &self.counts
    }

    pub fn update(&mut self, text: &str) {
        for c in text.chars() {
            *self.counts.entry(c).or_default() += 1;
        }
    }

    pub fn index_by_counts(&mut self) {
        let mut ranked: Vec<(char, usize)> = self.counts.iter().map(|(c, n)| (*c, *n)).collect();
        ranked.sort_by(|(ca, na), (cb, nb)| nb.cmp(na).then(ca.cmp(cb)));
        self.alphabet = ranked.into_iter().map(|(c, _)| c).collect();
        self.str2idx = self
            .alphabet
            .iter()
            .enumerate()
            .map(|(i, c)| (*c, SpecialToken::N + i))
            .collect();
    }

    /// Id of `c`, or the unknown id for characters never indexed.
    pub fn char_index(&self, c: char) -> usize {
        self.str2idx
            .get(&c)
            .copied()
            .unwrap_or(SpecialToken::Unknown.index())
    }

    pub fn encode_all(&self, text: &str) -> Vec<usize> {
        text.chars().map(|c| self.char_index(c)).collect()
    }

    pub fn decode_all<I: IntoIterator<Item = usize>>(&self, ids: I) -> String {
        let mut text = String::new();
        for i in ids {
            match SpecialToken::from_index(i) {
                Some(s) => text.push_str(s.to_str()),
                None => match self.alphabet.get(i - SpecialToken::N) {
                    Some(c) => text.push(*c),
                    None => text.push_str(SpecialToken::Unknown.to_str()),
                },
            }
        }
        text
    }

    /// Writes one `char\tcount` line per indexed character, in id order.
    pub fn save(&self, path: &Path) -> SubtokenResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = BufWriter::new(File::create(path)?);
        for c in &self.alphabet {
            writeln!(file, "{}\t{}", c, self.counts.get(c).copied().unwrap_or(0))?;
        }
        file.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> SubtokenResult<Self> {
        let parse_error = |line: usize, reason: String| SubtokenError::Parse {
            path: path.to_owned(),
            line,
            reason,
        };

        let mut vocab = Self::new();
        let reader = BufReader::new(File::open(path)?);
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let (c, count) = line
                .rsplit_once('\t')
                .ok_or_else(|| parse_error(n + 1, "expected `char\\tcount`".into()))?;
            let mut chars = c.chars();
            let (Some(c), None) = (chars.next(), chars.next()) else {
                return Err(parse_error(n + 1, format!("{c:?} is not a single character")));
            };
            let count = count
                .parse::<usize>()
                .map_err(|e| parse_error(n + 1, e.to_string()))?;
            vocab.counts.insert(c, count);
            vocab.str2idx.insert(c, vocab.len());
            vocab.alphabet.push(c);
        }
        Ok(vocab)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_index_by_counts_ranks_and_breaks_ties() {
        let mut vocab = CountVocab::new();
        vocab.update("abca");
        vocab.update("cb");
        vocab.index_by_counts();

        // a: 2, b: 2, c: 2 -> tie broken by char.
        assert_eq!(vocab.char_index('a'), SpecialToken::N);
        assert_eq!(vocab.char_index('b'), SpecialToken::N + 1);
        assert_eq!(vocab.char_index('c'), SpecialToken::N + 2);

        vocab.update("c");
        vocab.index_by_counts();
        assert_eq!(vocab.char_index('c'), SpecialToken::N);
        assert_eq!(vocab.len(), SpecialToken::N + 3);
    }

    #[test]
    fn test_unknown_chars_fall_back() {
        let mut vocab = CountVocab::new();
        vocab.update("ab");
        vocab.index_by_counts();

        assert_eq!(
            vocab.encode_all("az"),
            vec![vocab.char_index('a'), SpecialToken::Unknown.index()]
        );
        assert_eq!(
            vocab.decode_all(vocab.encode_all("baz")),
            "ba<UNK>".to_string()
        );
    }

    #[test]
    fn test_indexing_is_deterministic() {
        let build = || {
            let mut vocab = CountVocab::new();
            for word in ["the", "cat", "sat", "on", "mat"] {
                vocab.update(word);
            }
            vocab.index_by_counts();
            "abcdefghijklmnopqrstuvwxyz"
                .chars()
                .map(|c| vocab.char_index(c))
                .collect::<Vec<_>>()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new("count_vocab").unwrap();
        let path = dir.path().join("form-subtokens.lst");

        let mut vocab = CountVocab::new();
        vocab.update("hello world");
        vocab.index_by_counts();
        vocab.save(&path).unwrap();

        let loaded = CountVocab::load(&path).unwrap();
        assert_eq!(loaded.len(), vocab.len());
        for c in "helo wrd".chars() {
            assert_eq!(loaded.char_index(c), vocab.char_index(c));
        }
        assert_eq!(loaded.counts().get(&'l'), Some(&3));
    }

    #[test]
    fn test_load_rejects_multi_char_entries() {
        let dir = TempDir::new("count_vocab").unwrap();
        let path = dir.path().join("bad.lst");
        fs::write(&path, "ab\t3\n").unwrap();

        let err = CountVocab::load(&path).unwrap_err();
        assert!(matches!(err, SubtokenError::Parse { line: 1, .. }));
    }
}
