use std::{
    borrow::Cow,
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use burn::prelude::*;

use crate::{
    bucket::Multibucket,
    config::{Strategies, SubtokenConfig},
    dataset::conllu::ConlluReader,
    error::{SubtokenError, SubtokenResult},
    feed::{Feed, SubtokenFeed, WordBatch, unique_with_inverse},
    model::{
        ModelConfig,
        dropout::KeepProbs,
        encoder::{SubtokenEncoder, SubtokenEncoderConfig},
        recurrent::CellSpec,
    },
    util::{SeqTensor, index_tensor},
    vocab::{CountVocab, Field},
};

/// Per-call options of [`SubtokenVocab::get_input_tensor`].
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct InputOptions {
    /// Overrides the configured `embed_keep_prob`.
    pub embed_keep_prob: Option<f64>,
    /// Reusing an already trained encoder: conv, recurrent and linear dropout are off.
    pub reuse: bool,
}

impl Default for InputOptions {
    fn default() -> Self {
        Self {
            embed_keep_prob: None,
            reuse: true,
        }
    }
}

impl InputOptions {
    /// Every configured dropout active.
    pub fn training() -> Self {
        Self {
            embed_keep_prob: None,
            reuse: false,
        }
    }
}

fn normalize(cased: bool, token: &str) -> Cow<'_, str> {
    if cased {
        Cow::Borrowed(token)
    } else {
        Cow::Owned(token.to_lowercase())
    }
}

/// Character vocabulary, word index and encoder entry point for one field.
///
/// Lifecycle: [`count`](Self::count) (or [`load`](Self::load)) builds the
/// character index; [`open`](Self::open), [`add`](Self::add) and
/// [`close`](Self::close) fill and bucket the word forms;
/// [`set_placeholders`](Self::set_placeholders) and
/// [`get_input_tensor`](Self::get_input_tensor) encode batches;
/// [`reset`](Self::reset) forgets the words but keeps the characters.
#[derive(Clone, Debug)]
pub struct SubtokenVocab {
    field: Field,
    config: SubtokenConfig,
    strategies: Strategies,
    chars: CountVocab,
    multibucket: Multibucket,
    tok2idx: HashMap<String, usize>,
    idx2tok: HashMap<usize, String>,
}

impl SubtokenVocab {
    pub fn new(field: Field, config: SubtokenConfig) -> SubtokenResult<Self> {
        let strategies = config.resolve()?;
        Ok(Self {
            field,
            multibucket: Multibucket::new(config.max_buckets),
            config,
            strategies,
            chars: CountVocab::new(),
            tok2idx: HashMap::new(),
            idx2tok: HashMap::new(),
        })
    }

    pub fn form(config: SubtokenConfig) -> SubtokenResult<Self> {
        Self::new(Field::Form, config)
    }
    pub fn lemma(config: SubtokenConfig) -> SubtokenResult<Self> {
        Self::new(Field::Lemma, config)
    }
    pub fn upos(config: SubtokenConfig) -> SubtokenResult<Self> {
        Self::new(Field::Upos, config)
    }
    pub fn xpos(config: SubtokenConfig) -> SubtokenResult<Self> {
        Self::new(Field::Xpos, config)
    }
    pub fn deprel(config: SubtokenConfig) -> SubtokenResult<Self> {
        Self::new(Field::Deprel, config)
    }
    /// Relation labels of the enhanced dependency graph column.
    pub fn graph(config: SubtokenConfig) -> SubtokenResult<Self> {
        Self::new(Field::Deps, config)
    }

    pub fn field(&self) -> Field {
        self.field
    }
    pub fn config(&self) -> &SubtokenConfig {
        &self.config
    }
    pub fn strategies(&self) -> &Strategies {
        &self.strategies
    }
    pub fn chars(&self) -> &CountVocab {
        &self.chars
    }
    pub fn multibucket(&self) -> &Multibucket {
        &self.multibucket
    }

    /// Character vocabulary size, specials included.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Number of distinct word forms added since the last reset.
    pub fn n_words(&self) -> usize {
        self.tok2idx.len()
    }

    /// Counts the characters of this field's column and re-indexes them.
    ///
    /// Each distinct column value is counted once. Returns whether any value
    /// was found. Like [`load`](Self::load), fails while word forms are stored.
    pub fn count<P: AsRef<Path>>(&mut self, corpus_files: &[P]) -> SubtokenResult<bool> {
        if self.n_words() > 0 {
            return Err(SubtokenError::WordsStored(self.n_words()));
        }
        let column = self.field.conllu_idx();
        let mut seen = HashSet::new();
        for path in corpus_files {
            let path = path.as_ref();
            for line in ConlluReader::open(path)? {
                let line = line?;
                let value = line.required_column(path, column)?;
                if seen.contains(value) {
                    continue;
                }
                for subtoken in self.field.subtokens(value)? {
                    let subtoken = normalize(self.config.cased, subtoken);
                    self.chars.update(&subtoken);
                }
                seen.insert(value.to_owned());
            }
        }
        self.chars.index_by_counts();

        log::info!(
            "{}: counted {} distinct values from {} files, {} characters",
            self.field,
            seen.len(),
            corpus_files.len(),
            self.chars.len()
        );
        Ok(!seen.is_empty())
    }

    /// Path of the saved character vocabulary.
    pub fn filename(&self) -> PathBuf {
        self.config
            .save_dir
            .join(format!("{}-subtokens.lst", self.field))
    }

    pub fn save(&self) -> SubtokenResult<()> {
        let path = self.filename();
        self.chars.save(&path)?;
        log::info!(
            "{}: saved {} characters to {}",
            self.field,
            self.chars.len(),
            path.display()
        );
        Ok(())
    }

    /// Replaces the character index with the saved one.
    ///
    /// Fails with [`SubtokenError::WordsStored`] unless the vocabulary holds
    /// no word forms; call it before [`open`](Self::open) or after
    /// [`reset`](Self::reset).
    pub fn load(&mut self) -> SubtokenResult<()> {
        if self.n_words() > 0 {
            return Err(SubtokenError::WordsStored(self.n_words()));
        }
        let path = self.filename();
        self.chars = CountVocab::load(&path)?;
        log::info!(
            "{}: loaded {} characters from {}",
            self.field,
            self.chars.len(),
            path.display()
        );
        Ok(())
    }

    /// Loads the saved character vocabulary, or counts `corpus_files` and saves it.
    pub fn load_or_count<P: AsRef<Path>>(&mut self, corpus_files: &[P]) -> SubtokenResult<()> {
        if self.filename().exists() {
            self.load()
        } else {
            self.count(corpus_files)?;
            self.save()
        }
    }

    /// Returns the word index of `token`, adding it if it is new.
    ///
    /// Known forms return their index without touching the bucket store.
    pub fn add(&mut self, token: &str) -> SubtokenResult<usize> {
        let token = normalize(self.config.cased, token);
        if let Some(index) = self.tok2idx.get(token.as_ref()) {
            return Ok(*index);
        }

        let characters: Vec<char> = token.chars().collect();
        let ids = characters.iter().map(|c| self.chars.char_index(*c)).collect();
        let index = self.multibucket.add(ids, characters)?;
        self.tok2idx.insert(token.clone().into_owned(), index);
        self.idx2tok.insert(index, token.into_owned());
        Ok(index)
    }

    pub fn token(&self, index: usize) -> SubtokenResult<&str> {
        self.idx2tok
            .get(&index)
            .map(String::as_str)
            .ok_or(SubtokenError::IndexNotFound(index))
    }

    pub fn index(&self, token: &str) -> SubtokenResult<usize> {
        let token = normalize(self.config.cased, token);
        self.tok2idx
            .get(token.as_ref())
            .copied()
            .ok_or_else(|| SubtokenError::TokenNotFound(token.into_owned()))
    }

    pub fn open(&mut self) -> &mut Self {
        self.multibucket.open();
        self
    }

    pub fn close(&mut self) {
        self.multibucket.close();
    }

    pub fn reset(&mut self) {
        self.tok2idx.clear();
        self.idx2tok.clear();
        self.multibucket.reset();
    }

    /// Records the unique words of `batch` and their bucket inputs in `feed`
    /// under this field's name.
    pub fn set_placeholders(&self, batch: &WordBatch, mut feed: Feed) -> SubtokenResult<Feed> {
        let (unique, inverse) = unique_with_inverse(batch.indices());
        let multibucket = self.multibucket.set_placeholders(&unique)?;
        feed.insert(
            self.field.name(),
            SubtokenFeed {
                shape: batch.shape().to_vec(),
                inverse,
                multibucket,
            },
        );
        Ok(feed)
    }

    /// Encoder settings sized to the current character vocabulary.
    pub fn encoder_config(&self, nonzero_init: bool) -> SubtokenEncoderConfig {
        SubtokenEncoderConfig {
            n_chars: self.chars.len(),
            embed_size: self.config.embed_size,
            recur_size: self.config.recur_size,
            linear_size: self.config.linear_size,
            n_layers: self.config.n_layers,
            first_layer_conv_width: self.config.first_layer_conv_width,
            conv_width: self.config.conv_width,
            bidirectional: self.config.bidirectional,
            cell: CellSpec {
                cell: self.strategies.recur_cell,
                func: self.strategies.recur_func,
                cifg: self.config.cifg,
                nog: self.config.nog,
                drop_type: self.strategies.drop_type,
            },
            squeeze: self.strategies.squeeze_type,
            nonzero_init,
        }
    }

    /// Builds the encoder. Call after the character index is final.
    pub fn init_encoder<B: Backend>(
        &self,
        device: &B::Device,
        nonzero_init: bool,
    ) -> SubtokenEncoder<B> {
        self.encoder_config(nonzero_init).init_model(device)
    }

    pub fn keep_probs(&self, reuse: bool) -> KeepProbs {
        if reuse {
            KeepProbs::ALL
        } else {
            KeepProbs {
                conv: self.config.conv_keep_prob,
                recur: self.config.recur_keep_prob,
                linear: self.config.linear_keep_prob,
            }
        }
    }

    /// Word vectors for the batch recorded in `feed`, shaped
    /// `batch_shape ++ [linear_size]`.
    ///
    /// Every unique word is encoded once, bucket by bucket, and the vectors
    /// are gathered back into batch order, so repeated words get identical
    /// vectors.
    pub fn get_input_tensor<B: Backend, const D: usize>(
        &self,
        encoder: &SubtokenEncoder<B>,
        feed: &Feed,
        options: InputOptions,
    ) -> SubtokenResult<Tensor<B, D>> {
        let entry = feed
            .get(self.field.name())
            .ok_or_else(|| SubtokenError::MissingFeed(self.field.name().to_owned()))?;
        if entry.shape.len() + 1 != D {
            return Err(SubtokenError::RankMismatch {
                batch_rank: entry.shape.len(),
                requested: D,
            });
        }

        let device = encoder.device();
        let keep = self.keep_probs(options.reuse);
        let d = encoder.output_dim();
        let layers: Vec<Tensor<B, 2>> = entry
            .multibucket
            .buckets
            .iter()
            .map(|bucket| encoder.forward(SeqTensor::from_bucket(bucket, &device), &keep))
            .collect();

        let layer = if layers.is_empty() {
            Tensor::zeros([entry.inverse.len(), d], &device)
        } else {
            // Concatenate the buckets, put the rows in unique-word order, then
            // look up every batch position.
            Tensor::cat(layers, 0)
                .select(0, index_tensor(&entry.multibucket.gather, &device))
                .select(0, index_tensor(&entry.inverse, &device))
        };

        let mut dims = [0; D];
        dims[..D - 1].copy_from_slice(&entry.shape);
        dims[D - 1] = d;
        let layer: Tensor<B, D> = layer.reshape(dims);

        let embed_keep_prob = options
            .embed_keep_prob
            .unwrap_or(self.config.embed_keep_prob);
        if embed_keep_prob < 1.0 {
            Ok(self.strategies.drop_func.apply(layer, embed_keep_prob))
        } else {
            Ok(layer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::PAD_WORD;
    use std::fs;
    use tempdir::TempDir;

    fn write_corpus(dir: &TempDir, text: &str) -> PathBuf {
        let path = dir.path().join("train.conllu");
        fs::write(&path, text).unwrap();
        path
    }

    fn config(dir: &TempDir) -> SubtokenConfig {
        SubtokenConfig::new(dir.path().into())
    }

    #[test]
    fn test_count_folds_case_and_dedups_values() {
        let dir = TempDir::new("subtoken_vocab").unwrap();
        let corpus = write_corpus(&dir, "# text\n1\tCat\t_\n2\tcat\t_\n3\tCat\t_\n\n1\tat\t_\n");

        let mut vocab = SubtokenVocab::form(config(&dir)).unwrap();
        assert!(vocab.count(&[&corpus]).unwrap());

        // "Cat" and "cat" are distinct raw values; the repeated "Cat" is not.
        let counts = vocab.chars().counts();
        assert_eq!(counts.get(&'c'), Some(&2));
        assert_eq!(counts.get(&'a'), Some(&3));
        assert_eq!(counts.get(&'C'), None);
    }

    #[test]
    fn test_count_cased_keeps_case() {
        let dir = TempDir::new("subtoken_vocab").unwrap();
        let corpus = write_corpus(&dir, "1\tCat\t_\n");

        let mut vocab = SubtokenVocab::form(config(&dir).with_cased(true)).unwrap();
        vocab.count(&[&corpus]).unwrap();
        assert_eq!(vocab.chars().counts().get(&'C'), Some(&1));
        assert_eq!(vocab.chars().counts().get(&'c'), None);
    }

    #[test]
    fn test_count_reports_empty_corpus() {
        let dir = TempDir::new("subtoken_vocab").unwrap();
        let corpus = write_corpus(&dir, "# only a comment\n\n");

        let mut vocab = SubtokenVocab::form(config(&dir)).unwrap();
        assert!(!vocab.count(&[&corpus]).unwrap());
    }

    #[test]
    fn test_count_missing_column_fails() {
        let dir = TempDir::new("subtoken_vocab").unwrap();
        let corpus = write_corpus(&dir, "1\tcat\tcat\n");

        let mut vocab = SubtokenVocab::deprel(config(&dir)).unwrap();
        assert!(matches!(
            vocab.count(&[&corpus]),
            Err(SubtokenError::MissingColumn { line: 1, column: 7, .. })
        ));
    }

    #[test]
    fn test_graph_vocab_counts_relations_only() {
        let dir = TempDir::new("subtoken_vocab").unwrap();
        let corpus = write_corpus(&dir, "1\tcat\t_\t_\t_\t_\t2\tnsubj\t2:nsubj|4:obj\t_\n");

        let mut vocab = SubtokenVocab::graph(config(&dir)).unwrap();
        vocab.count(&[&corpus]).unwrap();

        let counts = vocab.chars().counts();
        assert_eq!(counts.get(&'2'), None);
        assert_eq!(counts.get(&'4'), None);
        assert_eq!(counts.get(&':'), None);
        assert_eq!(counts.get(&'|'), None);
        assert_eq!(counts.get(&'s'), Some(&1));
        assert_eq!(counts.get(&'b'), Some(&2));
        assert_eq!(counts.get(&'o'), Some(&1));
    }

    #[test]
    fn test_add_dedups_and_round_trips() {
        let dir = TempDir::new("subtoken_vocab").unwrap();
        let mut vocab = SubtokenVocab::form(config(&dir)).unwrap();
        vocab.open();

        let cat = vocab.add("cat").unwrap();
        assert_ne!(cat, PAD_WORD);
        assert_eq!(vocab.add("Cat").unwrap(), cat);
        let dog = vocab.add("dog").unwrap();
        assert_ne!(dog, cat);

        assert_eq!(vocab.token(cat).unwrap(), "cat");
        assert_eq!(vocab.index(vocab.token(dog).unwrap()).unwrap(), dog);
        assert_eq!(vocab.n_words(), 2);
        // One sequence per distinct form, plus the padding word.
        assert_eq!(vocab.multibucket().len(), 3);
    }

    #[test]
    fn test_lookup_misses_are_errors() {
        let dir = TempDir::new("subtoken_vocab").unwrap();
        let vocab = SubtokenVocab::form(config(&dir)).unwrap();
        assert!(matches!(
            vocab.index("cat"),
            Err(SubtokenError::TokenNotFound(t)) if t == "cat"
        ));
        assert!(matches!(vocab.token(5), Err(SubtokenError::IndexNotFound(5))));
    }

    #[test]
    fn test_unknown_characters_map_to_unk() {
        let dir = TempDir::new("subtoken_vocab").unwrap();
        let corpus = write_corpus(&dir, "1\tab\t_\n");
        let mut vocab = SubtokenVocab::form(config(&dir)).unwrap();
        vocab.count(&[&corpus]).unwrap();
        vocab.open();

        let index = vocab.add("abz").unwrap();
        let ids = vocab.multibucket().sequence(index).unwrap();
        assert_eq!(ids[2], crate::vocab::SpecialToken::Unknown.index());
        assert_eq!(vocab.multibucket().chars(index).unwrap(), &['a', 'b', 'z']);
    }

    #[test]
    fn test_reset_clears_words_keeps_chars() {
        let dir = TempDir::new("subtoken_vocab").unwrap();
        let corpus = write_corpus(&dir, "1\tcat\t_\n");
        let mut vocab = SubtokenVocab::form(config(&dir)).unwrap();
        vocab.count(&[&corpus]).unwrap();
        let n_chars = vocab.len();

        vocab.open();
        let cat = vocab.add("cat").unwrap();
        vocab.close();
        vocab.reset();

        assert!(vocab.index("cat").is_err());
        assert!(vocab.token(cat).is_err());
        assert_eq!(vocab.len(), n_chars);
        assert_eq!(vocab.multibucket().len(), 1);
        vocab.open();
        assert_eq!(vocab.add("tac").unwrap(), cat);
    }

    #[test]
    fn test_load_or_count_writes_then_reads() {
        let dir = TempDir::new("subtoken_vocab").unwrap();
        let corpus = write_corpus(&dir, "1\thello\t_\n2\tworld\t_\n");

        let mut vocab = SubtokenVocab::form(config(&dir)).unwrap();
        vocab.load_or_count(&[&corpus]).unwrap();
        assert_eq!(vocab.filename(), dir.path().join("form-subtokens.lst"));
        assert!(vocab.filename().exists());

        let mut reloaded = SubtokenVocab::form(config(&dir)).unwrap();
        let missing: [&Path; 0] = [];
        reloaded.load_or_count(&missing).unwrap();
        assert_eq!(reloaded.len(), vocab.len());
        for c in "helowrd".chars() {
            assert_eq!(reloaded.chars().char_index(c), vocab.chars().char_index(c));
        }
    }

    #[test]
    fn test_character_index_is_fixed_while_words_are_stored() {
        let dir = TempDir::new("subtoken_vocab").unwrap();
        let corpus = write_corpus(&dir, "1\tab\t_\n");
        let mut vocab = SubtokenVocab::form(config(&dir)).unwrap();
        vocab.load_or_count(&[&corpus]).unwrap();

        vocab.open();
        let ab = vocab.add("ab").unwrap();
        let ids = vocab.multibucket().sequence(ab).unwrap().to_vec();
        assert!(matches!(vocab.load(), Err(SubtokenError::WordsStored(1))));
        assert!(matches!(
            vocab.count(&[&corpus]),
            Err(SubtokenError::WordsStored(1))
        ));
        assert_eq!(vocab.chars().encode_all("ab"), ids);

        vocab.reset();
        vocab.load().unwrap();
        vocab.count(&[&corpus]).unwrap();
    }

    #[test]
    fn test_set_placeholders_records_inverse() {
        let dir = TempDir::new("subtoken_vocab").unwrap();
        let mut vocab = SubtokenVocab::lemma(config(&dir)).unwrap();
        vocab.open();
        let a = vocab.add("a").unwrap();
        let b = vocab.add("bbbbbbbb").unwrap();
        vocab.close();

        let batch = WordBatch::from_rows(&[vec![b, a, b], vec![a]]);
        let feed = vocab.set_placeholders(&batch, Feed::new()).unwrap();
        let entry = feed.get("lemma").unwrap();
        assert_eq!(entry.shape, vec![2, 3]);
        // unique: [b, a, PAD]
        assert_eq!(entry.inverse, vec![0, 1, 0, 1, 2, 2]);
        assert_eq!(entry.multibucket.gather.len(), 3);
    }

    #[test]
    fn test_set_placeholders_requires_close() {
        let dir = TempDir::new("subtoken_vocab").unwrap();
        let mut vocab = SubtokenVocab::form(config(&dir)).unwrap();
        vocab.open();
        let a = vocab.add("a").unwrap();
        let batch = WordBatch::from_rows(&[vec![a]]);
        assert!(matches!(
            vocab.set_placeholders(&batch, Feed::new()),
            Err(SubtokenError::StoreNotClosed)
        ));
    }

    #[test]
    fn test_get_input_tensor_needs_feed_entry_and_rank() {
        use burn::backend::NdArray;
        type B = NdArray<f32>;

        let dir = TempDir::new("subtoken_vocab").unwrap();
        let config = config(&dir)
            .with_embed_size(4)
            .with_recur_size(4)
            .with_linear_size(3);
        let mut vocab = SubtokenVocab::form(config).unwrap();
        vocab.open();
        let a = vocab.add("a").unwrap();
        vocab.close();

        let device = Default::default();
        let encoder = vocab.init_encoder::<B>(&device, true);
        assert!(matches!(
            vocab.get_input_tensor::<B, 3>(&encoder, &Feed::new(), InputOptions::default()),
            Err(SubtokenError::MissingFeed(_))
        ));

        let feed = vocab
            .set_placeholders(&WordBatch::from_rows(&[vec![a]]), Feed::new())
            .unwrap();
        assert!(matches!(
            vocab.get_input_tensor::<B, 2>(&encoder, &feed, InputOptions::default()),
            Err(SubtokenError::RankMismatch {
                batch_rank: 2,
                requested: 2
            })
        ));
        let out = vocab
            .get_input_tensor::<B, 3>(&encoder, &feed, InputOptions::default())
            .unwrap();
        assert_eq!(out.dims(), [1, 1, 3]);
    }

    #[test]
    fn test_keep_probs_follow_reuse() {
        let dir = TempDir::new("subtoken_vocab").unwrap();
        let vocab = SubtokenVocab::form(config(&dir).with_conv_keep_prob(0.5)).unwrap();
        assert_eq!(vocab.keep_probs(true), KeepProbs::ALL);
        assert_eq!(vocab.keep_probs(false).conv, 0.5);
        assert_eq!(vocab.keep_probs(false).recur, 0.67);
    }
}
