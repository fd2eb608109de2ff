//! Builds a subtoken vocabulary from CoNLL-U files, buckets every word form
//! of the field and encodes the first sentences as a sample batch.

mod logging;

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::backend::NdArray;
use clap::Parser;

use subtoken_vocab::{
    Feed, Field, InputOptions, SubtokenConfig, SubtokenVocab, WordBatch,
    dataset::conllu::ConlluReader,
};

type B = NdArray<f32>;

#[derive(Parser, Debug)]
#[command(about = "Count, bucket and encode the character subtokens of a CoNLL-U field")]
struct Args {
    /// Corpus files in CoNLL-U format.
    #[arg(required = true)]
    corpus: Vec<PathBuf>,

    /// JSON config; defaults are used when the file does not exist.
    #[arg(short, long, default_value = "subtokens.json")]
    config: PathBuf,

    /// Where `<field>-subtokens.lst` is read from or written to; overrides the config.
    #[arg(short, long)]
    save_dir: Option<PathBuf>,

    /// CoNLL-U field to read.
    #[arg(short, long, default_value = "form")]
    field: Field,

    /// Sentences in the sample batch.
    #[arg(long, default_value_t = 2)]
    sample: usize,

    /// Initialize character embeddings randomly instead of with zeros.
    #[arg(long)]
    nonzero_init: bool,

    #[command(flatten)]
    log: logging::LogArgs,
}

/// Word indices of every sentence, one row per sentence.
fn add_sentences(vocab: &mut SubtokenVocab, corpus: &[PathBuf]) -> Result<Vec<Vec<usize>>> {
    let column = vocab.field().conllu_idx();
    let mut sentences = Vec::new();
    let mut sentence = Vec::new();
    for path in corpus {
        for line in ConlluReader::open(path)? {
            let line = line?;
            let id = line.required_column(path, 0)?;
            if id.contains('-') || id.contains('.') {
                // multiword ranges and empty nodes
                continue;
            }
            if id == "1" && !sentence.is_empty() {
                sentences.push(std::mem::take(&mut sentence));
            }
            let value = line.required_column(path, column)?;
            for subtoken in vocab.field().subtokens(value)? {
                sentence.push(vocab.add(subtoken)?);
            }
        }
    }
    if !sentence.is_empty() {
        sentences.push(sentence);
    }
    Ok(sentences)
}

fn main() -> Result<()> {
    let args = Args::parse();
    args.log.setup_logging(3)?;

    let default_dir = args.save_dir.clone().unwrap_or_else(|| "saves".into());
    let mut config = SubtokenConfig::load_or_default(&args.config, default_dir)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(save_dir) = &args.save_dir {
        config.save_dir = save_dir.clone();
    }
    let mut vocab = SubtokenVocab::new(args.field, config)?;
    vocab.load_or_count(&args.corpus)?;

    vocab.open();
    let sentences = add_sentences(&mut vocab, &args.corpus)?;
    vocab.close();

    println!(
        "{}: {} characters, {} word forms, {} sentences",
        vocab.field(),
        vocab.len(),
        vocab.n_words(),
        sentences.len()
    );
    for (b, bucket) in vocab.multibucket().buckets().iter().enumerate() {
        println!("bucket {b}: width {:>3}, {} words", bucket.width(), bucket.len());
    }

    let sample: Vec<_> = sentences.into_iter().take(args.sample).collect();
    if sample.is_empty() {
        return Ok(());
    }
    let batch = WordBatch::from_rows(&sample);
    let feed = vocab.set_placeholders(&batch, Feed::new())?;

    let device = Default::default();
    let encoder = vocab.init_encoder::<B>(&device, args.nonzero_init);
    let vectors = vocab.get_input_tensor::<B, 3>(&encoder, &feed, InputOptions::default())?;
    println!("sample batch {:?} -> {:?}", batch.shape(), vectors.dims());
    Ok(())
}
