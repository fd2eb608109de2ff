//! # Error Types

use std::path::PathBuf;

/// Errors from subtoken vocabulary operations.
#[derive(Debug, thiserror::Error)]
pub enum SubtokenError {
    /// A configured strategy name does not resolve to a known implementation.
    #[error("unknown {kind} `{name}`, expected one of: {valid}")]
    UnknownStrategy {
        /// The strategy slot, e.g. `recur_cell`.
        kind: &'static str,
        /// The configured name.
        name: String,
        /// Comma separated list of accepted names.
        valid: String,
    },

    /// A configuration value is out of range.
    #[error("invalid value for `{key}`: {reason}")]
    InvalidConfig {
        /// The configuration key.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Word form lookup miss.
    #[error("token not found: {0:?}")]
    TokenNotFound(String),

    /// Word index lookup miss.
    #[error("word index not found: {0}")]
    IndexNotFound(usize),

    /// A corpus line has fewer columns than the field needs.
    #[error("{}:{line}: missing column {column}", path.display())]
    MissingColumn {
        /// The corpus file.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// Zero-based column index.
        column: usize,
    },

    /// A graph edge without a `head:relation` separator.
    #[error("malformed graph edge {edge:?}")]
    MalformedEdge {
        /// The offending edge.
        edge: String,
    },

    /// Sequences can only be added to an open store.
    #[error("bucket store is not open")]
    StoreNotOpen,

    /// Feeds can only be built from a closed store.
    #[error("bucket store is not closed")]
    StoreNotClosed,

    /// The character index cannot change under stored word forms.
    #[error("{0} word forms are stored with the current character index")]
    WordsStored(usize),

    /// The feed has no entry for this vocabulary.
    #[error("feed has no entry for field `{0}`")]
    MissingFeed(String),

    /// Batch data does not match its declared shape.
    #[error("batch shape {shape:?} holds {expected} indices, got {actual}")]
    ShapeMismatch {
        /// The declared shape.
        shape: Vec<usize>,
        /// Product of the shape.
        expected: usize,
        /// Number of indices provided.
        actual: usize,
    },

    /// The requested output rank does not fit the batch rank.
    #[error("rank {batch_rank} batch gives a rank {} tensor, not {requested}", batch_rank + 1)]
    RankMismatch {
        /// Rank of the word index batch.
        batch_rank: usize,
        /// Rank requested by the caller.
        requested: usize,
    },

    /// Vocabulary file contents could not be parsed.
    #[error("{}:{line}: {reason}", path.display())]
    Parse {
        /// The vocabulary file.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// What went wrong.
        reason: String,
    },

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for subtoken vocabulary operations.
pub type SubtokenResult<T> = Result<T, SubtokenError>;
