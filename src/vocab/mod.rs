//! Character vocabularies for CoNLL-U fields.

mod count;
mod field;
mod subtoken;

pub use count::{CountVocab, SpecialToken};
pub use field::{Field, graph_labels};
pub use subtoken::{InputOptions, SubtokenVocab};
