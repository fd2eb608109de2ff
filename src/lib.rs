pub mod bucket;
pub mod config;
pub mod dataset;
pub mod error;
pub mod feed;
pub mod model;
pub mod util;
pub mod vocab;

pub use config::SubtokenConfig;
pub use error::{SubtokenError, SubtokenResult};
pub use feed::{Feed, WordBatch};
pub use vocab::{Field, InputOptions, SubtokenVocab};
