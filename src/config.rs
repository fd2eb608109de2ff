use std::path::{Path, PathBuf};

use burn::config::Config;

use crate::{
    error::{SubtokenError, SubtokenResult},
    model::strategy::{DropFunc, DropType, RecurCell, RecurFunc, SqueezeType, resolve},
};

/// Settings of one subtoken vocabulary and its encoder.
///
/// Strategy slots are plain names so config files stay readable; they are
/// checked by [`SubtokenConfig::resolve`] when a vocabulary is built.
#[derive(Config, Debug)]
pub struct SubtokenConfig {
    /// Directory holding `<field>-subtokens.lst`.
    pub save_dir: PathBuf,
    #[config(default = 3)]
    pub max_buckets: usize,

    /// Character embedding width.
    #[config(default = 100)]
    pub embed_size: usize,
    /// Hidden width of each recurrent direction.
    #[config(default = 400)]
    pub recur_size: usize,
    /// Output word embedding width.
    #[config(default = 100)]
    pub linear_size: usize,
    #[config(default = 200)]
    pub hidden_size: usize,
    #[config(default = 1)]
    pub n_layers: usize,
    /// Input window of the first recurrent layer. Zero behaves like one.
    #[config(default = 1)]
    pub first_layer_conv_width: usize,
    /// Input window of the later recurrent layers. Zero behaves like one.
    #[config(default = 1)]
    pub conv_width: usize,
    #[config(default = false)]
    pub bidirectional: bool,
    /// Coupled input and forget gates (LSTM only).
    #[config(default = false)]
    pub cifg: bool,
    /// No output gate (LSTM only).
    #[config(default = false)]
    pub nog: bool,

    #[config(default = "String::from(\"recurrent\")")]
    pub drop_type: String,
    #[config(default = "String::from(\"final_hidden\")")]
    pub squeeze_type: String,
    #[config(default = "String::from(\"LSTMCell\")")]
    pub recur_cell: String,
    #[config(default = "String::from(\"tanh\")")]
    pub recur_func: String,
    #[config(default = "String::from(\"unkout\")")]
    pub drop_func: String,

    #[config(default = 1.0)]
    pub embed_keep_prob: f64,
    #[config(default = 0.67)]
    pub conv_keep_prob: f64,
    #[config(default = 0.67)]
    pub recur_keep_prob: f64,
    #[config(default = 0.67)]
    pub linear_keep_prob: f64,
    #[config(default = 0.67)]
    pub hidden_keep_prob: f64,

    /// Keep letter case when counting and adding word forms.
    #[config(default = false)]
    pub cased: bool,
}

/// The named strategies of a [`SubtokenConfig`], resolved.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Strategies {
    pub recur_cell: RecurCell,
    pub recur_func: RecurFunc,
    pub drop_func: DropFunc,
    pub drop_type: DropType,
    pub squeeze_type: SqueezeType,
}

impl SubtokenConfig {
    /// Loads `path` if it exists, otherwise the defaults for `save_dir`.
    pub fn load_or_default(path: &Path, save_dir: PathBuf) -> anyhow::Result<Self> {
        if path.exists() {
            Ok(Self::load(path)?)
        } else {
            Ok(Self::new(save_dir))
        }
    }

    /// Checks every value and resolves the strategy names.
    pub fn resolve(&self) -> SubtokenResult<Strategies> {
        for (key, value) in [
            ("max_buckets", self.max_buckets),
            ("embed_size", self.embed_size),
            ("recur_size", self.recur_size),
            ("linear_size", self.linear_size),
            ("hidden_size", self.hidden_size),
            ("n_layers", self.n_layers),
        ] {
            if value == 0 {
                return Err(SubtokenError::InvalidConfig {
                    key,
                    reason: "must be positive".into(),
                });
            }
        }
        for (key, value) in [
            ("embed_keep_prob", self.embed_keep_prob),
            ("conv_keep_prob", self.conv_keep_prob),
            ("recur_keep_prob", self.recur_keep_prob),
            ("linear_keep_prob", self.linear_keep_prob),
            ("hidden_keep_prob", self.hidden_keep_prob),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(SubtokenError::InvalidConfig {
                    key,
                    reason: format!("{value} is outside (0, 1]"),
                });
            }
        }

        let strategies = Strategies {
            recur_cell: resolve("recur_cell", &self.recur_cell)?,
            recur_func: resolve("recur_func", &self.recur_func)?,
            drop_func: resolve("drop_func", &self.drop_func)?,
            drop_type: resolve("drop_type", &self.drop_type)?,
            squeeze_type: resolve("squeeze_type", &self.squeeze_type)?,
        };
        if strategies.recur_cell != RecurCell::Lstm && (self.cifg || self.nog) {
            log::warn!(
                "cifg/nog only apply to LSTMCell, ignored for {}",
                strategies.recur_cell
            );
        }
        Ok(strategies)
    }
}
