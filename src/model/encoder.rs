use burn::{
    module::Ignored,
    nn::{Embedding, EmbeddingConfig, Initializer, Linear, LinearConfig},
    prelude::*,
};

use crate::{
    model::{
        ModelConfig,
        dropout::{KeepProbs, dropout},
        recurrent::{CellSpec, RecurLayer, RecurLayerConfig},
        squeeze::{LinearAttention, LinearAttentionConfig, split_final_state},
        strategy::SqueezeType,
    },
    util::SeqTensor,
};

#[derive(Clone, Debug)]
pub struct SubtokenEncoderConfig {
    /// Character vocabulary size, specials included.
    pub n_chars: usize,
    pub embed_size: usize,
    pub recur_size: usize,
    pub linear_size: usize,
    pub n_layers: usize,
    pub first_layer_conv_width: usize,
    pub conv_width: usize,
    pub bidirectional: bool,
    pub cell: CellSpec,
    pub squeeze: SqueezeType,
    /// Random character embeddings instead of zeros.
    pub nonzero_init: bool,
}

impl SubtokenEncoderConfig {
    fn layer_config(&self, d_input: usize, conv_width: usize) -> RecurLayerConfig {
        RecurLayerConfig {
            d_input,
            d_hidden: self.recur_size,
            conv_width,
            bidirectional: self.bidirectional,
            spec: self.cell,
        }
    }
}

/// Character sequence -> word vector encoder shared by every bucket.
#[derive(Module, Debug)]
pub struct SubtokenEncoder<B: Backend> {
    pub embedding: Embedding<B>,
    pub first: RecurLayer<B>,
    pub rest: Vec<RecurLayer<B>>,
    pub attention: Option<LinearAttention<B>>,
    pub linear: Linear<B>,
    pub linear_size: usize,
    pub squeeze: Ignored<SqueezeType>,
}

impl ModelConfig for SubtokenEncoderConfig {
    type Model<B: Backend> = SubtokenEncoder<B>;

    fn init_model<B: Backend>(&self, device: &B::Device) -> Self::Model<B> {
        let initializer = if self.nonzero_init {
            Initializer::Normal {
                mean: 0.0,
                std: 1.0,
            }
        } else {
            Initializer::Zeros
        };
        let first = self.layer_config(self.embed_size, self.first_layer_conv_width);
        let d_recur = first.output_dim();
        let rest = (1..self.n_layers.max(1))
            .map(|_| self.layer_config(d_recur, self.conv_width).init_model(device))
            .collect();

        SubtokenEncoder {
            embedding: EmbeddingConfig::new(self.n_chars, self.embed_size)
                .with_initializer(initializer)
                .init(device),
            first: first.init_model(device),
            rest,
            attention: (self.squeeze == SqueezeType::LinearAttention)
                .then(|| LinearAttentionConfig { d_input: d_recur }.init_model(device)),
            linear: LinearConfig::new(self.squeeze.output_dim(d_recur), self.linear_size)
                .init(device),
            linear_size: self.linear_size,
            squeeze: Ignored(self.squeeze),
        }
    }
}

impl<B: Backend> SubtokenEncoder<B> {
    pub fn device(&self) -> B::Device {
        self.embedding.weight.val().device()
    }

    pub fn output_dim(&self) -> usize {
        self.linear_size
    }

    /// Encodes one bucket of `[words, width]` character ids into `[words, linear_size]`.
    pub fn forward(&self, chars: SeqTensor<B, 2, Int>, keep: &KeepProbs) -> Tensor<B, 2> {
        let layer = chars.map(|ids| self.embedding.forward(ids));
        let mask = layer.float_mask();
        let layer = layer.map(|xs| xs * mask);

        let (mut layer, mut final_state) = self.first.forward(layer, keep);
        for recur in &self.rest {
            (layer, final_state) = recur.forward(layer, keep);
        }

        let squeezed = match &self.attention {
            Some(attention) => attention.forward(&layer, keep.linear).1,
            None => split_final_state(*self.squeeze, final_state),
        };
        let [batch_size, d] = squeezed.dims();
        self.linear
            .forward(dropout(squeezed, keep.linear, [batch_size, d]))
    }
}
