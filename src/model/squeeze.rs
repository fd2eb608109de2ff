use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::softmax,
};

use crate::{
    model::{ModelConfig, dropout::dropout, strategy::SqueezeType},
    util::SeqTensor,
};

#[derive(Clone, Debug)]
pub struct LinearAttentionConfig {
    pub d_input: usize,
}

/// Scores every step with one linear unit and sums the steps by their
/// softmax weights. Padding steps get no weight.
#[derive(Module, Debug)]
pub struct LinearAttention<B: Backend> {
    pub score: Linear<B>,
}

impl ModelConfig for LinearAttentionConfig {
    type Model<B: Backend> = LinearAttention<B>;

    fn init_model<B: Backend>(&self, device: &B::Device) -> Self::Model<B> {
        LinearAttention {
            score: LinearConfig::new(self.d_input, 1).init(device),
        }
    }
}

impl<B: Backend> LinearAttention<B> {
    /// Returns `(weights [batch, time], summed [batch, features])`.
    pub fn forward(&self, xs: &SeqTensor<B, 3>, keep_prob: f64) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let [batch_size, seq_length, d] = xs.tensor().dims();
        let inputs = dropout(xs.tensor().clone(), keep_prob, [batch_size, 1, d]);
        let scores = self
            .score
            .forward(inputs)
            .reshape([batch_size, seq_length])
            .mask_fill(xs.mask().clone().bool_not(), -1e9);
        let weights = softmax(scores, 1);
        let summed = (xs.tensor().clone() * weights.clone().unsqueeze_dim(2))
            .sum_dim(1)
            .reshape([batch_size, d]);
        (weights, summed)
    }
}

/// Picks the part of a `[hidden; cell]` final state a squeeze type keeps.
pub fn split_final_state<B: Backend>(
    squeeze: SqueezeType,
    final_state: Tensor<B, 2>,
) -> Tensor<B, 2> {
    let half = final_state.dims()[1] / 2;
    match squeeze {
        SqueezeType::FinalHidden => final_state.narrow(1, 0, half),
        SqueezeType::FinalCell => final_state.narrow(1, half, half),
        SqueezeType::FinalState | SqueezeType::LinearAttention => final_state,
    }
}
