use burn::{prelude::*, tensor::Distribution};

/// Inverted dropout with a mask of `noise_shape`, broadcast over `x`.
///
/// Dimensions of size one in `noise_shape` share one mask entry, which is how
/// whole vectors or whole time axes are dropped together.
pub fn dropout<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    keep_prob: f64,
    noise_shape: [usize; D],
) -> Tensor<B, D> {
    if keep_prob >= 1.0 {
        return x;
    }
    let mask = Tensor::<B, D>::random(noise_shape, Distribution::Bernoulli(keep_prob), &x.device());
    x * mask.div_scalar(keep_prob)
}

/// Keep probabilities for one encoding call.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct KeepProbs {
    pub conv: f64,
    pub recur: f64,
    pub linear: f64,
}

impl KeepProbs {
    pub const ALL: Self = Self {
        conv: 1.0,
        recur: 1.0,
        linear: 1.0,
    };
}
