//! Named encoder strategies.
//!
//! Configuration refers to cells, nonlinearities and dropout schemes by name;
//! each slot is a closed enum so an unknown name is rejected up front with
//! the list of accepted ones.

use std::str::FromStr;

use burn::{prelude::*, tensor::activation};
use strum::{Display, EnumString, VariantNames};

use crate::{
    error::{SubtokenError, SubtokenResult},
    model::dropout::dropout,
};

pub fn resolve<T: FromStr + VariantNames>(kind: &'static str, name: &str) -> SubtokenResult<T> {
    name.parse::<T>().map_err(|_| SubtokenError::UnknownStrategy {
        kind,
        name: name.to_owned(),
        valid: T::VARIANTS.join(", "),
    })
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, EnumString, VariantNames)]
pub enum RecurCell {
    #[strum(serialize = "RNNCell")]
    Rnn,
    #[strum(serialize = "GRUCell")]
    Gru,
    #[strum(serialize = "LSTMCell")]
    Lstm,
}

impl RecurCell {
    /// Gate blocks computed from `[x; h]` by the cell's main projection.
    pub fn n_gates(self, cifg: bool, nog: bool) -> usize {
        match self {
            Self::Rnn => 1,
            Self::Gru => 2,
            Self::Lstm => 2 + usize::from(!cifg) + usize::from(!nog),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, EnumString, VariantNames)]
#[strum(serialize_all = "snake_case")]
pub enum RecurFunc {
    Tanh,
    Relu,
    Sigmoid,
    Gelu,
    Identity,
    LeakyRelu,
}

impl RecurFunc {
    pub fn apply<B: Backend, const D: usize>(self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Self::Tanh => activation::tanh(x),
            Self::Relu => activation::relu(x),
            Self::Sigmoid => activation::sigmoid(x),
            Self::Gelu => activation::gelu(x),
            Self::Identity => x,
            Self::LeakyRelu => activation::leaky_relu(x, 0.1),
        }
    }
}

/// Dropout applied to final word embeddings.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, EnumString, VariantNames)]
#[strum(serialize_all = "snake_case")]
pub enum DropFunc {
    /// Independent per element.
    Dropout,
    /// Whole vectors at once.
    Unkout,
}

impl DropFunc {
    pub fn apply<B: Backend, const D: usize>(
        self,
        x: Tensor<B, D>,
        keep_prob: f64,
    ) -> Tensor<B, D> {
        let mut noise_shape = x.dims();
        if self == Self::Unkout {
            noise_shape[D - 1] = 1;
        }
        dropout(x, keep_prob, noise_shape)
    }
}

/// How dropout masks vary along the time axis.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, EnumString, VariantNames)]
#[strum(serialize_all = "snake_case")]
pub enum DropType {
    /// One mask per sequence, shared by every step.
    Recurrent,
    /// A fresh mask at every step.
    Dropout,
}

impl DropType {
    /// Noise shape for a `[batch, time, features]` input.
    pub fn sequence_noise(self, [b, s, d]: [usize; 3]) -> [usize; 3] {
        match self {
            Self::Recurrent => [b, 1, d],
            Self::Dropout => [b, s, d],
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, EnumString, VariantNames)]
#[strum(serialize_all = "snake_case")]
pub enum SqueezeType {
    LinearAttention,
    FinalHidden,
    FinalCell,
    FinalState,
}

impl SqueezeType {
    /// Width of the squeezed vector for a recurrent output of `d_recur`.
    pub fn output_dim(self, d_recur: usize) -> usize {
        match self {
            Self::FinalState => 2 * d_recur,
            _ => d_recur,
        }
    }
}
