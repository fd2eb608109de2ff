mod seq;

pub use seq::SeqTensor;

use burn::prelude::*;

/// Row indices as a 1-d int tensor, for `select`.
pub fn index_tensor<B: Backend>(indices: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
    let data: Vec<i64> = indices.iter().map(|i| *i as i64).collect();
    Tensor::from_data(TensorData::new(data, [indices.len()]), device)
}
