use std::sync::{Arc, OnceLock};

use burn::{
    Tensor,
    prelude::*,
    tensor::{BasicOps, TensorKind},
};

use crate::feed::BucketFeed;

/// A padded batch of sequences together with their true lengths.
#[derive(Clone, Debug)]
pub struct SeqTensor<B: Backend, const D: usize, K: TensorKind<B> = Float> {
    tensor: Tensor<B, D, K>,
    seq_lengths: Arc<[usize]>,
    mask: Arc<OnceLock<Tensor<B, 2, Bool>>>,
}

impl<B: Backend, const D: usize, K: TensorKind<B> + BasicOps<B>> SeqTensor<B, D, K> {
    fn assert_contents(&self) {
        assert_eq!(self.tensor.dims()[0], self.seq_lengths.len());
        if let Some(max) = self.seq_lengths.iter().copied().max() {
            assert!(self.tensor.dims()[1] >= max);
        }
        if let Some(mask) = self.mask.get() {
            assert_eq!(self.tensor.dims()[0..2], mask.dims());
        }
    }

    pub fn new(tensor: Tensor<B, D, K>, seq_lengths: impl Into<Vec<usize>>) -> Self {
        let seq_lengths = seq_lengths.into();
        let this = Self {
            tensor,
            seq_lengths: seq_lengths.into(),
            mask: Default::default(),
        };
        this.assert_contents();
        this
    }

    pub fn replace<const D_: usize, K_: TensorKind<B> + BasicOps<B>>(
        self,
        new_tensor: Tensor<B, D_, K_>,
    ) -> SeqTensor<B, D_, K_> {
        let this = SeqTensor {
            tensor: new_tensor,
            seq_lengths: self.seq_lengths,
            mask: self.mask,
        };
        this.assert_contents();
        this
    }

    pub fn map<
        const D_: usize,
        K_: TensorKind<B> + BasicOps<B>,
        F: FnOnce(Tensor<B, D, K>) -> Tensor<B, D_, K_>,
    >(
        self,
        f: F,
    ) -> SeqTensor<B, D_, K_> {
        let this = SeqTensor {
            tensor: f(self.tensor),
            seq_lengths: self.seq_lengths,
            mask: self.mask,
        };
        this.assert_contents();
        this
    }

    pub fn device(&self) -> B::Device {
        self.tensor.device()
    }
    pub fn batch_size(&self) -> usize {
        self.tensor.dims()[0]
    }
    pub fn max_seq_length(&self) -> usize {
        self.tensor.dims()[1]
    }

    pub fn tensor(&self) -> &Tensor<B, D, K> {
        &self.tensor
    }
    pub fn into_tensor(self) -> Tensor<B, D, K> {
        self.tensor
    }
    pub fn seq_lengths(&self) -> &[usize] {
        &self.seq_lengths
    }

    /// Sequence mask.
    ///
    /// Each batch item looks like that: `[1, ..., 1, 0, ..., 0]`.
    pub fn mask(&self) -> &Tensor<B, 2, Bool> {
        self.mask.get_or_init(|| {
            mask_from_seq_lengths(
                &self.seq_lengths,
                self.max_seq_length(),
                &self.tensor.device(),
            )
        })
    }

    /// [`Self::mask`] as `0.0`/`1.0` with a trailing unit axis, for broadcasting
    /// against `[batch, time, features]`.
    pub fn float_mask(&self) -> Tensor<B, 3> {
        self.mask().clone().float().unsqueeze_dim(2)
    }
}

fn mask_from_seq_lengths<B: Backend>(
    seq_lengths: &[usize],
    max_seq_length: usize,
    device: &B::Device,
) -> Tensor<B, 2, Bool> {
    let range = Tensor::<B, 1, Int>::arange(0..(max_seq_length as i64), device).unsqueeze_dim(0);
    let seq_lengths = Tensor::<B, 1, Int>::from_data(
        TensorData::new(
            seq_lengths.iter().map(|n| *n as i64).collect::<Vec<_>>(),
            [seq_lengths.len()],
        ),
        device,
    )
    .unsqueeze_dim(1);
    range.lower(seq_lengths)
}

impl<B: Backend> SeqTensor<B, 2, Int> {
    /// Character ids of one bucket feed, shaped `[rows, width]`.
    pub fn from_bucket(feed: &BucketFeed, device: &B::Device) -> Self {
        let ids = feed.char_ids.iter().map(|i| *i as i64).collect::<Vec<_>>();
        let tensor = Tensor::from_data(TensorData::new(ids, [feed.rows(), feed.width]), device);
        Self::new(tensor, feed.seq_lengths.clone())
    }
}
