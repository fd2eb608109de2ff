use burn::{
    module::Ignored,
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::sigmoid,
};

use crate::{
    model::{
        ModelConfig,
        dropout::{KeepProbs, dropout},
        strategy::{DropType, RecurCell, RecurFunc},
    },
    util::SeqTensor,
};

/// Gating structure of a recurrent cell.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CellSpec {
    pub cell: RecurCell,
    pub func: RecurFunc,
    pub cifg: bool,
    pub nog: bool,
    pub drop_type: DropType,
}

#[derive(Clone, Debug)]
pub struct CellState<B: Backend> {
    pub hidden: Tensor<B, 2>,
    /// Equal to `hidden` for cells without a separate memory.
    pub cell: Tensor<B, 2>,
}

#[derive(Clone, Debug)]
pub struct CellConfig {
    pub d_input: usize,
    pub d_hidden: usize,
    pub spec: CellSpec,
}

/// One direction of a recurrent layer.
#[derive(Module, Debug)]
pub struct Cell<B: Backend> {
    /// `[x; h] -> n_gates × d_hidden`.
    pub gates: Linear<B>,
    /// GRU candidate, computed from `[x; r ⊙ h]`.
    pub candidate: Option<Linear<B>>,
    pub d_hidden: usize,
    pub spec: Ignored<CellSpec>,
}

impl ModelConfig for CellConfig {
    type Model<B: Backend> = Cell<B>;

    fn init_model<B: Backend>(&self, device: &B::Device) -> Self::Model<B> {
        let d_in = self.d_input + self.d_hidden;
        let n_gates = self.spec.cell.n_gates(self.spec.cifg, self.spec.nog);
        Cell {
            gates: LinearConfig::new(d_in, n_gates * self.d_hidden).init(device),
            candidate: (self.spec.cell == RecurCell::Gru)
                .then(|| LinearConfig::new(d_in, self.d_hidden).init(device)),
            d_hidden: self.d_hidden,
            spec: Ignored(self.spec),
        }
    }
}

impl<B: Backend> Cell<B> {
    pub fn init_state(&self, batch_size: usize, device: &B::Device) -> CellState<B> {
        let zeros = Tensor::zeros([batch_size, self.d_hidden], device);
        CellState {
            hidden: zeros.clone(),
            cell: zeros,
        }
    }

    pub fn forward_step(&self, x: Tensor<B, 2>, state: CellState<B>) -> CellState<B> {
        let CellSpec {
            cell,
            func,
            cifg,
            nog,
            ..
        } = *self.spec;
        let d = self.d_hidden;
        let zs = self
            .gates
            .forward(Tensor::cat(vec![x.clone(), state.hidden.clone()], 1));
        let gate = |k: usize| zs.clone().narrow(1, k * d, d);

        match cell {
            RecurCell::Rnn => {
                let hidden = func.apply(gate(0));
                CellState {
                    hidden: hidden.clone(),
                    cell: hidden,
                }
            }
            RecurCell::Gru => {
                let update = sigmoid(gate(0));
                let reset = sigmoid(gate(1));
                let candidate = self
                    .candidate
                    .as_ref()
                    .expect("GRU cells are built with a candidate projection");
                let proposal = func.apply(
                    candidate.forward(Tensor::cat(vec![x, reset * state.hidden.clone()], 1)),
                );
                let hidden =
                    update.clone() * state.hidden + update.neg().add_scalar(1.0) * proposal;
                CellState {
                    hidden: hidden.clone(),
                    cell: hidden,
                }
            }
            RecurCell::Lstm => {
                let proposal = func.apply(gate(0));
                let forget = sigmoid(gate(1));
                let input = if cifg {
                    forget.clone().neg().add_scalar(1.0)
                } else {
                    sigmoid(gate(2))
                };
                let cell = forget * state.cell + input * proposal;
                let hidden = if nog {
                    func.apply(cell.clone())
                } else {
                    sigmoid(gate(2 + usize::from(!cifg))) * func.apply(cell.clone())
                };
                CellState { hidden, cell }
            }
        }
    }

    /// Runs the cell over `[batch, time, d_input]`.
    ///
    /// `mask` is `[batch, time, 1]`; past a sequence's end the state is
    /// carried unchanged and the output is zero, so the returned state is the
    /// one after each sequence's last real step.
    pub fn forward_multiple_steps(
        &self,
        xs: Tensor<B, 3>,
        mask: Tensor<B, 3>,
        recur_keep_prob: f64,
    ) -> (Tensor<B, 3>, CellState<B>) {
        let [batch_size, seq_length, d_input] = xs.dims();
        let device = xs.device();
        let d = self.d_hidden;
        let mut state = self.init_state(batch_size, &device);
        if seq_length == 0 {
            return (Tensor::zeros([batch_size, 0, d], &device), state);
        }

        let noise = || {
            let ones = Tensor::ones([batch_size, d], &device);
            dropout(ones, recur_keep_prob, [batch_size, d])
        };
        let shared_noise = (self.spec.drop_type == DropType::Recurrent).then(noise);

        let mut ys = Vec::with_capacity(seq_length);
        for t in 0..seq_length {
            let x = xs.clone().narrow(1, t, 1).reshape([batch_size, d_input]);
            let m = mask.clone().narrow(1, t, 1).reshape([batch_size, 1]);
            let keep = m.clone().neg().add_scalar(1.0);

            let hidden_in = match &shared_noise {
                Some(n) => state.hidden.clone() * n.clone(),
                None => state.hidden.clone() * noise(),
            };
            let next = self.forward_step(
                x,
                CellState {
                    hidden: hidden_in,
                    cell: state.cell.clone(),
                },
            );
            state = CellState {
                hidden: next.hidden * m.clone() + state.hidden * keep.clone(),
                cell: next.cell * m.clone() + state.cell * keep,
            };
            ys.push((state.hidden.clone() * m).unsqueeze_dim(1));
        }
        (Tensor::cat(ys, 1), state)
    }
}

/// Concatenates, at every step, the `width` inputs centered on it.
///
/// Steps outside the sequence read as zeros.
pub fn conv_window<B: Backend>(xs: Tensor<B, 3>, width: usize) -> Tensor<B, 3> {
    if width <= 1 {
        return xs;
    }
    let [batch_size, seq_length, d] = xs.dims();
    let device = xs.device();
    let (left, right) = ((width - 1) / 2, width / 2);

    let mut parts = Vec::with_capacity(3);
    if left > 0 {
        parts.push(Tensor::zeros([batch_size, left, d], &device));
    }
    parts.push(xs);
    if right > 0 {
        parts.push(Tensor::zeros([batch_size, right, d], &device));
    }
    let padded = Tensor::cat(parts, 1);
    Tensor::cat(
        (0..width)
            .map(|k| padded.clone().narrow(1, k, seq_length))
            .collect(),
        2,
    )
}

/// Reverses the first `len` steps of every sequence, leaving padding in place.
pub fn reverse_sequences<B: Backend>(xs: Tensor<B, 3>, seq_lengths: &[usize]) -> Tensor<B, 3> {
    let [batch_size, seq_length, d] = xs.dims();
    let indices = seq_lengths
        .iter()
        .flat_map(|&n| {
            (0..seq_length).map(move |t| if t < n { (n - 1 - t) as i64 } else { t as i64 })
        })
        .collect::<Vec<_>>();
    let indices: Tensor<B, 3, Int> = Tensor::<B, 2, Int>::from_data(
        TensorData::new(indices, [batch_size, seq_length]),
        &xs.device(),
    )
    .unsqueeze_dim(2);
    xs.gather(1, indices.repeat_dim(2, d))
}

#[derive(Clone, Debug)]
pub struct RecurLayerConfig {
    pub d_input: usize,
    pub d_hidden: usize,
    pub conv_width: usize,
    pub bidirectional: bool,
    pub spec: CellSpec,
}

impl RecurLayerConfig {
    pub fn output_dim(&self) -> usize {
        if self.bidirectional {
            2 * self.d_hidden
        } else {
            self.d_hidden
        }
    }
}

/// A convolution-widened, optionally bidirectional recurrent layer.
#[derive(Module, Debug)]
pub struct RecurLayer<B: Backend> {
    pub forward_cell: Cell<B>,
    pub backward_cell: Option<Cell<B>>,
    pub conv_width: usize,
    pub drop_type: Ignored<DropType>,
}

impl ModelConfig for RecurLayerConfig {
    type Model<B: Backend> = RecurLayer<B>;

    fn init_model<B: Backend>(&self, device: &B::Device) -> Self::Model<B> {
        let conv_width = self.conv_width.max(1);
        let cell = CellConfig {
            d_input: self.d_input * conv_width,
            d_hidden: self.d_hidden,
            spec: self.spec,
        };
        RecurLayer {
            forward_cell: cell.init_model(device),
            backward_cell: self.bidirectional.then(|| cell.init_model(device)),
            conv_width,
            drop_type: Ignored(self.spec.drop_type),
        }
    }
}

impl<B: Backend> RecurLayer<B> {
    /// Returns per-step outputs and the final state
    /// `[hidden_fw, hidden_bw, cell_fw, cell_bw]`.
    pub fn forward(
        &self,
        xs: SeqTensor<B, 3>,
        keep: &KeepProbs,
    ) -> (SeqTensor<B, 3>, Tensor<B, 2>) {
        let mask = xs.float_mask();
        let inputs = conv_window(xs.tensor().clone(), self.conv_width);
        let noise_shape = self.drop_type.sequence_noise(inputs.dims());
        let inputs = dropout(inputs, keep.conv, noise_shape);

        let (forward, forward_state) =
            self.forward_cell.forward_multiple_steps(inputs.clone(), mask.clone(), keep.recur);
        let (ys, hidden, cell) = match &self.backward_cell {
            None => (forward, forward_state.hidden, forward_state.cell),
            Some(backward_cell) => {
                let reversed = reverse_sequences(inputs, xs.seq_lengths());
                let (backward, backward_state) =
                    backward_cell.forward_multiple_steps(reversed, mask, keep.recur);
                let backward = reverse_sequences(backward, xs.seq_lengths());
                (
                    Tensor::cat(vec![forward, backward], 2),
                    Tensor::cat(vec![forward_state.hidden, backward_state.hidden], 1),
                    Tensor::cat(vec![forward_state.cell, backward_state.cell], 1),
                )
            }
        };
        (xs.replace(ys), Tensor::cat(vec![hidden, cell], 1))
    }
}
