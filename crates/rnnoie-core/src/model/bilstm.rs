use candle_core::{Result, Tensor};
use candle_nn::{LSTM, LSTMConfig, RNN, VarBuilder};

/// Bidirectional LSTM over padded batches.
///
/// The backward direction reads each row reversed within its own length,
/// so trailing padding never reaches real tokens.
pub struct BiLstm {
    forward: LSTM,
    backward: LSTM,
}

impl BiLstm {
    pub fn new(in_dim: usize, hidden_dim: usize, vb: VarBuilder) -> Result<Self> {
        let forward = candle_nn::lstm(in_dim, hidden_dim, LSTMConfig::default(), vb.pp("forward"))?;
        let backward = candle_nn::lstm(in_dim, hidden_dim, LSTMConfig::default(), vb.pp("backward"))?;
        Ok(Self { forward, backward })
    }

    /// `xs`: `(B, T, in_dim)`, `reverse_index`: `(B, T)` u32.
    /// Returns `(B, T, 2 * hidden_dim)`.
    pub fn forward(&self, xs: &Tensor, reverse_index: &Tensor) -> Result<Tensor> {
        let fwd = self.forward.states_to_tensor(&self.forward.seq(xs)?)?;

        let reversed = reverse_within(xs, reverse_index)?;
        let bwd = self.backward.states_to_tensor(&self.backward.seq(&reversed)?)?;
        let bwd = reverse_within(&bwd, reverse_index)?;

        Tensor::cat(&[&fwd, &bwd], 2)
    }
}

/// Apply a per-row position permutation along dim 1.
pub fn reverse_within(xs: &Tensor, reverse_index: &Tensor) -> Result<Tensor> {
    let (b, t, d) = xs.dims3()?;
    let index = reverse_index
        .unsqueeze(2)?
        .broadcast_as((b, t, d))?
        .contiguous()?;
    xs.contiguous()?.gather(&index, 1)
}
