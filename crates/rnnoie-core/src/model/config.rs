use serde::{Deserialize, Serialize};

use crate::io::hyperparams::Hyperparams;

/// Network dimensions, persisted next to the weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub vocab_size: usize,
    pub emb_dim: usize,
    pub num_tags: usize,
    pub hidden_units: usize,
    pub num_layers: usize,
    pub indicator_dim: usize,
    pub emb_dropout: f32,
    pub pred_dropout: f32,
}

impl ModelConfig {
    pub fn from_hyperparams(
        params: &Hyperparams,
        vocab_size: usize,
        emb_dim: usize,
        num_tags: usize,
    ) -> Self {
        Self {
            vocab_size,
            emb_dim,
            num_tags,
            hidden_units: params.hidden_units,
            num_layers: params.num_of_latent_layers,
            indicator_dim: params.pred_indicator_dim,
            emb_dropout: params.emb_dropout,
            pred_dropout: params.pred_dropout,
        }
    }

    /// Per-token input width: word ⊕ predicate word ⊕ indicator.
    pub fn input_dim(&self) -> usize {
        2 * self.emb_dim + self.indicator_dim
    }
}
