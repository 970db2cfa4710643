//! BiLSTM tagger for predicate-conditioned argument labeling, with a
//! predicate-head detector sharing its word embeddings.

use candle_core::{D, Result, Tensor};
use candle_nn::{Embedding, Linear, Module, VarBuilder, ops};

use crate::model::batch::Batch;
use crate::model::bilstm::BiLstm;
use crate::model::config::ModelConfig;

/// Variable name prefix of the word embedding matrix.
pub const WORD_EMBEDDING: &str = "word_emb";

pub struct OieModel {
    word_emb: Embedding,
    indicator_emb: Embedding,
    tagger: Vec<BiLstm>,
    tag_head: Linear,
    detector: BiLstm,
    detector_head: Linear,
    config: ModelConfig,
}

impl OieModel {
    /// Build a model around an existing word embedding (frozen or trainable).
    pub fn new(config: ModelConfig, word_emb: Embedding, vb: VarBuilder) -> Result<Self> {
        let indicator_emb = candle_nn::embedding(2, config.indicator_dim, vb.pp("indicator_emb"))?;

        let mut tagger = Vec::with_capacity(config.num_layers);
        let mut in_dim = config.input_dim();
        for layer in 0..config.num_layers {
            tagger.push(BiLstm::new(
                in_dim,
                config.hidden_units,
                vb.pp(format!("tagger.{layer}")),
            )?);
            in_dim = 2 * config.hidden_units;
        }
        let tag_head = candle_nn::linear(in_dim, config.num_tags, vb.pp("tag_head"))?;

        let detector = BiLstm::new(config.emb_dim, config.hidden_units, vb.pp("detector"))?;
        let detector_head = candle_nn::linear(2 * config.hidden_units, 2, vb.pp("detector_head"))?;

        Ok(Self {
            word_emb,
            indicator_emb,
            tagger,
            tag_head,
            detector,
            detector_head,
            config,
        })
    }

    /// Load every variable, including the word embedding, from `vb`.
    pub fn load(config: ModelConfig, vb: VarBuilder) -> Result<Self> {
        let word_emb = candle_nn::embedding(config.vocab_size, config.emb_dim, vb.pp(WORD_EMBEDDING))?;
        Self::new(config, word_emb, vb)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn word_embeddings(&self) -> &Tensor {
        self.word_emb.embeddings()
    }

    fn dropout(xs: Tensor, p: f32, train: bool) -> Result<Tensor> {
        if train && p > 0.0 {
            ops::dropout(&xs, p)
        } else {
            Ok(xs)
        }
    }

    /// Tag scores, `(B, T, num_tags)`.
    pub fn tag_logits(&self, batch: &Batch, train: bool) -> Result<Tensor> {
        let (b, t) = batch.word_ids.dims2()?;
        let words = self.word_emb.forward(&batch.word_ids)?;
        let predicate = self
            .word_emb
            .forward(&batch.pred_word_ids)?
            .unsqueeze(1)?
            .broadcast_as((b, t, self.config.emb_dim))?;
        let indicator = self.indicator_emb.forward(&batch.pred_indicator)?;

        let mut xs = Tensor::cat(&[&words, &predicate, &indicator], 2)?;
        xs = Self::dropout(xs, self.config.emb_dropout, train)?;

        for layer in &self.tagger {
            xs = layer.forward(&xs, &batch.reverse_index)?;
        }

        let xs = Self::dropout(xs, self.config.pred_dropout, train)?;
        self.tag_head.forward(&xs)
    }

    /// Predicate-head scores, `(B, T, 2)`.
    pub fn predicate_logits(&self, batch: &Batch, train: bool) -> Result<Tensor> {
        let words = self.word_emb.forward(&batch.word_ids)?;
        let xs = Self::dropout(words, self.config.emb_dropout, train)?;
        let xs = self.detector.forward(&xs, &batch.reverse_index)?;
        let xs = Self::dropout(xs, self.config.pred_dropout, train)?;
        self.detector_head.forward(&xs)
    }

    /// Mean cross entropy over real tokens for both heads.
    ///
    /// Requires gold `tag_ids` and `pred_targets` on the batch.
    pub fn loss(&self, batch: &Batch, train: bool) -> Result<Tensor> {
        let (tag_ids, pred_targets) = match (&batch.tag_ids, &batch.pred_targets) {
            (Some(t), Some(p)) => (t, p),
            _ => candle_core::bail!("batch carries no gold targets"),
        };

        let tag_loss = masked_cross_entropy(&self.tag_logits(batch, train)?, tag_ids, batch)?;
        let pred_loss =
            masked_cross_entropy(&self.predicate_logits(batch, train)?, pred_targets, batch)?;
        tag_loss + pred_loss
    }

    /// Per-token tag probabilities, trimmed to each run's length.
    pub fn tag_probabilities(&self, batch: &Batch) -> Result<Vec<Vec<Vec<f32>>>> {
        let probs = ops::softmax_last_dim(&self.tag_logits(batch, false)?)?;
        Ok(trim(probs.to_vec3::<f32>()?, &batch.lengths))
    }

    /// Per-token probability of being a predicate head.
    pub fn predicate_probabilities(&self, batch: &Batch) -> Result<Vec<Vec<f32>>> {
        let probs = ops::softmax_last_dim(&self.predicate_logits(batch, false)?)?;
        let positive = probs.narrow(D::Minus1, 1, 1)?.squeeze(D::Minus1)?;
        Ok(trim(positive.to_vec2::<f32>()?, &batch.lengths))
    }
}

fn masked_cross_entropy(logits: &Tensor, targets: &Tensor, batch: &Batch) -> Result<Tensor> {
    let (b, t, c) = logits.dims3()?;
    let logits = logits
        .reshape((b * t, c))?
        .index_select(&batch.valid_positions, 0)?;
    let targets = targets
        .flatten_all()?
        .index_select(&batch.valid_positions, 0)?;
    candle_nn::loss::cross_entropy(&logits, &targets)
}

fn trim<T>(rows: Vec<Vec<T>>, lengths: &[usize]) -> Vec<Vec<T>> {
    rows.into_iter()
        .zip(lengths)
        .map(|(mut row, &len)| {
            row.truncate(len);
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::batch::BatchItem;
    use candle_core::{DType, Device};
    use candle_nn::{Optimizer, ParamsAdamW, VarMap};

    fn config() -> ModelConfig {
        ModelConfig {
            vocab_size: 12,
            emb_dim: 4,
            num_tags: 4,
            hidden_units: 6,
            num_layers: 2,
            indicator_dim: 2,
            emb_dropout: 0.0,
            pred_dropout: 0.0,
        }
    }

    fn batch(device: &Device) -> Batch {
        let items = vec![
            BatchItem {
                tag_ids: Some(vec![2, 1, 3]),
                predicate_heads: Some(vec![false, true, false]),
                ..BatchItem::new(vec![4, 5, 6], 1)
            },
            BatchItem {
                tag_ids: Some(vec![1, 2]),
                predicate_heads: Some(vec![true, false]),
                ..BatchItem::new(vec![7, 8], 0)
            },
        ];
        Batch::from_items(&items, device).unwrap()
    }

    #[test]
    fn test_output_shapes() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = OieModel::load(config(), vb).unwrap();
        let batch = batch(&device);

        assert_eq!(model.tag_logits(&batch, false).unwrap().dims(), &[2, 3, 4]);
        assert_eq!(model.predicate_logits(&batch, false).unwrap().dims(), &[2, 3, 2]);

        let probs = model.tag_probabilities(&batch).unwrap();
        assert_eq!(probs[0].len(), 3);
        assert_eq!(probs[1].len(), 2);
        let total: f32 = probs[1][0].iter().sum();
        assert!((total - 1.0).abs() < 1e-5);

        let heads = model.predicate_probabilities(&batch).unwrap();
        assert_eq!(heads[1].len(), 2);
        assert!(heads[0].iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_loss_decreases_with_training() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = OieModel::load(config(), vb).unwrap();
        let batch = batch(&device);

        let mut opt = candle_nn::AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: 0.05,
                ..Default::default()
            },
        )
        .unwrap();

        let initial = model.loss(&batch, true).unwrap().to_scalar::<f32>().unwrap();
        for _ in 0..30 {
            let loss = model.loss(&batch, true).unwrap();
            opt.backward_step(&loss).unwrap();
        }
        let trained = model.loss(&batch, false).unwrap().to_scalar::<f32>().unwrap();

        assert!(trained < initial, "loss went from {initial} to {trained}");
    }

    #[test]
    fn test_loss_requires_targets() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = OieModel::load(config(), vb).unwrap();
        let batch = Batch::from_items(&[BatchItem::new(vec![1, 2], 1)], &device).unwrap();

        assert!(model.loss(&batch, false).is_err());
    }
}
