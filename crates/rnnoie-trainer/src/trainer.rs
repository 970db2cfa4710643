//! Training loop for the BiLSTM tagger.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{AdamW, Embedding, Optimizer, ParamsAdamW, SGD, VarBuilder, VarMap};
use rnnoie_core::extractor::{Extractor, RunDecoder};
use rnnoie_core::io::{
    Glove, Hyperparams, ModelDir, ModelMeta, OieInstance, OptimizerKind, Vocabulary,
};
use rnnoie_core::model::{Batch, BatchItem, ModelConfig, OieModel, WORD_EMBEDDING};
use rnnoie_core::tagging::{OieTag, TagSet};
use rnnoie_core::types::{MetricsReport, SpanMetrics};
use tracing::{debug, info};

use crate::data::{Dataset, Encoder, map_unknown_labels, shuffled_indices};

/// Dev runs printed after every epoch at debug level.
const SAMPLE_RUNS: usize = 3;

/// Default output directory of `train`.
pub const DEFAULT_SAVETO: &str = "models/rnnoie";

/// Inputs of a training run.
#[derive(Debug, Clone)]
pub struct TrainArgs {
    pub train: PathBuf,
    pub dev: PathBuf,
    pub test: PathBuf,
    pub hyperparams: PathBuf,
    pub saveto: PathBuf,
}

enum TrainOptimizer {
    Adam(AdamW),
    Sgd(SGD),
}

impl TrainOptimizer {
    fn new(kind: OptimizerKind, vars: Vec<Var>, learning_rate: f64) -> candle_core::Result<Self> {
        Ok(match kind {
            OptimizerKind::Adam => Self::Adam(AdamW::new(
                vars,
                ParamsAdamW {
                    lr: learning_rate,
                    weight_decay: 0.0,
                    ..Default::default()
                },
            )?),
            OptimizerKind::Sgd => Self::Sgd(SGD::new(vars, learning_rate)?),
        })
    }

    fn backward_step(&mut self, loss: &Tensor) -> candle_core::Result<()> {
        match self {
            Self::Adam(opt) => opt.backward_step(loss),
            Self::Sgd(opt) => opt.backward_step(loss),
        }
    }
}

/// Outcome of one epoch.
#[derive(Debug, Clone)]
pub struct EpochSummary {
    pub epoch: usize,
    pub loss: f32,
    pub dev: MetricsReport,
    pub saved: bool,
}

pub struct Trainer {
    params: Hyperparams,
    vocab: Vocabulary,
    tags: TagSet,
    config: ModelConfig,
    varmap: VarMap,
    model: OieModel,
    decoder: RunDecoder,
    /// Word embeddings kept out of the optimizer.
    frozen_embeddings: Option<Tensor>,
    device: Device,
}

impl Trainer {
    /// Build a fresh model initialised with the pretrained embeddings.
    pub fn new(params: Hyperparams, glove: &Glove, tags: TagSet) -> Result<Self> {
        params.validate()?;
        let device = Device::Cpu;
        let vocab = glove.vocab().clone();
        let config = ModelConfig::from_hyperparams(&params, vocab.len(), glove.dim(), tags.len());
        let pretrained = glove.to_tensor(&device)?;

        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let (word_emb, frozen_embeddings) = if params.trainable_emb {
            let emb = candle_nn::embedding(config.vocab_size, config.emb_dim, vb.pp(WORD_EMBEDDING))?;
            varmap.set_one(format!("{WORD_EMBEDDING}.weight"), &pretrained)?;
            (emb, None)
        } else {
            (Embedding::new(pretrained.clone(), config.emb_dim), Some(pretrained))
        };

        let model = OieModel::new(config, word_emb, vb)?;
        info!(
            "Model: {} layers x {} hidden units, {} tags, {} words x {} dims ({} embeddings)",
            config.num_layers,
            config.hidden_units,
            config.num_tags,
            config.vocab_size,
            config.emb_dim,
            if params.trainable_emb { "trainable" } else { "frozen" }
        );

        Ok(Self {
            decoder: RunDecoder::new(&tags),
            params,
            vocab,
            tags,
            config,
            varmap,
            model,
            frozen_embeddings,
            device,
        })
    }

    pub fn model(&self) -> &OieModel {
        &self.model
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Decode runs with their gold predicate heads.
    pub fn predict(&self, instances: &[OieInstance]) -> Result<Vec<Vec<OieTag>>> {
        let mut predictions = Vec::with_capacity(instances.len());
        for chunk in instances.chunks(self.params.batch_size) {
            let items: Vec<BatchItem> = chunk
                .iter()
                .map(|i| {
                    let ids = i.words.iter().map(|w| self.vocab.index(w) as u32).collect();
                    BatchItem::new(ids, i.predicate_head)
                })
                .collect();
            let decoded = self.decoder.tag_batch(&self.model, &items, &self.device)?;
            predictions.extend(decoded.into_iter().map(|(tags, _)| tags));
        }
        Ok(predictions)
    }

    pub fn evaluate(&self, instances: &[OieInstance]) -> Result<SpanMetrics> {
        score(instances, &self.predict(instances)?)
    }

    /// Write weights and metadata to `dir`.
    pub fn save(&self, dir: &ModelDir) -> Result<()> {
        dir.save_meta(&ModelMeta {
            config: self.config,
            hyperparams: self.params.clone(),
            tags: self.tags.clone(),
            vocab: self.vocab.clone(),
        })?;
        self.varmap
            .save(dir.weights_path())
            .with_context(|| format!("failed to write {}", dir.weights_path().display()))?;

        let embeddings = dir.embeddings_path();
        match &self.frozen_embeddings {
            Some(tensor) => tensor.save_safetensors(&format!("{WORD_EMBEDDING}.weight"), &embeddings)?,
            None if embeddings.exists() => std::fs::remove_file(&embeddings)?,
            None => {}
        }
        Ok(())
    }

    fn train_epoch(
        &self,
        optimizer: &mut TrainOptimizer,
        items: &[BatchItem],
        epoch: usize,
    ) -> Result<f32> {
        let order = shuffled_indices(items.len(), self.params.seed.wrapping_add(epoch as u64));

        let mut total = 0.0f32;
        let mut batches = 0usize;
        for chunk in order.chunks(self.params.batch_size) {
            let batch_items: Vec<BatchItem> = chunk.iter().map(|&i| items[i].clone()).collect();
            let batch = Batch::from_items(&batch_items, &self.device)?;
            let loss = self.model.loss(&batch, true)?;
            optimizer.backward_step(&loss)?;

            total += loss.to_scalar::<f32>()?;
            batches += 1;
        }
        Ok(if batches == 0 { 0.0 } else { total / batches as f32 })
    }

    fn log_samples(&self, instances: &[OieInstance], predictions: &[Vec<OieTag>]) {
        for (instance, tags) in instances.iter().zip(predictions).take(SAMPLE_RUNS) {
            let tagged: Vec<String> = instance
                .words
                .iter()
                .zip(tags)
                .map(|(w, t)| format!("{w}/{t}"))
                .collect();
            debug!("Sample: {}", tagged.join(" "));
        }
    }

    /// Train for the configured number of epochs, saving to `output`
    /// whenever dev F1 improves.
    pub fn train(&mut self, dataset: &Dataset, output: &ModelDir) -> Result<Vec<EpochSummary>> {
        if self.params.epochs == 0 {
            bail!("epochs must be positive");
        }
        let encoder = Encoder::new(&self.vocab, &self.tags);
        let items = encoder.encode_split(&dataset.train, Some(self.params.sent_maxlen))?;
        if items.is_empty() {
            bail!("no training runs left after truncation to {} tokens", self.params.sent_maxlen);
        }

        let mut optimizer = TrainOptimizer::new(
            self.params.optimizer,
            self.varmap.all_vars(),
            self.params.learning_rate,
        )?;
        info!(
            "Training on {} runs for {} epochs ({} optimizer, lr {})",
            items.len(),
            self.params.epochs,
            self.params.optimizer,
            self.params.learning_rate
        );

        let mut best: Option<f32> = None;
        let mut summaries = Vec::with_capacity(self.params.epochs);
        for epoch in 0..self.params.epochs {
            let loss = self.train_epoch(&mut optimizer, &items, epoch)?;

            let predictions = self.predict(&dataset.dev)?;
            let dev = score(&dataset.dev, &predictions)?.report();
            self.log_samples(&dataset.dev, &predictions);

            let saved = best.is_none_or(|b| dev.f1 > b);
            if saved {
                best = Some(dev.f1);
                self.save(output)?;
            }

            info!(
                "Epoch {}/{} - loss: {:.4}, dev P: {:.3} R: {:.3} F1: {:.3}{}",
                epoch + 1,
                self.params.epochs,
                loss,
                dev.precision,
                dev.recall,
                dev.f1,
                if saved { " (saved)" } else { "" }
            );
            summaries.push(EpochSummary {
                epoch,
                loss,
                dev,
                saved,
            });
        }

        Ok(summaries)
    }
}

/// Compare predicted tags against the gold labels of each run.
pub fn score(instances: &[OieInstance], predictions: &[Vec<OieTag>]) -> Result<SpanMetrics> {
    if instances.len() != predictions.len() {
        bail!(
            "{} predictions for {} runs",
            predictions.len(),
            instances.len()
        );
    }
    let mut metrics = SpanMetrics::new();
    for (instance, predicted) in instances.iter().zip(predictions) {
        metrics.add(&instance.tags()?, predicted);
    }
    Ok(metrics)
}

/// Evaluate a saved model on CoNLL runs. Labels unknown to the model are
/// scored as `O`.
pub fn evaluate_saved(
    model: &Path,
    mut instances: Vec<OieInstance>,
    batch_size: usize,
) -> Result<MetricsReport> {
    let extractor = Extractor::load(model)
        .with_context(|| format!("failed to load model from {}", model.display()))?;
    map_unknown_labels(&mut instances, extractor.tags());

    let predictions = extractor.predict_tags(&instances, batch_size)?;
    Ok(score(&instances, &predictions)?.report())
}

/// Full training pipeline: load inputs, train, then score the best
/// checkpoint on the test set and write `metrics.json` next to it.
pub fn run_training(args: &TrainArgs) -> Result<MetricsReport> {
    for (name, path) in [
        ("Training data", &args.train),
        ("Dev data", &args.dev),
        ("Test data", &args.test),
        ("Hyperparameter file", &args.hyperparams),
    ] {
        if !path.exists() {
            bail!("{} not found: {}", name, path.display());
        }
    }

    let params = Hyperparams::load(&args.hyperparams)
        .with_context(|| format!("failed to load {}", args.hyperparams.display()))?;
    debug!("Model hyperparams: {:#?}", params);

    let dataset = Dataset::load(&args.train, &args.dev, &args.test)?;
    let glove = Glove::load(&params.emb_filename)
        .with_context(|| format!("failed to load embeddings {}", params.emb_filename.display()))?;

    let output = ModelDir::new(&args.saveto);
    let batch_size = params.batch_size;
    let mut trainer = Trainer::new(params, &glove, dataset.tags.clone())?;
    trainer.train(&dataset, &output)?;

    info!("Evaluating best checkpoint on {}", args.test.display());
    let report = evaluate_saved(output.root(), dataset.test, batch_size)?;
    info!(
        "Test P: {:.3} R: {:.3} F1: {:.3} token accuracy: {:.3}",
        report.precision, report.recall, report.f1, report.token_accuracy
    );
    std::fs::write(output.metrics_path(), serde_json::to_string_pretty(&report)?)?;
    info!("Model saved to {}", output.root().display());

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONLL: &str = "\
word_id\tword\tpred\tpred_id\thead_pred_id\tsent_id\trun_id\tlabel
0\tJohn\tate\t1\t1\t0\t0\tA0-B
1\tate\tate\t1\t1\t0\t0\tP-B
2\tapples\tate\t1\t1\t0\t0\tA1-B

0\tMary\tslept\t1\t1\t1\t1\tA0-B
1\tslept\tslept\t1\t1\t1\t1\tP-B
";

    const GLOVE: &str = "\
john 0.1 0.2 0.3
ate 0.3 -0.1 0.0
apples -0.2 0.4 0.1
mary 0.0 0.1 -0.3
slept 0.2 0.2 0.2
";

    fn write_inputs(dir: &Path, trainable: bool, optimizer: &str) -> TrainArgs {
        std::fs::write(dir.join("glove.txt"), GLOVE).unwrap();
        for split in ["train", "dev", "test"] {
            std::fs::write(dir.join(format!("{split}.conll")), CONLL).unwrap();
        }
        let params = format!(
            r#"{{"hyperparams": {{
                "emb_filename": "glove.txt",
                "batch_size": 2,
                "hidden_units": 4,
                "num_of_latent_layers": 1,
                "pred_indicator_dim": 2,
                "epochs": 2,
                "learning_rate": 0.01,
                "trainable_emb": {trainable},
                "optimizer": "{optimizer}"
            }}}}"#
        );
        std::fs::write(dir.join("params.json"), params).unwrap();

        TrainArgs {
            train: dir.join("train.conll"),
            dev: dir.join("dev.conll"),
            test: dir.join("test.conll"),
            hyperparams: dir.join("params.json"),
            saveto: dir.join("model"),
        }
    }

    #[test]
    fn test_run_training_writes_model_dir() {
        let dir = tempfile::tempdir().unwrap();
        let args = write_inputs(dir.path(), false, "adam");

        let report = run_training(&args).unwrap();
        assert_eq!(report.instances, 2);

        let model_dir = ModelDir::new(&args.saveto);
        assert!(model_dir.weights_path().exists());
        assert!(model_dir.embeddings_path().exists());
        let metrics: MetricsReport =
            serde_json::from_str(&std::fs::read_to_string(model_dir.metrics_path()).unwrap())
                .unwrap();
        assert_eq!(metrics, report);

        let names = model_dir.tensor_names().unwrap();
        assert!(names.contains(&"word_emb.weight".to_string()));
        assert!(names.iter().any(|n| n.starts_with("tagger.0.forward")));
    }

    #[test]
    fn test_trainable_embeddings_saved_with_weights() {
        let dir = tempfile::tempdir().unwrap();
        let args = write_inputs(dir.path(), true, "sgd");

        run_training(&args).unwrap();
        let model_dir = ModelDir::new(&args.saveto);
        assert!(!model_dir.embeddings_path().exists());
        assert!(model_dir.tensor_names().unwrap().contains(&"word_emb.weight".to_string()));
    }

    #[test]
    fn test_first_epoch_always_saves() {
        let dir = tempfile::tempdir().unwrap();
        let args = write_inputs(dir.path(), false, "adam");
        let params = Hyperparams::load(&args.hyperparams).unwrap();
        let dataset = Dataset::load(&args.train, &args.dev, &args.test).unwrap();
        let glove = Glove::load(&params.emb_filename).unwrap();

        let mut trainer = Trainer::new(params, &glove, dataset.tags.clone()).unwrap();
        let summaries = trainer.train(&dataset, &ModelDir::new(&args.saveto)).unwrap();

        assert_eq!(summaries.len(), 2);
        assert!(summaries[0].saved);
        assert!(summaries.iter().all(|s| s.loss.is_finite()));
    }

    #[test]
    fn test_zero_epochs_leaves_previous_model() {
        let dir = tempfile::tempdir().unwrap();
        let args = write_inputs(dir.path(), false, "adam");
        run_training(&args).unwrap();

        let model_dir = ModelDir::new(&args.saveto);
        let metrics = std::fs::read_to_string(model_dir.metrics_path()).unwrap();
        let params = std::fs::read_to_string(&args.hyperparams).unwrap();
        let params = params.replace(r#""epochs": 2"#, r#""epochs": 0"#);
        std::fs::write(&args.hyperparams, params).unwrap();

        assert!(run_training(&args).is_err());
        assert_eq!(std::fs::read_to_string(model_dir.metrics_path()).unwrap(), metrics);
    }

    #[test]
    fn test_trainer_rejects_zero_epochs() {
        let dir = tempfile::tempdir().unwrap();
        let args = write_inputs(dir.path(), false, "adam");
        let mut params = Hyperparams::load(&args.hyperparams).unwrap();
        params.epochs = 0;
        let dataset = Dataset::load(&args.train, &args.dev, &args.test).unwrap();
        let glove = Glove::load(&params.emb_filename).unwrap();

        let mut trainer = Trainer::new(params, &glove, dataset.tags.clone()).unwrap();
        assert!(trainer.train(&dataset, &ModelDir::new(&args.saveto)).is_err());
        assert!(!ModelDir::new(&args.saveto).weights_path().exists());
    }

    #[test]
    fn test_missing_input_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = write_inputs(dir.path(), false, "adam");
        args.dev = dir.path().join("absent.conll");

        let err = run_training(&args).unwrap_err();
        assert!(err.to_string().contains("Dev data not found"));
    }

    #[test]
    fn test_score_rejects_length_mismatch() {
        assert!(score(&[], &[vec![OieTag::Outside]]).is_err());
    }
}
