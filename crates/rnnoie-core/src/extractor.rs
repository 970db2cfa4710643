//! # Extractor
//!
//! Runs a saved model over raw sentences: predicate heads are detected
//! first, then every head gets its own tagging run, decoded under the tag
//! scheme constraints.

use std::path::Path;

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use tracing::debug;

use crate::error::{OieError, Result};
use crate::io::conll::OieInstance;
use crate::io::embeddings::Vocabulary;
use crate::io::model_dir::ModelDir;
use crate::model::{Batch, BatchItem, OieModel};
use crate::tagging::{OieTag, TagSet, Tokenizer, ViterbiDecoder};
use crate::types::Extraction;

/// Floor applied before taking logs so zero probabilities stay finite.
const MIN_PROBABILITY: f32 = 1e-12;

/// Turns tag probabilities of one run into a decoded tag sequence.
#[derive(Debug, Clone)]
pub struct RunDecoder {
    tags: TagSet,
    viterbi: ViterbiDecoder,
}

impl RunDecoder {
    pub fn new(tags: &TagSet) -> Self {
        Self {
            tags: tags.clone(),
            viterbi: ViterbiDecoder::new(tags),
        }
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Decode one run. The predicate head is forced onto a predicate tag.
    ///
    /// Returns the tags and the product of their probabilities.
    pub fn decode(&self, probs: &[Vec<f32>], predicate_head: usize) -> Result<(Vec<OieTag>, f32)> {
        if predicate_head >= probs.len() {
            return Err(OieError::Decode(format!(
                "predicate head {predicate_head} outside run of {} tokens",
                probs.len()
            )));
        }

        let log_probs: Vec<Vec<f32>> = probs
            .iter()
            .map(|row| row.iter().map(|p| p.max(MIN_PROBABILITY).ln()).collect())
            .collect();

        let predicate_only: Vec<bool> = self.tags.tags().iter().map(OieTag::is_predicate).collect();
        let mut allowed = vec![vec![true; self.tags.len()]; probs.len()];
        allowed[predicate_head] = predicate_only;

        let (path, score) = self.viterbi.decode_with_score(&log_probs, Some(allowed.as_slice()))?;
        let tags = path
            .iter()
            .map(|&idx| {
                self.tags
                    .tag(idx)
                    .ok_or_else(|| OieError::Decode(format!("tag index {idx} out of range")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((tags, score.exp()))
    }

    /// Run the tagger over `items` and decode every run.
    pub fn tag_batch(
        &self,
        model: &OieModel,
        items: &[BatchItem],
        device: &Device,
    ) -> Result<Vec<(Vec<OieTag>, f32)>> {
        let batch = Batch::from_items(items, device)?;
        let probs = model.tag_probabilities(&batch)?;
        probs
            .iter()
            .zip(items)
            .map(|(run, item)| self.decode(run, item.predicate_head))
            .collect()
    }
}

/// A loaded model ready for prediction.
pub struct Extractor {
    model: OieModel,
    decoder: RunDecoder,
    vocab: Vocabulary,
    tokenizer: Tokenizer,
    threshold: f32,
    device: Device,
}

impl Extractor {
    /// Load a model directory written by the trainer.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let model_dir = ModelDir::new(dir.as_ref());
        let meta = model_dir.load_meta()?;
        let device = Device::Cpu;

        let files = model_dir.weight_files();
        debug!("Loading weights from {:?}", files);
        // SAFETY: the files are not modified while the model is alive.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&files, DType::F32, &device)? };
        let model = OieModel::load(meta.config, vb)
            .map_err(|e| OieError::ModelLoad(format!("{}: {e}", model_dir.root().display())))?;

        Ok(Self {
            model,
            decoder: RunDecoder::new(&meta.tags),
            vocab: meta.vocab,
            tokenizer: Tokenizer::new()?,
            threshold: meta.hyperparams.predicate_threshold,
            device,
        })
    }

    pub fn tags(&self) -> &TagSet {
        self.decoder.tags()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Override the predicate-detection threshold stored with the model.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    fn word_ids<S: AsRef<str>>(&self, words: &[S]) -> Vec<u32> {
        words
            .iter()
            .map(|w| self.vocab.index(w.as_ref()) as u32)
            .collect()
    }

    /// Token positions treated as predicate heads.
    ///
    /// Falls back to the single most probable token when none reaches the
    /// threshold, so every sentence is tagged at least once.
    pub fn detect_predicates(&self, word_ids: &[u32]) -> Result<Vec<usize>> {
        let batch = Batch::from_items(&[BatchItem::new(word_ids.to_vec(), 0)], &self.device)?;
        let probs = self
            .model
            .predicate_probabilities(&batch)?
            .into_iter()
            .next()
            .unwrap_or_default();

        let heads: Vec<usize> = probs
            .iter()
            .enumerate()
            .filter(|&(_, &p)| p >= self.threshold)
            .map(|(i, _)| i)
            .collect();
        if !heads.is_empty() {
            return Ok(heads);
        }

        let best = probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .ok_or(OieError::EmptyInput)?;
        Ok(vec![best])
    }

    /// Extract tuples from a raw sentence, ordered by predicate position.
    /// Runs that produce no argument are dropped.
    pub fn extract(&self, sentence: &str) -> Result<Vec<Extraction>> {
        if sentence.trim().is_empty() {
            return Err(OieError::EmptyInput);
        }
        let tokens = self.tokenizer.tokenize(sentence);
        if tokens.is_empty() {
            return Err(OieError::EmptyInput);
        }

        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        let word_ids = self.word_ids(&texts);
        let heads = self.detect_predicates(&word_ids)?;
        debug!("Predicate heads {:?} in {:?}", heads, sentence);

        let items: Vec<BatchItem> = heads
            .iter()
            .map(|&head| BatchItem::new(word_ids.clone(), head))
            .collect();
        let decoded = self.decoder.tag_batch(&self.model, &items, &self.device)?;

        Ok(heads
            .iter()
            .zip(decoded)
            .map(|(&head, (tags, confidence))| {
                Extraction::from_tokens(sentence, &tokens, &tags, head, confidence)
            })
            .filter(Extraction::has_arguments)
            .collect())
    }

    /// Tag runs with known predicate heads, `batch_size` runs at a time.
    pub fn predict_tags(
        &self,
        instances: &[OieInstance],
        batch_size: usize,
    ) -> Result<Vec<Vec<OieTag>>> {
        let mut predictions = Vec::with_capacity(instances.len());
        for chunk in instances.chunks(batch_size.max(1)) {
            let items: Vec<BatchItem> = chunk
                .iter()
                .map(|i| BatchItem::new(self.word_ids(&i.words), i.predicate_head))
                .collect();
            let decoded = self.decoder.tag_batch(&self.model, &items, &self.device)?;
            predictions.extend(decoded.into_iter().map(|(tags, _)| tags));
        }
        Ok(predictions)
    }

    /// Tag a run whose predicate head is already known.
    pub fn tag_instance(&self, instance: &OieInstance) -> Result<Extraction> {
        if instance.is_empty() {
            return Err(OieError::EmptyInput);
        }
        let item = BatchItem::new(self.word_ids(&instance.words), instance.predicate_head);
        let (tags, confidence) = self
            .decoder
            .tag_batch(&self.model, &[item], &self.device)?
            .pop()
            .ok_or(OieError::EmptyInput)?;

        Ok(Extraction::from_words(
            &instance.words,
            &tags,
            instance.predicate_head,
            confidence,
        ))
    }
}
