//! Layout of a saved model directory.
//!
//! ```text
//! model.safetensors       trainable variables
//! embeddings.safetensors  frozen word embeddings (absent when fine-tuned)
//! config.json             network dimensions
//! hyperparams.json
//! labels.json
//! vocab.json
//! ```

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{OieError, Result};
use crate::io::embeddings::Vocabulary;
use crate::io::hyperparams::Hyperparams;
use crate::model::ModelConfig;
use crate::tagging::TagSet;

pub const WEIGHTS_FILE: &str = "model.safetensors";
pub const EMBEDDINGS_FILE: &str = "embeddings.safetensors";
pub const CONFIG_FILE: &str = "config.json";
pub const HYPERPARAMS_FILE: &str = "hyperparams.json";
pub const LABELS_FILE: &str = "labels.json";
pub const VOCAB_FILE: &str = "vocab.json";
pub const METRICS_FILE: &str = "metrics.json";

/// Everything besides the weights needed to rebuild a model.
#[derive(Debug, Clone)]
pub struct ModelMeta {
    pub config: ModelConfig,
    pub hyperparams: Hyperparams,
    pub tags: TagSet,
    pub vocab: Vocabulary,
}

/// A directory holding a trained model.
#[derive(Debug, Clone)]
pub struct ModelDir {
    root: PathBuf,
}

impl ModelDir {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn weights_path(&self) -> PathBuf {
        self.root.join(WEIGHTS_FILE)
    }

    pub fn embeddings_path(&self) -> PathBuf {
        self.root.join(EMBEDDINGS_FILE)
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.root.join(METRICS_FILE)
    }

    /// Safetensors files to mmap, in load order.
    pub fn weight_files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.weights_path()];
        let embeddings = self.embeddings_path();
        if embeddings.exists() {
            files.push(embeddings);
        }
        files
    }

    /// Write everything in [`ModelMeta`] next to the weights.
    pub fn save_meta(&self, meta: &ModelMeta) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(
            self.root.join(CONFIG_FILE),
            serde_json::to_string_pretty(&meta.config)?,
        )?;
        meta.hyperparams.save(self.root.join(HYPERPARAMS_FILE))?;
        std::fs::write(
            self.root.join(LABELS_FILE),
            serde_json::to_string_pretty(&meta.tags)?,
        )?;
        std::fs::write(
            self.root.join(VOCAB_FILE),
            serde_json::to_string(meta.vocab.words())?,
        )?;
        debug!("Wrote model metadata to {}", self.root.display());
        Ok(())
    }

    /// Read metadata after checking that every required file is present.
    pub fn load_meta(&self) -> Result<ModelMeta> {
        for name in [WEIGHTS_FILE, CONFIG_FILE, HYPERPARAMS_FILE, LABELS_FILE, VOCAB_FILE] {
            let path = self.root.join(name);
            if !path.exists() {
                return Err(OieError::ModelLoad(format!(
                    "{} not found in {}",
                    name,
                    self.root.display()
                )));
            }
        }

        let config: ModelConfig =
            serde_json::from_str(&std::fs::read_to_string(self.root.join(CONFIG_FILE))?)?;
        let hyperparams = Hyperparams::load(self.root.join(HYPERPARAMS_FILE))?;
        let tags: TagSet =
            serde_json::from_str(&std::fs::read_to_string(self.root.join(LABELS_FILE))?)?;
        let words: Vec<String> =
            serde_json::from_str(&std::fs::read_to_string(self.root.join(VOCAB_FILE))?)?;
        let vocab = Vocabulary::from_words(words)?;

        if config.num_tags != tags.len() {
            return Err(OieError::ModelLoad(format!(
                "config expects {} tags but {} lists {}",
                config.num_tags,
                LABELS_FILE,
                tags.len()
            )));
        }
        if config.vocab_size != vocab.len() {
            return Err(OieError::ModelLoad(format!(
                "config expects {} words but {} lists {}",
                config.vocab_size,
                VOCAB_FILE,
                vocab.len()
            )));
        }

        Ok(ModelMeta {
            config,
            hyperparams,
            tags,
            vocab,
        })
    }

    /// Names of all tensors stored in the weight files.
    pub fn tensor_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for path in self.weight_files() {
            let bytes = std::fs::read(&path)?;
            let tensors = safetensors::SafeTensors::deserialize(&bytes).map_err(|e| {
                OieError::ModelLoad(format!("{}: {e}", path.display()))
            })?;
            names.extend(tensors.names().into_iter().cloned());
        }
        names.sort();
        Ok(names)
    }
}
