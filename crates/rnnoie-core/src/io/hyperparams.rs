//! Model hyperparameters, read from a JSON file of the form
//! `{"hyperparams": {...}}`.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OieError, Result};

/// Optimizer used by the training loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    #[serde(alias = "adamw")]
    Adam,
    Sgd,
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adam => write!(f, "adam"),
            Self::Sgd => write!(f, "sgd"),
        }
    }
}

pub const SUPPORTED_LOSS: &str = "categorical_crossentropy";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparams {
    /// Pretrained embedding file (GloVe text format).
    pub emb_filename: PathBuf,
    /// Training sentences are truncated to this many tokens.
    pub sent_maxlen: usize,
    pub batch_size: usize,
    /// LSTM hidden units per direction.
    pub hidden_units: usize,
    /// Fine-tune the pretrained word embeddings.
    pub trainable_emb: bool,
    pub emb_dropout: f32,
    pub pred_dropout: f32,
    /// Number of stacked BiLSTM layers.
    pub num_of_latent_layers: usize,
    /// Size of the predicate-indicator embedding.
    pub pred_indicator_dim: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub optimizer: OptimizerKind,
    pub loss: String,
    pub seed: u64,
    /// Minimum probability for a token to be treated as a predicate head.
    pub predicate_threshold: f32,
    /// Field delimiter of extraction TSV files.
    pub sep: String,
}

impl Default for Hyperparams {
    fn default() -> Self {
        Self {
            emb_filename: PathBuf::from("pretrained_word_embeddings/glove.6B.50d.txt"),
            sent_maxlen: 50,
            batch_size: 50,
            hidden_units: 128,
            trainable_emb: false,
            emb_dropout: 0.1,
            pred_dropout: 0.1,
            num_of_latent_layers: 2,
            pred_indicator_dim: 5,
            epochs: 10,
            learning_rate: 0.001,
            optimizer: OptimizerKind::Adam,
            loss: SUPPORTED_LOSS.to_string(),
            seed: 42,
            predicate_threshold: 0.5,
            sep: "\t".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct HyperparamsFile {
    hyperparams: Hyperparams,
}

impl Hyperparams {
    /// Read and validate a hyperparameter file.
    ///
    /// A relative `emb_filename` that does not exist relative to the working
    /// directory is resolved against the file's own directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut params = Self::from_json(&content)?;

        if params.emb_filename.is_relative() && !params.emb_filename.exists() {
            if let Some(parent) = path.parent() {
                let candidate = parent.join(&params.emb_filename);
                if candidate.exists() {
                    params.emb_filename = candidate;
                }
            }
        }

        Ok(params)
    }

    /// Parse and validate hyperparameters from JSON text.
    pub fn from_json(content: &str) -> Result<Self> {
        let file: HyperparamsFile = serde_json::from_str(content)
            .map_err(|e| OieError::InvalidHyperparams(e.to_string()))?;
        file.hyperparams.validate()?;
        Ok(file.hyperparams)
    }

    /// Write the hyperparameters in the same wrapped format they are read.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = HyperparamsFile {
            hyperparams: self.clone(),
        };
        std::fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(OieError::InvalidHyperparams(msg));

        for (name, value) in [
            ("sent_maxlen", self.sent_maxlen),
            ("batch_size", self.batch_size),
            ("hidden_units", self.hidden_units),
            ("num_of_latent_layers", self.num_of_latent_layers),
            ("pred_indicator_dim", self.pred_indicator_dim),
            ("epochs", self.epochs),
        ] {
            if value == 0 {
                return invalid(format!("{name} must be positive"));
            }
        }
        for (name, value) in [
            ("emb_dropout", self.emb_dropout),
            ("pred_dropout", self.pred_dropout),
        ] {
            if !(0.0..1.0).contains(&value) {
                return invalid(format!("{name} must be in [0, 1), got {value}"));
            }
        }
        if !(self.predicate_threshold > 0.0 && self.predicate_threshold < 1.0) {
            return invalid(format!(
                "predicate_threshold must be in (0, 1), got {}",
                self.predicate_threshold
            ));
        }
        if !(self.learning_rate > 0.0) {
            return invalid(format!("learning_rate must be positive, got {}", self.learning_rate));
        }
        if self.loss != SUPPORTED_LOSS {
            return invalid(format!(
                "unsupported loss {:?}, only {SUPPORTED_LOSS:?} is available",
                self.loss
            ));
        }
        if self.sep.is_empty() {
            return invalid("sep must not be empty".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        Hyperparams::default().validate().unwrap();
    }

    #[test]
    fn test_parse_partial_file() {
        let json = r#"{
            "hyperparams": {
                "emb_filename": "glove.txt",
                "batch_size": 16,
                "trainable_emb": true,
                "optimizer": "adamw",
                "sep": ","
            }
        }"#;
        let params = Hyperparams::from_json(json).unwrap();

        assert_eq!(params.emb_filename, PathBuf::from("glove.txt"));
        assert_eq!(params.batch_size, 16);
        assert!(params.trainable_emb);
        assert_eq!(params.optimizer, OptimizerKind::Adam);
        assert_eq!(params.sep, ",");
        assert_eq!(params.hidden_units, 128);
    }

    #[test]
    fn test_missing_wrapper_is_rejected() {
        let err = Hyperparams::from_json(r#"{"batch_size": 3}"#).unwrap_err();
        assert!(matches!(err, OieError::InvalidHyperparams(_)));
    }

    #[test]
    fn test_invalid_values() {
        let cases = [
            r#"{"hyperparams": {"batch_size": 0}}"#,
            r#"{"hyperparams": {"epochs": 0}}"#,
            r#"{"hyperparams": {"emb_dropout": 1.0}}"#,
            r#"{"hyperparams": {"predicate_threshold": 0.0}}"#,
            r#"{"hyperparams": {"loss": "mse"}}"#,
            r#"{"hyperparams": {"optimizer": "rmsprop"}}"#,
        ];
        for case in cases {
            assert!(Hyperparams::from_json(case).is_err(), "accepted {case}");
        }
    }

    #[test]
    fn test_save_and_load_resolves_embeddings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vectors.txt"), "a 1.0\n").unwrap();

        let params = Hyperparams {
            emb_filename: PathBuf::from("vectors.txt"),
            epochs: 3,
            ..Default::default()
        };
        let path = dir.path().join("params.json");
        params.save(&path).unwrap();

        let loaded = Hyperparams::load(&path).unwrap();
        assert_eq!(loaded.epochs, 3);
        assert_eq!(loaded.emb_filename, dir.path().join("vectors.txt"));
    }
}
