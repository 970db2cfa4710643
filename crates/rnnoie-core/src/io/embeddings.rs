//! Pretrained GloVe word embeddings.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use candle_core::{Device, Tensor};
use tracing::{debug, info};

use crate::error::{OieError, Result};
use crate::tagging::normalize;

/// Reserved row for padding positions.
pub const PAD_INDEX: usize = 0;
/// Reserved row for out-of-vocabulary words.
pub const UNK_INDEX: usize = 1;

pub const PAD_TOKEN: &str = "<pad>";
pub const UNK_TOKEN: &str = "<unk>";

/// Word list mapping words to embedding rows.
///
/// Rows 0 and 1 are always `<pad>` and `<unk>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    words: Vec<String>,
    index: HashMap<String, usize>,
}

impl Vocabulary {
    /// Build from a word list that already starts with the reserved tokens.
    pub fn from_words(words: Vec<String>) -> Result<Self> {
        if words.get(PAD_INDEX).map(String::as_str) != Some(PAD_TOKEN)
            || words.get(UNK_INDEX).map(String::as_str) != Some(UNK_TOKEN)
        {
            return Err(OieError::Embeddings(
                "vocabulary must start with <pad> and <unk>".into(),
            ));
        }

        let mut index = HashMap::with_capacity(words.len());
        for (i, w) in words.iter().enumerate() {
            index.entry(w.clone()).or_insert(i);
        }
        Ok(Self { words, index })
    }

    /// Row for a word; lookup is case-insensitive, unknown words map to `<unk>`.
    pub fn index(&self, word: &str) -> usize {
        self.index
            .get(&normalize(word))
            .copied()
            .unwrap_or(UNK_INDEX)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.index.contains_key(&normalize(word))
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }
}

/// Embedding matrix loaded from a GloVe text file.
#[derive(Debug, Clone)]
pub struct Glove {
    vocab: Vocabulary,
    dim: usize,
    /// Row-major `[vocab, dim]`.
    vectors: Vec<f32>,
}

impl Glove {
    /// Load a GloVe file: one word per line followed by its vector.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            OieError::Embeddings(format!("cannot open {}: {e}", path.display()))
        })?;
        let glove = Self::parse(BufReader::new(file))?;
        info!(
            "Loaded {} embeddings of dimension {} from {}",
            glove.vocab.len() - 2,
            glove.dim,
            path.display()
        );
        Ok(glove)
    }

    /// Parse GloVe rows from a reader.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut words = vec![PAD_TOKEN.to_string(), UNK_TOKEN.to_string()];
        let mut seen = HashSet::new();
        let mut vectors: Vec<f32> = Vec::new();
        let mut dim = 0usize;
        let mut duplicates = 0usize;

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let mut parts = line.split_whitespace();
            let Some(word) = parts.next() else {
                continue;
            };

            let values = parts
                .map(str::parse::<f32>)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| OieError::Embeddings(format!("line {}: {e}", idx + 1)))?;

            if dim == 0 {
                if values.is_empty() {
                    return Err(OieError::Embeddings(format!(
                        "line {}: word {word:?} has no vector",
                        idx + 1
                    )));
                }
                dim = values.len();
                // Reserve the pad and unk rows.
                vectors.resize(2 * dim, 0.0);
            } else if values.len() != dim {
                return Err(OieError::Embeddings(format!(
                    "line {}: expected {dim} values, found {}",
                    idx + 1,
                    values.len()
                )));
            }

            let word = normalize(word);
            if word == PAD_TOKEN || word == UNK_TOKEN || !seen.insert(word.clone()) {
                duplicates += 1;
                continue;
            }

            words.push(word);
            vectors.extend_from_slice(&values);
        }

        if dim == 0 {
            return Err(OieError::Embeddings("embedding file is empty".into()));
        }
        if duplicates > 0 {
            debug!("Skipped {} duplicate embedding rows", duplicates);
        }

        let count = words.len() - 2;
        if count == 0 {
            return Err(OieError::Embeddings("embedding file has no usable words".into()));
        }

        // The unknown word is the mean of all real vectors.
        for d in 0..dim {
            let sum: f32 = (0..count).map(|r| vectors[(r + 2) * dim + d]).sum();
            vectors[UNK_INDEX * dim + d] = sum / count as f32;
        }

        Ok(Self {
            vocab: Vocabulary::from_words(words)?,
            dim,
            vectors,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn index(&self, word: &str) -> usize {
        self.vocab.index(word)
    }

    /// The vector of a given row.
    pub fn vector(&self, row: usize) -> Option<&[f32]> {
        let start = row * self.dim;
        self.vectors.get(start..start + self.dim)
    }

    /// The embedding matrix as a `[vocab, dim]` tensor.
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::from_slice(
            &self.vectors,
            (self.vocab.len(), self.dim),
            device,
        )?)
    }
}
