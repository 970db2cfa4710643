//! Padding and tensor encoding of tagging runs.

use candle_core::{Device, Tensor};

use crate::error::{OieError, Result};
use crate::io::embeddings::PAD_INDEX;

/// One run, already mapped to indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub word_ids: Vec<u32>,
    pub predicate_head: usize,
    /// Gold tag indices (training and evaluation only).
    pub tag_ids: Option<Vec<u32>>,
    /// Gold predicate-head flags for every token (training only).
    pub predicate_heads: Option<Vec<bool>>,
}

impl BatchItem {
    pub fn new(word_ids: Vec<u32>, predicate_head: usize) -> Self {
        Self {
            word_ids,
            predicate_head,
            tag_ids: None,
            predicate_heads: None,
        }
    }

    pub fn len(&self) -> usize {
        self.word_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.word_ids.is_empty()
    }
}

/// A padded batch. Shapes use `B` for batch size and `T` for the longest run.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `(B, T)` u32
    pub word_ids: Tensor,
    /// `(B,)` u32, word id of each run's predicate head
    pub pred_word_ids: Tensor,
    /// `(B, T)` u32, 1 at the predicate head
    pub pred_indicator: Tensor,
    /// `(B, T)` u32, per-row position permutation reversing each run within its length
    pub reverse_index: Tensor,
    /// `(N,)` u32, flat positions `b * T + t` of real tokens
    pub valid_positions: Tensor,
    /// `(B, T)` u32
    pub tag_ids: Option<Tensor>,
    /// `(B, T)` u32
    pub pred_targets: Option<Tensor>,
    pub lengths: Vec<usize>,
}

impl Batch {
    pub fn from_items(items: &[BatchItem], device: &Device) -> Result<Self> {
        if items.is_empty() {
            return Err(OieError::EmptyInput);
        }
        if let Some(item) = items.iter().find(|i| i.is_empty()) {
            return Err(OieError::Decode(format!(
                "cannot batch an empty run (predicate head {})",
                item.predicate_head
            )));
        }
        if let Some(item) = items.iter().find(|i| i.predicate_head >= i.len()) {
            return Err(OieError::Decode(format!(
                "predicate head {} outside run of {} tokens",
                item.predicate_head,
                item.len()
            )));
        }

        let mismatched = |i: &BatchItem| {
            i.tag_ids.as_ref().is_some_and(|v| v.len() != i.len())
                || i.predicate_heads.as_ref().is_some_and(|v| v.len() != i.len())
        };
        if items.iter().any(mismatched) {
            return Err(OieError::Decode("gold labels do not match run length".into()));
        }

        let b = items.len();
        let t = items.iter().map(BatchItem::len).max().unwrap_or(0);
        let lengths: Vec<usize> = items.iter().map(BatchItem::len).collect();

        let mut word_ids = vec![PAD_INDEX as u32; b * t];
        let mut pred_indicator = vec![0u32; b * t];
        let mut reverse_index = vec![0u32; b * t];
        let mut valid_positions = Vec::with_capacity(lengths.iter().sum());
        let mut pred_word_ids = Vec::with_capacity(b);

        for (row, item) in items.iter().enumerate() {
            let len = item.len();
            let base = row * t;
            word_ids[base..base + len].copy_from_slice(&item.word_ids);
            pred_indicator[base + item.predicate_head] = 1;
            pred_word_ids.push(item.word_ids[item.predicate_head]);

            for pos in 0..t {
                reverse_index[base + pos] = if pos < len { (len - 1 - pos) as u32 } else { pos as u32 };
            }
            valid_positions.extend((base..base + len).map(|p| p as u32));
        }

        let padded = |rows: Vec<Option<&[u32]>>| -> Option<Vec<u32>> {
            let mut out = vec![0u32; b * t];
            for (row, values) in rows.into_iter().enumerate() {
                let values = values?;
                out[row * t..row * t + values.len()].copy_from_slice(values);
            }
            Some(out)
        };

        let tag_ids = padded(items.iter().map(|i| i.tag_ids.as_deref()).collect());
        let pred_flags: Vec<Option<Vec<u32>>> = items
            .iter()
            .map(|i| {
                i.predicate_heads
                    .as_ref()
                    .map(|heads| heads.iter().map(|&h| u32::from(h)).collect())
            })
            .collect();
        let pred_targets = padded(pred_flags.iter().map(|f| f.as_deref()).collect());

        let to_2d = |data: Vec<u32>| Tensor::from_vec(data, (b, t), device);

        Ok(Self {
            word_ids: to_2d(word_ids)?,
            pred_word_ids: Tensor::from_vec(pred_word_ids, b, device)?,
            pred_indicator: to_2d(pred_indicator)?,
            reverse_index: to_2d(reverse_index)?,
            valid_positions: Tensor::new(valid_positions.as_slice(), device)?,
            tag_ids: tag_ids.map(|d| to_2d(d)).transpose()?,
            pred_targets: pred_targets.map(|d| to_2d(d)).transpose()?,
            lengths,
        })
    }

    pub fn size(&self) -> usize {
        self.lengths.len()
    }

    pub fn max_len(&self) -> usize {
        self.lengths.iter().copied().max().unwrap_or(0)
    }
}
