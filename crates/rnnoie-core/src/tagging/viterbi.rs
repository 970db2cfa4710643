//! # Constrained Viterbi Decoding
//!
//! Finds the highest-scoring tag sequence under the OIE tag scheme given
//! per-token log probabilities.

use crate::error::{OieError, Result};
use crate::tagging::tags::{OieTag, TagSet};

/// Viterbi decoder over a fixed tag set.
#[derive(Debug, Clone)]
pub struct ViterbiDecoder {
    num_tags: usize,
    /// `valid[prev][curr]`
    valid: Vec<Vec<bool>>,
    start: Vec<bool>,
}

impl ViterbiDecoder {
    /// Create a decoder whose transition constraints come from `tags`.
    pub fn new(tags: &TagSet) -> Self {
        let num_tags = tags.len();
        let all = tags.tags();

        let valid = all
            .iter()
            .map(|&prev| {
                all.iter()
                    .map(|&curr| OieTag::is_valid_transition(prev, curr))
                    .collect()
            })
            .collect();
        let start = all.iter().map(|&t| OieTag::can_start(t)).collect();

        Self {
            num_tags,
            valid,
            start,
        }
    }

    pub fn num_tags(&self) -> usize {
        self.num_tags
    }

    /// Decode the optimal tag sequence.
    ///
    /// # Arguments
    /// * `scores` - Matrix of shape [seq_len, num_tags], typically log probabilities
    /// * `allowed` - Optional mask of the same shape; `false` forbids a tag at a position
    ///
    /// # Returns
    /// The optimal tag sequence as indices.
    pub fn decode(&self, scores: &[Vec<f32>], allowed: Option<&[Vec<bool>]>) -> Result<Vec<usize>> {
        self.decode_with_score(scores, allowed).map(|(path, _)| path)
    }

    /// Decode and also return the total score of the chosen path.
    pub fn decode_with_score(
        &self,
        scores: &[Vec<f32>],
        allowed: Option<&[Vec<bool>]>,
    ) -> Result<(Vec<usize>, f32)> {
        let seq_len = scores.len();
        if seq_len == 0 {
            return Ok((Vec::new(), 0.0));
        }

        if let Some(row) = scores.iter().find(|row| row.len() != self.num_tags) {
            return Err(OieError::Decode(format!(
                "score dimension mismatch: expected {}, got {}",
                self.num_tags,
                row.len()
            )));
        }
        if let Some(mask) = allowed {
            if mask.len() != seq_len || mask.iter().any(|row| row.len() != self.num_tags) {
                return Err(OieError::Decode("tag mask shape does not match scores".into()));
            }
        }

        let permitted = |pos: usize, tag: usize| allowed.is_none_or(|m| m[pos][tag]);

        let mut dp = vec![vec![f32::NEG_INFINITY; self.num_tags]; seq_len];
        let mut backptr = vec![vec![0usize; self.num_tags]; seq_len];

        // Initialize
        for tag in 0..self.num_tags {
            if self.start[tag] && permitted(0, tag) {
                dp[0][tag] = scores[0][tag];
            }
        }

        // Forward pass
        for pos in 1..seq_len {
            for curr in 0..self.num_tags {
                if !permitted(pos, curr) {
                    continue;
                }

                let mut best_score = f32::NEG_INFINITY;
                let mut best_prev = 0;

                for prev in 0..self.num_tags {
                    if !self.valid[prev][curr] {
                        continue;
                    }
                    let score = dp[pos - 1][prev];
                    if score > best_score {
                        best_score = score;
                        best_prev = prev;
                    }
                }

                if best_score > f32::NEG_INFINITY {
                    dp[pos][curr] = best_score + scores[pos][curr];
                    backptr[pos][curr] = best_prev;
                }
            }
        }

        let (best_final, best_score) = dp[seq_len - 1]
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (tag, score)| {
                if score > best.1 { (tag, score) } else { best }
            });

        if best_score == f32::NEG_INFINITY {
            return Err(OieError::Decode(
                "no tag sequence satisfies the constraints".into(),
            ));
        }

        // Backtrack
        let mut path = vec![best_final];
        let mut curr = best_final;
        for pos in (1..seq_len).rev() {
            curr = backptr[pos][curr];
            path.push(curr);
        }
        path.reverse();

        Ok((path, best_score))
    }
}
