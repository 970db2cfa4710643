//! Span-level evaluation of predicted tag sequences.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::tagging::{OieTag, Role};

/// A labeled span `[start, end)` over token indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub role: Role,
    pub start: usize,
    pub end: usize,
}

/// Read labeled spans from a tag sequence.
///
/// An `Inside` tag that does not continue a span of its role opens a new
/// one, so ill-formed sequences still yield every labeled token.
pub fn spans(tags: &[OieTag]) -> Vec<Span> {
    let mut out = Vec::new();
    let mut open: Option<Span> = None;

    for (i, tag) in tags.iter().enumerate() {
        match *tag {
            OieTag::Inside(role) if open.is_some_and(|s| s.role == role) => {
                if let Some(span) = open.as_mut() {
                    span.end = i + 1;
                }
            }
            OieTag::Begin(role) | OieTag::Inside(role) => {
                out.extend(open.take());
                open = Some(Span {
                    role,
                    start: i,
                    end: i + 1,
                });
            }
            OieTag::Outside => out.extend(open.take()),
        }
    }
    out.extend(open);
    out
}

/// Accumulates exact-match span counts and token accuracy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanMetrics {
    pub true_positives: usize,
    pub predicted: usize,
    pub gold: usize,
    pub correct_tokens: usize,
    pub total_tokens: usize,
    pub instances: usize,
}

/// Serializable summary of [`SpanMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    pub token_accuracy: f32,
    pub instances: usize,
}

impl SpanMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one gold/predicted pair. Only the overlapping prefix is compared
    /// at token level.
    pub fn add(&mut self, gold: &[OieTag], predicted: &[OieTag]) {
        let gold_spans = spans(gold);
        let predicted_spans = spans(predicted);

        let mut remaining: HashMap<Span, usize> = HashMap::new();
        for span in &gold_spans {
            *remaining.entry(*span).or_default() += 1;
        }
        for span in &predicted_spans {
            if let Some(count) = remaining.get_mut(span).filter(|c| **c > 0) {
                *count -= 1;
                self.true_positives += 1;
            }
        }

        self.gold += gold_spans.len();
        self.predicted += predicted_spans.len();
        self.correct_tokens += gold.iter().zip(predicted).filter(|(g, p)| g == p).count();
        self.total_tokens += gold.len();
        self.instances += 1;
    }

    pub fn merge(&mut self, other: &SpanMetrics) {
        self.true_positives += other.true_positives;
        self.predicted += other.predicted;
        self.gold += other.gold;
        self.correct_tokens += other.correct_tokens;
        self.total_tokens += other.total_tokens;
        self.instances += other.instances;
    }

    pub fn precision(&self) -> f32 {
        ratio(self.true_positives, self.predicted)
    }

    pub fn recall(&self) -> f32 {
        ratio(self.true_positives, self.gold)
    }

    pub fn f1(&self) -> f32 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
    }

    pub fn token_accuracy(&self) -> f32 {
        ratio(self.correct_tokens, self.total_tokens)
    }

    pub fn report(&self) -> MetricsReport {
        MetricsReport {
            precision: self.precision(),
            recall: self.recall(),
            f1: self.f1(),
            token_accuracy: self.token_accuracy(),
            instances: self.instances,
        }
    }
}

fn ratio(num: usize, den: usize) -> f32 {
    if den == 0 { 0.0 } else { num as f32 / den as f32 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(labels: &[&str]) -> Vec<OieTag> {
        labels.iter().map(|l| l.parse().unwrap()).collect()
    }

    #[test]
    fn test_spans() {
        let found = spans(&tags(&["A0-B", "A0-I", "P-B", "O", "A1-B", "A1-I", "A1-I"]));
        assert_eq!(
            found,
            vec![
                Span { role: Role::Argument(0), start: 0, end: 2 },
                Span { role: Role::Predicate, start: 2, end: 3 },
                Span { role: Role::Argument(1), start: 4, end: 7 },
            ]
        );
    }

    #[test]
    fn test_spans_with_stray_inside() {
        let found = spans(&tags(&["O", "A1-I", "P-I"]));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].start, 1);
        assert_eq!(found[1].role, Role::Predicate);
    }

    #[test]
    fn test_perfect_prediction() {
        let gold = tags(&["A0-B", "P-B", "A1-B", "A1-I"]);
        let mut metrics = SpanMetrics::new();
        metrics.add(&gold, &gold);

        assert_eq!(metrics.f1(), 1.0);
        assert_eq!(metrics.token_accuracy(), 1.0);
    }

    #[test]
    fn test_partial_prediction() {
        let gold = tags(&["A0-B", "P-B", "A1-B", "A1-I"]);
        let predicted = tags(&["A0-B", "P-B", "A1-B", "O"]);
        let mut metrics = SpanMetrics::new();
        metrics.add(&gold, &predicted);

        assert_eq!(metrics.true_positives, 2);
        assert_eq!(metrics.precision(), 2.0 / 3.0);
        assert_eq!(metrics.recall(), 2.0 / 3.0);
        assert_eq!(metrics.token_accuracy(), 0.75);
    }

    #[test]
    fn test_empty_metrics() {
        let metrics = SpanMetrics::new();
        let report = metrics.report();
        assert_eq!(report.f1, 0.0);
        assert_eq!(report.precision, 0.0);
        assert_eq!(report.instances, 0);
    }

    #[test]
    fn test_merge() {
        let gold = tags(&["P-B", "A0-B"]);
        let mut a = SpanMetrics::new();
        a.add(&gold, &gold);
        let mut b = SpanMetrics::new();
        b.add(&gold, &tags(&["P-B", "O"]));
        a.merge(&b);

        assert_eq!(a.instances, 2);
        assert_eq!(a.gold, 4);
        assert_eq!(a.predicted, 3);
        assert_eq!(a.true_positives, 3);
    }
}
