use std::fmt;

use serde::{Deserialize, Serialize};

use crate::io::conll::OieInstance;
use crate::tagging::{OieTag, Role, Token};
use crate::types::metrics::{Span, spans};

/// One argument slot of an extracted tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    /// Argument position (`A0` = 0).
    pub index: u8,
    pub text: String,
    pub start_token: usize,
    /// Exclusive.
    pub end_token: usize,
}

/// A relation tuple extracted from a sentence.
///
/// Produced by the extractor, one per predicate, along with the tag
/// sequence it was read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    /// Original sentence.
    pub sentence: String,

    /// Predicate surface form (all predicate spans, in order).
    pub predicate: String,

    /// Token index of the predicate head the tags were conditioned on.
    pub predicate_head: usize,

    /// Arguments ordered by index, then position.
    pub arguments: Vec<Argument>,

    /// Product of the probabilities of the decoded tags, in `[0.0, 1.0]`.
    pub confidence: f32,

    /// Sentence tokens.
    pub words: Vec<String>,

    /// One label per token.
    pub tags: Vec<String>,
}

impl Extraction {
    /// Build from tokenized raw text; span texts are sliced from `sentence`.
    pub fn from_tokens(
        sentence: &str,
        tokens: &[Token],
        tags: &[OieTag],
        predicate_head: usize,
        confidence: f32,
    ) -> Self {
        let words: Vec<String> = tokens.iter().map(|t| t.text.clone()).collect();
        Self::build(sentence.to_string(), words, tags, predicate_head, confidence, |s| {
            sentence[tokens[s.start].start..tokens[s.end - 1].end].to_string()
        })
    }

    /// Build from pre-tokenized words; span texts are words joined by spaces.
    pub fn from_words(words: &[String], tags: &[OieTag], predicate_head: usize, confidence: f32) -> Self {
        Self::build(words.join(" "), words.to_vec(), tags, predicate_head, confidence, |s| {
            words[s.start..s.end].join(" ")
        })
    }

    fn build<F>(
        sentence: String,
        words: Vec<String>,
        tags: &[OieTag],
        predicate_head: usize,
        confidence: f32,
        span_text: F,
    ) -> Self
    where
        F: Fn(&Span) -> String,
    {
        let spans = spans(tags);

        let predicate_parts: Vec<String> = spans
            .iter()
            .filter(|s| s.role == Role::Predicate)
            .map(&span_text)
            .collect();
        let predicate = if predicate_parts.is_empty() {
            words.get(predicate_head).cloned().unwrap_or_default()
        } else {
            predicate_parts.join(" ")
        };

        let mut arguments: Vec<Argument> = spans
            .iter()
            .filter_map(|s| match s.role {
                Role::Argument(index) => Some(Argument {
                    index,
                    text: span_text(s),
                    start_token: s.start,
                    end_token: s.end,
                }),
                Role::Predicate => None,
            })
            .collect();
        arguments.sort_by_key(|a| (a.index, a.start_token));

        Self {
            sentence,
            predicate,
            predicate_head,
            arguments,
            confidence,
            words,
            tags: tags.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn has_arguments(&self) -> bool {
        !self.arguments.is_empty()
    }

    /// Convert to a CoNLL run.
    pub fn to_instance(&self, sent_id: usize, run_id: usize) -> OieInstance {
        OieInstance {
            sent_id,
            run_id,
            words: self.words.clone(),
            predicate_head: self.predicate_head,
            labels: self.tags.clone(),
        }
    }
}

/// `sentence \t confidence \t predicate \t arg0 \t arg1 ...`
impl fmt::Display for Extraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{:.4}\t{}", self.sentence, self.confidence, self.predicate)?;
        for arg in &self.arguments {
            write!(f, "\t{}", arg.text)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagging::Tokenizer;

    fn tags(labels: &[&str]) -> Vec<OieTag> {
        labels.iter().map(|l| l.parse().unwrap()).collect()
    }

    #[test]
    fn test_from_tokens_uses_original_text() {
        let sentence = "Acme's CEO, John Smith, was born in New York.";
        let tokens = Tokenizer::new().unwrap().tokenize(sentence);
        let words: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words[3], "John");

        let labels = tags(&[
            "O", "O", "O", "A0-B", "A0-I", "O", "P-B", "P-I", "P-I", "A1-B", "A1-I", "O",
        ]);
        let extraction = Extraction::from_tokens(sentence, &tokens, &labels, 7, 0.5);

        assert_eq!(extraction.predicate, "was born in");
        assert_eq!(extraction.arguments.len(), 2);
        assert_eq!(extraction.arguments[0].text, "John Smith");
        assert_eq!(extraction.arguments[1].text, "New York");
        assert_eq!(extraction.arguments[1].index, 1);
        assert_eq!(
            extraction.to_string(),
            format!("{sentence}\t0.5000\twas born in\tJohn Smith\tNew York")
        );
    }

    #[test]
    fn test_arguments_sorted_by_index() {
        let words: Vec<String> = ["Paris", "hosted", "the", "games"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let extraction =
            Extraction::from_words(&words, &tags(&["A1-B", "P-B", "A0-B", "A0-I"]), 1, 0.9);

        let texts: Vec<_> = extraction.arguments.iter().map(|a| a.text.as_str()).collect();
        assert_eq!(texts, vec!["the games", "Paris"]);
        assert_eq!(extraction.sentence, "Paris hosted the games");
    }

    #[test]
    fn test_predicate_falls_back_to_head() {
        let words: Vec<String> = vec!["It".into(), "rained".into()];
        let extraction = Extraction::from_words(&words, &tags(&["A0-B", "O"]), 1, 0.1);
        assert_eq!(extraction.predicate, "rained");
        assert!(extraction.has_arguments());
    }

    #[test]
    fn test_discontinuous_predicate() {
        let words: Vec<String> = ["He", "turned", "it", "off"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let extraction =
            Extraction::from_words(&words, &tags(&["A0-B", "P-B", "A1-B", "P-B"]), 1, 0.3);
        assert_eq!(extraction.predicate, "turned off");
    }

    #[test]
    fn test_to_instance() {
        let words: Vec<String> = vec!["It".into(), "rained".into()];
        let extraction = Extraction::from_words(&words, &tags(&["A0-B", "P-B"]), 1, 0.1);
        let instance = extraction.to_instance(4, 2);
        assert_eq!(instance.sent_id, 4);
        assert_eq!(instance.run_id, 2);
        assert_eq!(instance.labels, vec!["A0-B", "P-B"]);
        assert_eq!(instance.predicate_head, 1);
    }
}
