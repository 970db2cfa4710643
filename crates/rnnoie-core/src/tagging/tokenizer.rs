//! # Sentence Tokenizer
//!
//! Splits raw sentences into word and punctuation tokens for sequence
//! labeling, keeping byte offsets into the original text.

use regex::Regex;

use crate::error::Result;

/// A token extracted from a sentence with positional information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The token text as it appears in the sentence
    pub text: String,
    /// Start position in the original string
    pub start: usize,
    /// End position in the original string
    pub end: usize,
    /// Token index in the sequence
    pub index: usize,
}

impl Token {
    /// Lowercased form used for embedding lookup.
    pub fn normalized(&self) -> String {
        normalize(&self.text)
    }
}

/// Normalize a word for embedding lookup.
pub fn normalize(word: &str) -> String {
    word.trim().to_lowercase()
}

/// Word-level tokenizer for raw sentences.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    re_token: Regex,
}

impl Tokenizer {
    /// Create a new tokenizer with its pre-compiled pattern.
    ///
    /// # Errors
    ///
    /// Returns `OieError::Regex` if the pattern fails to compile
    /// (should never happen with the static pattern defined here).
    pub fn new() -> Result<Self> {
        Ok(Self {
            // Words may carry internal apostrophes or hyphens; any other
            // non-space character stands alone.
            re_token: Regex::new(r"\w+(?:['’\-]\w+)*|[^\w\s]")?,
        })
    }

    /// Tokenize a sentence into a sequence of tokens.
    ///
    /// # Examples
    /// ```
    /// use rnnoie_core::tagging::Tokenizer;
    ///
    /// let tokenizer = Tokenizer::new().unwrap();
    /// let tokens = tokenizer.tokenize("Barack Obama was born in Hawaii.");
    /// assert_eq!(tokens.len(), 7);
    /// ```
    pub fn tokenize(&self, input: &str) -> Vec<Token> {
        self.re_token
            .find_iter(input)
            .enumerate()
            .map(|(index, m)| Token {
                text: m.as_str().to_string(),
                start: m.start(),
                end: m.end(),
                index,
            })
            .collect()
    }

    /// Tokenize and return only the token texts.
    pub fn words(&self, input: &str) -> Vec<String> {
        self.tokenize(input).into_iter().map(|t| t.text).collect()
    }
}
