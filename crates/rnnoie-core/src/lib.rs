//! # rnnoie Core
//!
//! Supervised neural Open Information Extraction. Provides the OIE tag
//! scheme, CoNLL and embedding I/O, a BiLSTM tagger built on candle,
//! constrained decoding and the extractor used for prediction.
//!
//! ## Quick Start
//!
//! ```rust
//! use rnnoie_core::tagging::{OieTag, Tokenizer};
//!
//! let tokenizer = Tokenizer::new().unwrap();
//! let words = tokenizer.words("Obama was born in Hawaii.");
//! assert_eq!(words, vec!["Obama", "was", "born", "in", "Hawaii", "."]);
//!
//! let tag: OieTag = "A0-B".parse().unwrap();
//! assert!(tag.is_begin());
//! ```
pub mod error;
pub mod extractor;
pub mod io;
pub mod model;
pub mod tagging;
pub mod types;

// Re-export primary API
pub use error::{OieError, Result};
pub use extractor::{Extractor, RunDecoder};
pub use io::{Glove, Hyperparams, ModelDir, ModelMeta, OieInstance, OptimizerKind, Vocabulary};
pub use model::{Batch, BatchItem, ModelConfig, OieModel};
pub use tagging::{OieTag, Role, TagSet, Token, Tokenizer, ViterbiDecoder};
pub use types::{Argument, Extraction, MetricsReport, SpanMetrics};
