//! # rnnoie
//!
//! Supervised neural Open Information Extraction. Re-exports the core
//! tagging and prediction API together with the training pipeline.
//!
//! ```no_run
//! use rnnoie::Extractor;
//!
//! let extractor = Extractor::load("models/rnnoie").unwrap();
//! for extraction in extractor.extract("Obama was born in Hawaii.").unwrap() {
//!     println!("{extraction}");
//! }
//! ```

pub use rnnoie_core::*;
pub use rnnoie_trainer as trainer;
pub use rnnoie_trainer::{TrainArgs, Trainer, run_training};
