//! # rnnoie Trainer
//!
//! Dataset preparation, the training loop and evaluation for the rnnoie
//! tagger, plus conversion of extraction tables into CoNLL corpora.

pub mod convert;
pub mod data;
pub mod trainer;

pub use data::{Dataset, Encoder};
pub use trainer::{DEFAULT_SAVETO, EpochSummary, TrainArgs, Trainer, evaluate_saved, run_training};

/// Log to stderr at INFO, or DEBUG when `verbose` is set.
pub fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}
