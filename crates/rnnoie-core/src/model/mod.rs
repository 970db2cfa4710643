//! Neural tagger: batching, network definition and its configuration.

pub mod batch;
pub mod bilstm;
pub mod config;
pub mod network;

pub use batch::{Batch, BatchItem};
pub use bilstm::BiLstm;
pub use config::ModelConfig;
pub use network::{OieModel, WORD_EMBEDDING};
