pub mod tags;
pub mod tokenizer;
pub mod viterbi;

pub use tags::{MAX_ARGUMENTS, OieTag, Role, TagSet};
pub use tokenizer::{Token, Tokenizer, normalize};
pub use viterbi::ViterbiDecoder;
