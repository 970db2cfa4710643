pub mod conll;
pub mod embeddings;
pub mod hyperparams;
pub mod model_dir;

pub use conll::{OieInstance, parse_conll, read_conll, write_conll};
pub use embeddings::{Glove, PAD_INDEX, UNK_INDEX, Vocabulary};
pub use hyperparams::{Hyperparams, OptimizerKind};
pub use model_dir::{ModelDir, ModelMeta};
