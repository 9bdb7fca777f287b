mod corpus;
mod dataset;
mod error;
mod loader;
mod prepare;
mod vocab;

pub use corpus::{Corpus, Split, load_corpus};
pub use dataset::{Embedding, TextDataset, TextExample};
pub use error::{DataError, Result};
pub use loader::TextDataLoader;
pub use prepare::{merge_and_mask, pad_to};
pub use vocab::Vocab;
