use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The tokenizer was given neither text nor a corpus path.
    #[error("either text or a file path must be provided")]
    MissingSource,

    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A character that is not part of the vocabulary was passed to encode.
    #[error("character {0:?} is not in the vocabulary")]
    UnknownChar(char),

    /// A token id outside `[0, vocab_size)`.
    #[error("token id {id} is out of range for a vocabulary of {vocab_size}")]
    InvalidId { id: i64, vocab_size: usize },

    #[error("expected input of shape {expected}, got {actual:?}")]
    Shape { expected: String, actual: Vec<i64> },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Torch(#[from] tch::TchError),
}
