use std::fmt;

/// The result type used across the text data pipeline.
pub type Result<T> = std::result::Result<T, DataError>;

/// All errors the corpus pipeline can produce.
#[derive(Debug)]
pub enum DataError {
    /// Corpus file could not be read.
    Io(std::io::Error),
    /// A corpus row is not valid json.
    Json {
        line: usize,
        source: serde_json::Error,
    },
    /// A row in a labeled split is missing its label.
    MissingLabel { line: usize },
    /// The tokenizer produced an empty id sequence for a row.
    EmptyEncoding { line: usize },
    /// The configured sequence length cannot hold src, trg and separators.
    SeqLenTooShort { seq_len: usize },
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::Io(e) => write!(f, "io error: {e}"),
            DataError::Json { line, source } => {
                write!(f, "invalid json on corpus line {line}: {source}")
            }
            DataError::MissingLabel { line } => {
                write!(f, "corpus line {line} is missing a label")
            }
            DataError::EmptyEncoding { line } => {
                write!(f, "corpus line {line} tokenized to an empty sequence")
            }
            DataError::SeqLenTooShort { seq_len } => {
                write!(f, "seq_len {seq_len} is too short to hold any merged pair")
            }
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataError::Io(e) => Some(e),
            DataError::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DataError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
