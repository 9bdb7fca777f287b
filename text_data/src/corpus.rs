use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use serde::Deserialize;

use crate::error::{DataError, Result};

/// A corpus split. Each maps to one jsonl file in the corpus directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Valid,
    Test,
    Samples,
}

impl Split {
    pub fn file_name(&self) -> &'static str {
        match self {
            Split::Train => "train.jsonl",
            Split::Valid => "valid.jsonl",
            Split::Test => "test.jsonl",
            Split::Samples => "samples.jsonl",
        }
    }

    /// The samples split carries a label per row that must survive the
    /// whole pipeline unmodified.
    pub fn includes_labels(&self) -> bool {
        matches!(self, Split::Samples)
    }
}

#[derive(Debug, Deserialize)]
struct Row {
    src: String,
    trg: String,
    #[serde(default)]
    label: Option<i64>,
}

/// Raw source/target pairs for one split, labels included when the
/// split defines them.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub src: Vec<String>,
    pub trg: Vec<String>,
    pub labels: Option<Vec<i64>>,
}

impl Corpus {
    pub fn len(&self) -> usize {
        self.src.len()
    }

    pub fn is_empty(&self) -> bool {
        self.src.is_empty()
    }
}

/// Reads `<dir>/<split file>` line by line.
///
/// # Errors
/// I/O failures, malformed json rows, and rows of a labeled split
/// without a label are all fatal.
pub fn load_corpus(dir: &Path, split: Split) -> Result<Corpus> {
    let path = dir.join(split.file_name());
    log::info!("loading corpus from {}", path.display());

    let reader = BufReader::new(File::open(&path)?);
    let mut src = Vec::new();
    let mut trg = Vec::new();
    let mut labels = split.includes_labels().then(Vec::new);

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row: Row =
            serde_json::from_str(&line).map_err(|source| DataError::Json { line: idx, source })?;

        src.push(row.src.trim().to_string());
        trg.push(row.trg.trim().to_string());
        if let Some(labels) = &mut labels {
            labels.push(row.label.ok_or(DataError::MissingLabel { line: idx })?);
        }
    }

    log::info!("loaded {} corpus rows", src.len());
    Ok(Corpus { src, trg, labels })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_corpus(dir: &Path, name: &str, rows: &[&str]) {
        let mut file = File::create(dir.join(name)).unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
    }

    #[test]
    fn loads_train_rows_and_trims_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(
            dir.path(),
            "train.jsonl",
            &[
                r#"{"src": "  hello there ", "trg": "general kenobi"}"#,
                r#"{"src": "a", "trg": "b"}"#,
            ],
        );

        let corpus = load_corpus(dir.path(), Split::Train).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.src[0], "hello there");
        assert!(corpus.labels.is_none());
    }

    #[test]
    fn samples_split_requires_labels() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(
            dir.path(),
            "samples.jsonl",
            &[r#"{"src": "a", "trg": "b", "label": 3}"#],
        );
        let corpus = load_corpus(dir.path(), Split::Samples).unwrap();
        assert_eq!(corpus.labels, Some(vec![3]));

        write_corpus(dir.path(), "samples.jsonl", &[r#"{"src": "a", "trg": "b"}"#]);
        assert!(matches!(
            load_corpus(dir.path(), Split::Samples),
            Err(DataError::MissingLabel { line: 0 })
        ));
    }

    #[test]
    fn malformed_rows_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path(), "valid.jsonl", &["not json"]);
        assert!(matches!(
            load_corpus(dir.path(), Split::Valid),
            Err(DataError::Json { line: 0, .. })
        ));
    }
}
