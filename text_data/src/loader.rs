use diffusion_core::{BatchRecord, Cond, DataSource};
use ndarray::{Array1, Array2, Array3};

use crate::dataset::{Embedding, TextDataset};

/// Batches a [`TextDataset`] into [`BatchRecord`]s.
///
/// Iterates in corpus order; the final short batch is yielded rather
/// than dropped. One pass over the dataset is one epoch.
pub struct TextDataLoader<E> {
    dataset: TextDataset<E>,
    batch_size: usize,
    cursor: usize,
}

impl<E: Embedding> TextDataLoader<E> {
    pub fn new(dataset: TextDataset<E>, batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch_size must be positive");
        Self {
            dataset,
            batch_size,
            cursor: 0,
        }
    }

    fn build_record(&self, start: usize, end: usize) -> BatchRecord {
        let n = end - start;
        let seq_len = self.dataset.seq_len();
        let hidden = self.dataset.hidden_size();

        let mut batch = Array3::<f32>::zeros((n, seq_len, hidden));
        let mut input_ids = Array2::<i64>::zeros((n, seq_len));
        let mut input_mask = Array2::<i64>::zeros((n, seq_len));
        let mut labels = self
            .dataset
            .has_labels()
            .then(|| Array1::<i64>::zeros(n));

        for (row, idx) in (start..end).enumerate() {
            batch
                .index_axis_mut(ndarray::Axis(0), row)
                .assign(&self.dataset.embed(idx));

            let example = self.dataset.example(idx);
            for (col, &id) in example.input_ids.iter().enumerate() {
                input_ids[[row, col]] = id;
            }
            for (col, &m) in example.input_mask.iter().enumerate() {
                input_mask[[row, col]] = m;
            }
            if let Some(labels) = &mut labels {
                labels[row] = example.label.unwrap_or(0);
            }
        }

        let mut cond = Cond::new();
        cond.insert("input_ids".to_string(), input_ids.into_dyn());
        cond.insert("input_mask".to_string(), input_mask.into_dyn());
        if let Some(labels) = labels {
            cond.insert("label".to_string(), labels.into_dyn());
        }

        BatchRecord { batch, cond }
    }
}

impl<E: Embedding> DataSource for TextDataLoader<E> {
    fn batches_per_epoch(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }

    fn next_batch(&mut self) -> Option<BatchRecord> {
        if self.cursor >= self.dataset.len() {
            return None;
        }
        let start = self.cursor;
        let end = (start + self.batch_size).min(self.dataset.len());
        self.cursor = end;
        Some(self.build_record(start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Corpus,
        dataset::testing::{ByteVocab, ToyEmbedding},
    };

    fn loader(rows: usize, batch_size: usize, labels: bool) -> TextDataLoader<ToyEmbedding> {
        let corpus = Corpus {
            src: (0..rows).map(|i| format!("s{i}")).collect(),
            trg: (0..rows).map(|i| format!("t{i}")).collect(),
            labels: labels.then(|| (0..rows as i64).collect()),
        };
        let dataset = TextDataset::from_corpus(&corpus, &ByteVocab, 12, ToyEmbedding).unwrap();
        TextDataLoader::new(dataset, batch_size)
    }

    #[test]
    fn yields_full_then_short_batch() {
        let mut loader = loader(5, 2, false);
        assert_eq!(loader.batches_per_epoch(), 3);

        let sizes: Vec<usize> = std::iter::from_fn(|| loader.next_batch())
            .map(|r| r.batch_size())
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(loader.next_batch().is_none());

        loader.reset();
        assert_eq!(loader.next_batch().unwrap().batch_size(), 2);
    }

    #[test]
    fn batch_shape_matches_dataset() {
        let mut loader = loader(3, 3, false);
        let record = loader.next_batch().unwrap();
        assert_eq!(record.batch.dim(), (3, 12, 2));
        assert_eq!(record.cond["input_ids"].shape(), &[3, 12]);
        assert_eq!(record.cond["input_mask"].shape(), &[3, 12]);
        assert!(!record.cond.contains_key("label"));
    }

    #[test]
    fn labels_survive_batching_end_to_end() {
        let mut loader = loader(4, 3, true);
        let mut seen = Vec::new();
        while let Some(record) = loader.next_batch() {
            seen.extend(record.cond["label"].iter().copied());
        }
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }
}
