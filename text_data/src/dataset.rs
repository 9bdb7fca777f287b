use ndarray::Array2;

use crate::{
    corpus::Corpus,
    error::{DataError, Result},
    prepare::{merge_and_mask, pad_to},
    vocab::Vocab,
};

/// The embedding seam: maps padded token ids to the `[seq_len, hidden]`
/// float tensor the diffusion model consumes. Used when the word
/// embedding is fixed rather than trained end-to-end.
pub trait Embedding {
    fn hidden_size(&self) -> usize;

    fn embed(&self, ids: &[i64]) -> Array2<f32>;
}

/// One fully prepared example: merged, masked, padded token ids plus
/// the label carried over from a labeled split.
#[derive(Debug, Clone)]
pub struct TextExample {
    pub input_ids: Vec<i64>,
    pub input_mask: Vec<i64>,
    pub label: Option<i64>,
}

/// A tokenized, merged and padded corpus split, ready for batching.
pub struct TextDataset<E> {
    examples: Vec<TextExample>,
    embedding: E,
    seq_len: usize,
}

impl<E: Embedding> TextDataset<E> {
    /// Tokenizes and prepares every corpus row.
    ///
    /// Labels present in the corpus are attached to their example and
    /// never touched again by the pipeline.
    pub fn from_corpus(
        corpus: &Corpus,
        vocab: &impl Vocab,
        seq_len: usize,
        embedding: E,
    ) -> Result<Self> {
        let mut examples = Vec::with_capacity(corpus.len());
        for idx in 0..corpus.len() {
            let src = vocab.encode(&corpus.src[idx]);
            let trg = vocab.encode(&corpus.trg[idx]);
            let (ids, mask) = merge_and_mask(&src, &trg, seq_len, vocab.sep_token_id())
                .map_err(|e| match e {
                    DataError::EmptyEncoding { .. } => DataError::EmptyEncoding { line: idx },
                    other => other,
                })?;

            examples.push(TextExample {
                input_ids: pad_to(&ids, vocab.pad_token_id(), seq_len),
                input_mask: pad_to(&mask, 1, seq_len),
                label: corpus.labels.as_ref().map(|labels| labels[idx]),
            });
        }

        log::debug!("prepared {} examples", examples.len());
        Ok(Self {
            examples,
            embedding,
            seq_len,
        })
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn hidden_size(&self) -> usize {
        self.embedding.hidden_size()
    }

    pub fn has_labels(&self) -> bool {
        self.examples.first().is_some_and(|e| e.label.is_some())
    }

    pub fn example(&self, idx: usize) -> &TextExample {
        &self.examples[idx]
    }

    /// Embeds one example into its `[seq_len, hidden]` tensor.
    pub fn embed(&self, idx: usize) -> Array2<f32> {
        self.embedding.embed(&self.examples[idx].input_ids)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Identity-ish vocab for tests: bytes of the text, then an end id.
    pub struct ByteVocab;

    impl Vocab for ByteVocab {
        fn encode(&self, text: &str) -> Vec<i64> {
            let mut ids: Vec<i64> = text.bytes().map(|b| b as i64).collect();
            ids.push(self.end_token_id());
            ids
        }

        fn sep_token_id(&self) -> i64 {
            256
        }

        fn pad_token_id(&self) -> i64 {
            0
        }
    }

    impl ByteVocab {
        pub fn end_token_id(&self) -> i64 {
            257
        }
    }

    /// Embeds each id as `[id, 1.0]`.
    pub struct ToyEmbedding;

    impl Embedding for ToyEmbedding {
        fn hidden_size(&self) -> usize {
            2
        }

        fn embed(&self, ids: &[i64]) -> Array2<f32> {
            Array2::from_shape_fn((ids.len(), 2), |(s, h)| {
                if h == 0 { ids[s] as f32 } else { 1.0 }
            })
        }
    }
}
