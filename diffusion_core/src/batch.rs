use std::collections::BTreeMap;

use ndarray::{Array3, ArrayD, Axis, Slice};

/// Per-example auxiliary tensors carried alongside a batch (token ids,
/// input masks, labels). Passed opaquely to the loss computation.
pub type Cond = BTreeMap<String, ArrayD<i64>>;

/// The unit pulled from a data source each iteration: an embedded batch
/// of shape `[batch, seq_len, hidden]` plus its conditioning tensors.
#[derive(Debug, Clone)]
pub struct BatchRecord {
    pub batch: Array3<f32>,
    pub cond: Cond,
}

impl BatchRecord {
    pub fn batch_size(&self) -> usize {
        self.batch.len_of(Axis(0))
    }

    /// A copy of examples `[start, end)`, slicing every conditioning
    /// tensor along its example axis as well.
    pub fn slice_examples(&self, start: usize, end: usize) -> BatchRecord {
        let batch = self
            .batch
            .slice_axis(Axis(0), Slice::from(start..end))
            .to_owned();
        let cond = self
            .cond
            .iter()
            .map(|(name, tensor)| {
                let sliced = tensor
                    .slice_axis(Axis(0), Slice::from(start..end))
                    .to_owned();
                (name.clone(), sliced)
            })
            .collect();
        BatchRecord { batch, cond }
    }
}

/// A restartable source of training batches.
///
/// Exhaustion signals the end of an epoch, not an error; the trainer
/// calls `reset` before starting the next one.
pub trait DataSource {
    /// Number of batches one full epoch yields.
    fn batches_per_epoch(&self) -> usize;

    /// Rewinds to the start of the epoch.
    fn reset(&mut self);

    /// Yields the next batch, or `None` at the end of the epoch.
    fn next_batch(&mut self) -> Option<BatchRecord>;
}
