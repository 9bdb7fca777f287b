use diffusion_core::{BatchRecord, CoreError, GradSamples};
use ndarray::IxDyn;

use crate::error::{Result, TrainError};

/// Hard upper bound on how many examples a private forward/backward pass
/// may hold in memory at once, whatever the configured microbatch says.
pub const MAX_PHYSICAL_BATCH: usize = 64;

/// Splits logical batches into memory-bounded physical chunks for
/// privacy-mode training. Outside privacy mode it passes batches
/// through untouched.
#[derive(Debug, Clone, Copy)]
pub struct BatchSplitter {
    enabled: bool,
    cap: usize,
}

impl BatchSplitter {
    pub fn new(enabled: bool, microbatch_size: usize) -> Self {
        Self {
            enabled,
            cap: microbatch_size.clamp(1, MAX_PHYSICAL_BATCH),
        }
    }

    /// The physical chunk bound in effect.
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Contiguous physical chunks covering the logical batch in order.
    /// Every chunk except possibly the last has exactly `cap` examples.
    pub fn split(&self, record: &BatchRecord) -> Vec<BatchRecord> {
        if !self.enabled {
            return vec![record.clone()];
        }
        let total = record.batch_size();
        let mut chunks = Vec::with_capacity(total.div_ceil(self.cap));
        let mut start = 0;
        while start < total {
            let end = (start + self.cap).min(total);
            chunks.push(record.slice_examples(start, end));
            start = end;
        }
        chunks
    }
}

/// Repairs the one per-example gradient the recording hook cannot shape
/// correctly: position embeddings are shared across the batch, so their
/// recorded sample arrives with a singleton example axis. Broadcasts it
/// to the example count reported by `norm_param` before clipping.
///
/// No-op when either tensor is absent or the counts already agree.
///
/// # Errors
/// `ExampleCountMismatch` when the recorded axis is neither 1 nor the
/// norm layer's example count. That means the hook recorded garbage and
/// clipping on top of it would silently corrupt the update.
pub fn expand_position_grad(
    samples: &mut GradSamples,
    position_param: &str,
    norm_param: &str,
) -> Result<()> {
    let Some(norm) = samples.get(norm_param) else {
        return Ok(());
    };
    let Some(pos) = samples.get(position_param) else {
        return Ok(());
    };
    let (Some(&examples), Some(&recorded)) = (norm.shape().first(), pos.shape().first()) else {
        return Err(TrainError::Core(CoreError::ShapeMismatch {
            name: position_param.to_string(),
            got: pos.shape().to_vec(),
            expected: vec![1],
        }));
    };

    if recorded == examples {
        return Ok(());
    }
    if recorded != 1 {
        return Err(TrainError::Core(CoreError::ExampleCountMismatch {
            name: position_param.to_string(),
            got: recorded,
            expected: examples,
        }));
    }

    let mut shape = pos.shape().to_vec();
    shape[0] = examples;
    let expanded = pos
        .broadcast(IxDyn(&shape))
        .map(|view| view.to_owned())
        .ok_or_else(|| {
            TrainError::Core(CoreError::ShapeMismatch {
                name: position_param.to_string(),
                got: pos.shape().to_vec(),
                expected: shape.clone(),
            })
        })?;
    samples.replace(position_param, expanded);
    Ok(())
}
