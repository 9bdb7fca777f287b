use ndarray::Array1;

use crate::{batch::BatchRecord, error::Result, model::Model};

/// The diffusion process as the trainer consumes it.
///
/// `training_losses` is the forward pass: per-example losses for the
/// sampled timesteps. `backward` accumulates into the model the
/// gradients of the importance-weighted mean of those losses. The
/// trainer always sequences the two calls back to back for the same
/// batch and timesteps; splitting them keeps the detached losses
/// available for the loss-aware sampler in between.
pub trait Diffusion<M: Model> {
    /// Length of the noise schedule. Timesteps are indices in
    /// `0..num_timesteps()`.
    fn num_timesteps(&self) -> usize;

    /// Computes one loss value per example in `record`, at the given
    /// timesteps (`timesteps.len() == record.batch_size()`).
    fn training_losses(
        &self,
        model: &mut M,
        record: &BatchRecord,
        timesteps: &[usize],
        private: bool,
    ) -> Result<Array1<f32>>;

    /// Accumulates gradients of `mean(loss * weight)` into the model.
    /// In privacy mode the model additionally records per-example
    /// gradients for the parameters the clipping step tracks.
    fn backward(
        &self,
        model: &mut M,
        record: &BatchRecord,
        timesteps: &[usize],
        weights: &[f32],
        private: bool,
    ) -> Result<()>;
}
