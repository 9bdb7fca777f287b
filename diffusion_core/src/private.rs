use ndarray::{ArrayD, Axis};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::{
    error::{CoreError, Result},
    model::GradSamples,
    optimizer::Optimizer,
    params::ParamSet,
};

/// Differentially-private clipping wrapper around a plain optimizer.
///
/// Consumes the per-example gradients recorded during a private backward
/// pass: clips each example's global gradient norm to `max_grad_norm`,
/// averages, adds Gaussian noise, and hands the result to the inner
/// optimizer. Every tracked parameter must report the same example
/// count; a mismatch is fatal, not recoverable.
pub struct PrivateClip<O: Optimizer> {
    inner: O,
    max_grad_norm: f32,
    noise_multiplier: f32,
}

impl<O: Optimizer> PrivateClip<O> {
    pub fn new(inner: O, max_grad_norm: f32, noise_multiplier: f32) -> Self {
        Self {
            inner,
            max_grad_norm,
            noise_multiplier,
        }
    }

    pub fn learning_rate(&self) -> f32 {
        self.inner.learning_rate()
    }

    pub fn set_learning_rate(&mut self, lr: f32) {
        self.inner.set_learning_rate(lr);
    }

    /// One private update from per-example gradients. Parameters without
    /// a recorded per-example gradient are left untouched by clipping
    /// and receive a zero gradient.
    pub fn step_with_samples<R: Rng>(
        &mut self,
        params: &mut ParamSet,
        samples: &GradSamples,
        rng: &mut R,
    ) -> Result<()> {
        let num_examples = Self::uniform_example_count(samples)?;

        // Per-example global norm across all tracked parameters.
        let mut sq_norms = vec![0.0_f32; num_examples];
        for (_, tensor) in samples.iter() {
            for (i, sq) in sq_norms.iter_mut().enumerate() {
                let example = tensor.index_axis(Axis(0), i);
                *sq += example.iter().map(|&g| g * g).sum::<f32>();
            }
        }
        let scales: Vec<f32> = sq_norms
            .iter()
            .map(|&sq| (self.max_grad_norm / sq.sqrt().max(1e-6)).min(1.0))
            .collect();

        let noise_std = self.noise_multiplier * self.max_grad_norm / num_examples as f32;
        let normal = Normal::new(0.0_f32, noise_std).ok();

        let mut grads = ParamSet::new();
        for (name, param) in params.iter() {
            let grad = match samples.get(name) {
                Some(tensor) => {
                    let mut acc = ArrayD::<f32>::zeros(param.raw_dim());
                    for (i, &scale) in scales.iter().enumerate() {
                        let example = tensor.index_axis(Axis(0), i);
                        acc.zip_mut_with(&example, |a, &g| *a += scale * g);
                    }
                    acc.mapv_inplace(|g| g / num_examples as f32);
                    if self.noise_multiplier > 0.0 {
                        if let Some(normal) = normal {
                            acc.mapv_inplace(|g| g + normal.sample(rng));
                        }
                    }
                    acc
                }
                None => ArrayD::zeros(param.raw_dim()),
            };
            grads.push(name, grad);
        }

        self.inner.step(params, &grads)
    }

    /// Checks that all per-example gradients agree on the example count.
    fn uniform_example_count(samples: &GradSamples) -> Result<usize> {
        let mut expected: Option<(String, usize)> = None;
        for (name, tensor) in samples.iter() {
            let count = tensor.len_of(Axis(0));
            match &expected {
                None => expected = Some((name.to_string(), count)),
                Some((_, n)) if *n == count => {}
                Some((_, n)) => {
                    return Err(CoreError::ExampleCountMismatch {
                        name: name.to_string(),
                        got: count,
                        expected: *n,
                    });
                }
            }
        }
        expected
            .map(|(_, n)| n)
            .ok_or_else(|| CoreError::MissingParam {
                name: "per-example gradients".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::AdamW;
    use ndarray::{ArrayD, IxDyn};
    use rand::{SeedableRng, rngs::StdRng};

    fn params_of(name: &str, values: &[f32]) -> ParamSet {
        let mut set = ParamSet::new();
        set.push(
            name,
            ArrayD::from_shape_vec(IxDyn(&[values.len()]), values.to_vec()).unwrap(),
        );
        set
    }

    #[test]
    fn mismatched_example_counts_are_fatal() {
        let mut samples = GradSamples::new();
        samples.insert("a", ArrayD::zeros(IxDyn(&[4, 2])));
        samples.insert("b", ArrayD::zeros(IxDyn(&[3, 2])));

        let mut params = params_of("a", &[0.0, 0.0]);
        let mut clip = PrivateClip::new(AdamW::new(0.1, 0.0), 1.0, 0.0);
        let mut rng = StdRng::seed_from_u64(0);

        assert!(matches!(
            clip.step_with_samples(&mut params, &samples, &mut rng),
            Err(CoreError::ExampleCountMismatch { .. })
        ));
    }

    #[test]
    fn clipped_step_moves_parameters() {
        let mut samples = GradSamples::new();
        // Two examples, both pushing w upward.
        samples.insert(
            "w",
            ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1.0, 1.0, 3.0, 3.0]).unwrap(),
        );

        let mut params = params_of("w", &[0.0, 0.0]);
        let mut clip = PrivateClip::new(AdamW::new(0.1, 0.0), 1.0, 0.0);
        let mut rng = StdRng::seed_from_u64(0);

        clip.step_with_samples(&mut params, &samples, &mut rng)
            .unwrap();
        let w = params.get("w").unwrap();
        assert!(w[[0]] < 0.0);
        assert!(w[[1]] < 0.0);
    }

    #[test]
    fn untracked_params_get_zero_gradient() {
        let mut samples = GradSamples::new();
        samples.insert(
            "w",
            ArrayD::from_shape_vec(IxDyn(&[1, 1]), vec![1.0]).unwrap(),
        );

        let mut params = ParamSet::new();
        params.push("w", ArrayD::zeros(IxDyn(&[1])));
        params.push("frozen", ArrayD::from_elem(IxDyn(&[1]), 5.0));

        let mut clip = PrivateClip::new(AdamW::new(0.1, 0.0), 1.0, 0.0);
        let mut rng = StdRng::seed_from_u64(0);
        clip.step_with_samples(&mut params, &samples, &mut rng)
            .unwrap();

        assert_eq!(params.get("frozen").unwrap()[[0]], 5.0);
    }
}
