use rand::Rng;

/// How many recent loss values each timestep keeps before the
/// loss-aware distribution activates.
const HISTORY_PER_TERM: usize = 10;

/// Mass mixed back into the distribution so no timestep starves.
const UNIFORM_PROB: f32 = 0.001;

/// Chooses diffusion timesteps for each batch.
///
/// `sample` returns one `(timestep, weight)` pair per example such that
/// `loss * weight` stays an unbiased estimator of the uniform-sampling
/// objective regardless of the distribution actually used.
pub trait ScheduleSampler {
    fn num_timesteps(&self) -> usize;

    fn sample<R: Rng>(&mut self, n: usize, rng: &mut R) -> (Vec<usize>, Vec<f32>);

    /// Feeds back detached per-example losses after a step. The only
    /// mutation point; a no-op for stateless samplers.
    fn update_with_all_losses(&mut self, _timesteps: &[usize], _losses: &[f32]) {}

    /// Whether `update_with_all_losses` must be called every step.
    fn is_loss_aware(&self) -> bool {
        false
    }
}

/// Timesteps drawn uniformly over the horizon, all weights 1.0.
#[derive(Debug, Clone)]
pub struct UniformSampler {
    num_timesteps: usize,
}

impl UniformSampler {
    pub fn new(num_timesteps: usize) -> Self {
        Self { num_timesteps }
    }
}

impl ScheduleSampler for UniformSampler {
    fn num_timesteps(&self) -> usize {
        self.num_timesteps
    }

    fn sample<R: Rng>(&mut self, n: usize, rng: &mut R) -> (Vec<usize>, Vec<f32>) {
        let timesteps = (0..n)
            .map(|_| rng.random_range(0..self.num_timesteps))
            .collect();
        (timesteps, vec![1.0; n])
    }
}

/// Timesteps drawn proportionally to the second moment of recently
/// observed losses, with importance weights inverse to the sampling
/// probability. Falls back to uniform until every timestep has a full
/// loss history.
#[derive(Debug, Clone)]
pub struct LossAwareSampler {
    history: Vec<Vec<f32>>,
}

impl LossAwareSampler {
    pub fn new(num_timesteps: usize) -> Self {
        Self {
            history: vec![Vec::new(); num_timesteps],
        }
    }

    fn warmed_up(&self) -> bool {
        self.history.iter().all(|h| h.len() == HISTORY_PER_TERM)
    }

    /// The current sampling distribution over timesteps.
    pub fn weights(&self) -> Vec<f32> {
        let t = self.history.len();
        if !self.warmed_up() {
            return vec![1.0 / t as f32; t];
        }

        let mut weights: Vec<f32> = self
            .history
            .iter()
            .map(|h| {
                let second_moment =
                    h.iter().map(|&l| l * l).sum::<f32>() / HISTORY_PER_TERM as f32;
                second_moment.sqrt()
            })
            .collect();
        let total: f32 = weights.iter().sum();
        for w in &mut weights {
            *w = *w / total * (1.0 - UNIFORM_PROB) + UNIFORM_PROB / t as f32;
        }
        weights
    }
}

impl ScheduleSampler for LossAwareSampler {
    fn num_timesteps(&self) -> usize {
        self.history.len()
    }

    fn sample<R: Rng>(&mut self, n: usize, rng: &mut R) -> (Vec<usize>, Vec<f32>) {
        let probs = self.weights();
        let horizon = probs.len();

        let mut timesteps = Vec::with_capacity(n);
        let mut weights = Vec::with_capacity(n);
        for _ in 0..n {
            let u: f32 = rng.random();
            let mut acc = 0.0;
            let mut picked = horizon - 1;
            for (t, &p) in probs.iter().enumerate() {
                acc += p;
                if u < acc {
                    picked = t;
                    break;
                }
            }
            timesteps.push(picked);
            weights.push(1.0 / (horizon as f32 * probs[picked]));
        }
        (timesteps, weights)
    }

    fn update_with_all_losses(&mut self, timesteps: &[usize], losses: &[f32]) {
        for (&t, &loss) in timesteps.iter().zip(losses) {
            let history = &mut self.history[t];
            if history.len() == HISTORY_PER_TERM {
                history.remove(0);
            }
            history.push(loss);
        }
    }

    fn is_loss_aware(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn uniform_sampler_weights_are_one() {
        let mut sampler = UniformSampler::new(100);
        let mut rng = StdRng::seed_from_u64(7);
        let (timesteps, weights) = sampler.sample(32, &mut rng);
        assert_eq!(timesteps.len(), 32);
        assert!(timesteps.iter().all(|&t| t < 100));
        assert!(weights.iter().all(|&w| w == 1.0));
    }

    #[test]
    fn loss_aware_is_uniform_until_warmed_up() {
        let mut sampler = LossAwareSampler::new(4);
        let timesteps = [0, 1, 2];
        let losses = [1.0, 2.0, 3.0];
        sampler.update_with_all_losses(&timesteps, &losses);

        // Timestep 3 never saw a loss, so the distribution stays uniform.
        let weights = sampler.weights();
        assert!(weights.iter().all(|&w| (w - 0.25).abs() < 1e-6));
    }

    #[test]
    fn loss_aware_prefers_high_loss_timesteps() {
        let mut sampler = LossAwareSampler::new(2);
        for _ in 0..HISTORY_PER_TERM {
            sampler.update_with_all_losses(&[0, 1], &[10.0, 1.0]);
        }

        let weights = sampler.weights();
        assert!(weights[0] > weights[1]);
        assert!((weights.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn loss_aware_importance_weights_invert_probability() {
        let mut sampler = LossAwareSampler::new(2);
        for _ in 0..HISTORY_PER_TERM {
            sampler.update_with_all_losses(&[0, 1], &[4.0, 1.0]);
        }

        let probs = sampler.weights();
        let mut rng = StdRng::seed_from_u64(3);
        let (timesteps, weights) = sampler.sample(64, &mut rng);
        for (&t, &w) in timesteps.iter().zip(&weights) {
            let expected = 1.0 / (2.0 * probs[t]);
            assert!((w - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn history_is_bounded() {
        let mut sampler = LossAwareSampler::new(1);
        for i in 0..25 {
            sampler.update_with_all_losses(&[0], &[i as f32]);
        }
        assert_eq!(sampler.history[0].len(), HISTORY_PER_TERM);
        // Oldest entries were evicted first.
        assert_eq!(sampler.history[0][0], 15.0);
    }
}
