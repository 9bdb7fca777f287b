use ndarray::ArrayD;

use crate::{error::Result, params::ParamSet};

/// Applies accumulated gradients to a parameter set.
pub trait Optimizer {
    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, lr: f32);

    /// One update. `grads` must be aligned with `params` (same names,
    /// same order, same shapes).
    fn step(&mut self, params: &mut ParamSet, grads: &ParamSet) -> Result<()>;
}

/// AdamW with decoupled weight decay.
///
/// Moment buffers are allocated lazily on the first step, shaped after
/// the parameter set they will follow for the rest of the run.
pub struct AdamW {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    weight_decay: f32,
    t: u64,
    moments: Option<Vec<(ArrayD<f32>, ArrayD<f32>)>>,
}

impl AdamW {
    pub fn new(lr: f32, weight_decay: f32) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay,
            t: 0,
            moments: None,
        }
    }

    pub fn with_betas(mut self, beta1: f32, beta2: f32) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }
}

impl Optimizer for AdamW {
    fn learning_rate(&self) -> f32 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn step(&mut self, params: &mut ParamSet, grads: &ParamSet) -> Result<()> {
        params.check_aligned(grads)?;

        let moments = self.moments.get_or_insert_with(|| {
            params
                .iter()
                .map(|(_, t)| (ArrayD::zeros(t.raw_dim()), ArrayD::zeros(t.raw_dim())))
                .collect()
        });

        self.t += 1;
        let bias1 = 1.0 - self.beta1.powi(self.t as i32);
        let bias2 = 1.0 - self.beta2.powi(self.t as i32);

        for (((_, param), (_, grad)), (m, v)) in
            params.iter_mut().zip(grads.iter()).zip(moments.iter_mut())
        {
            m.zip_mut_with(grad, |m, &g| *m = self.beta1 * *m + (1.0 - self.beta1) * g);
            v.zip_mut_with(grad, |v, &g| *v = self.beta2 * *v + (1.0 - self.beta2) * g * g);

            for ((p, &m), &v) in param.iter_mut().zip(m.iter()).zip(v.iter()) {
                let m_hat = m / bias1;
                let v_hat = v / bias2;
                *p -= self.lr * (m_hat / (v_hat.sqrt() + self.eps) + self.weight_decay * *p);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    fn set_of(values: &[f32]) -> ParamSet {
        let mut set = ParamSet::new();
        set.push(
            "w",
            ArrayD::from_shape_vec(IxDyn(&[values.len()]), values.to_vec()).unwrap(),
        );
        set
    }

    #[test]
    fn adamw_moves_against_gradient() {
        let mut params = set_of(&[1.0, -1.0]);
        let grads = set_of(&[0.5, -0.5]);
        let mut opt = AdamW::new(0.1, 0.0);

        opt.step(&mut params, &grads).unwrap();
        let w = params.get("w").unwrap();
        assert!(w[[0]] < 1.0);
        assert!(w[[1]] > -1.0);
    }

    #[test]
    fn weight_decay_shrinks_params_without_gradient() {
        let mut params = set_of(&[2.0]);
        let grads = set_of(&[0.0]);
        let mut opt = AdamW::new(0.1, 0.1);

        opt.step(&mut params, &grads).unwrap();
        assert!(params.get("w").unwrap()[[0]] < 2.0);
    }

    #[test]
    fn adamw_shrinks_a_quadratic_objective() {
        use ndarray_rand::RandomExt;
        use ndarray_rand::rand_distr::Uniform;

        let init = ArrayD::random(IxDyn(&[8]), Uniform::new(-0.5_f32, 0.5));
        let mut params = ParamSet::new();
        params.push("w", init);
        let mut opt = AdamW::new(0.05, 0.0);

        let norm = |set: &ParamSet| -> f32 {
            set.get("w").unwrap().iter().map(|&w| w * w).sum::<f32>()
        };
        let start = norm(&params);
        for _ in 0..200 {
            // grad of ||w||^2 is 2w.
            let grads: ParamSet = params
                .iter()
                .map(|(n, t)| (n.to_string(), t.mapv(|w| 2.0 * w)))
                .collect();
            opt.step(&mut params, &grads).unwrap();
        }
        let end = norm(&params);
        assert!(end <= start);
        assert!(end < 1e-2);
    }

    #[test]
    fn misaligned_gradients_are_rejected() {
        let mut params = set_of(&[1.0]);
        let mut grads = ParamSet::new();
        grads.push("other", ArrayD::zeros(IxDyn(&[1])));
        let mut opt = AdamW::new(0.1, 0.0);

        assert!(opt.step(&mut params, &grads).is_err());
    }
}
