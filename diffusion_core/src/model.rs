use std::collections::BTreeMap;

use ndarray::ArrayD;

use crate::params::ParamSet;

/// Per-example gradients recorded by a backward pass running under the
/// privacy engine. Axis 0 of every tensor is the example axis.
#[derive(Debug, Clone, Default)]
pub struct GradSamples {
    entries: BTreeMap<String, ArrayD<f32>>,
}

impl GradSamples {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: ArrayD<f32>) {
        self.entries.insert(name.into(), tensor);
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayD<f32>)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), t))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces the tensor stored under `name`.
    pub fn replace(&mut self, name: &str, tensor: ArrayD<f32>) {
        self.entries.insert(name.to_string(), tensor);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// The trainable model as the orchestrator sees it: a named parameter
/// set, an accumulated gradient set aligned with it, and (in privacy
/// mode) the per-example gradients the clipping step consumes.
///
/// The architecture behind it is opaque; forward/backward mathematics
/// live behind [`crate::Diffusion`].
pub trait Model {
    fn parameters(&self) -> &ParamSet;

    fn parameters_mut(&mut self) -> &mut ParamSet;

    /// Gradients accumulated since the last `zero_grad`, aligned
    /// one-to-one with `parameters()`.
    fn gradients(&self) -> &ParamSet;

    fn zero_grad(&mut self);

    /// Per-example gradients from the last backward pass, present only
    /// when the model runs under the privacy engine.
    fn grad_samples_mut(&mut self) -> Option<&mut GradSamples> {
        None
    }
}
