use ndarray::ArrayD;

use crate::error::{CoreError, Result};

/// An ordered, name-addressed set of parameter tensors.
///
/// The order is the join key against every parallel structure built from
/// the same model (gradients, EMA shadows, optimizer moments), so it never
/// changes after construction. Lookups by name exist for snapshot
/// round-tripping, where serialized orderings may differ from the live one.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSet {
    entries: Vec<(String, ArrayD<f32>)>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, tensor: ArrayD<f32>) {
        self.entries.push((name.into(), tensor));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of scalar values across all tensors.
    pub fn num_values(&self) -> usize {
        self.entries.iter().map(|(_, t)| t.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayD<f32>)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), t))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut ArrayD<f32>)> {
        self.entries.iter_mut().map(|(n, t)| (n.as_str(), t))
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }

    /// A set with the same names and shapes, filled with zeros.
    pub fn zeros_like(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(|(n, t)| (n.clone(), ArrayD::zeros(t.raw_dim())))
                .collect(),
        }
    }

    /// Replaces every tensor with the same-named tensor from `source`.
    ///
    /// Matching is by name, not position, so a snapshot serialized in a
    /// different (architecture-compatible) order still loads. `source`
    /// must cover a superset of this set's names with identical shapes.
    ///
    /// # Errors
    /// `MissingParam` if a name is absent from `source`, `ShapeMismatch`
    /// if the named tensor disagrees in shape.
    pub fn load_named(&mut self, source: &ParamSet) -> Result<()> {
        for (name, tensor) in &mut self.entries {
            let loaded = source.get(name).ok_or_else(|| CoreError::MissingParam {
                name: name.clone(),
            })?;
            if loaded.shape() != tensor.shape() {
                return Err(CoreError::ShapeMismatch {
                    name: name.clone(),
                    got: loaded.shape().to_vec(),
                    expected: tensor.shape().to_vec(),
                });
            }
            *tensor = loaded.clone();
        }
        Ok(())
    }

    /// Checks that `other` has the same names, in the same order, with the
    /// same shapes. Gradient sets handed to an optimizer must pass this.
    pub fn check_aligned(&self, other: &ParamSet) -> Result<()> {
        if self.len() != other.len() {
            return Err(CoreError::OrderMismatch {
                got: format!("{} entries", other.len()),
                expected: format!("{} entries", self.len()),
            });
        }
        for ((name, tensor), (other_name, other_tensor)) in
            self.entries.iter().zip(&other.entries)
        {
            if name != other_name {
                return Err(CoreError::OrderMismatch {
                    got: other_name.clone(),
                    expected: name.clone(),
                });
            }
            if tensor.shape() != other_tensor.shape() {
                return Err(CoreError::ShapeMismatch {
                    name: name.clone(),
                    got: other_tensor.shape().to_vec(),
                    expected: tensor.shape().to_vec(),
                });
            }
        }
        Ok(())
    }
}

impl Default for ParamSet {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<(String, ArrayD<f32>)> for ParamSet {
    fn from_iter<I: IntoIterator<Item = (String, ArrayD<f32>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
