use diffusion_core::ParamSet;

use crate::config::DecayRate;
use crate::error::Result;

/// Exponential-moving-average shadows of the master parameters, one
/// full shadow set per configured decay rate.
///
/// The rate list's order is fixed at construction and is the join key
/// for everything indexed by rate: shadow sets, checkpoint filenames,
/// resume lookups.
pub struct EmaTracker {
    rates: Vec<DecayRate>,
    shadows: Vec<ParamSet>,
}

impl EmaTracker {
    /// Starts every shadow as a deep copy of the master parameters.
    pub fn new(rates: Vec<DecayRate>, master: &ParamSet) -> Self {
        let shadows = rates.iter().map(|_| master.clone()).collect();
        Self { rates, shadows }
    }

    pub fn rates(&self) -> &[DecayRate] {
        &self.rates
    }

    pub fn shadow(&self, rate_index: usize) -> &ParamSet {
        &self.shadows[rate_index]
    }

    /// Replaces one shadow set with a resumed snapshot, matched by name.
    pub fn load(&mut self, rate_index: usize, snapshot: &ParamSet) -> Result<()> {
        self.shadows[rate_index].load_named(snapshot)?;
        Ok(())
    }

    /// Moves one shadow toward the master parameters:
    /// `shadow = shadow * rate + master * (1 - rate)`.
    pub fn update(&mut self, rate_index: usize, master: &ParamSet) {
        let rate = self.rates[rate_index].value;
        for ((_, shadow), (_, param)) in self.shadows[rate_index].iter_mut().zip(master.iter()) {
            shadow.zip_mut_with(param, |s, p| *s = *s * rate + *p * (1.0 - rate));
        }
    }

    /// One EMA update for every tracked rate.
    pub fn update_all(&mut self, master: &ParamSet) {
        for i in 0..self.rates.len() {
            self.update(i, master);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    fn rate(token: &str) -> DecayRate {
        DecayRate {
            token: token.to_string(),
            value: token.parse().unwrap(),
        }
    }

    fn master(fill: f32) -> ParamSet {
        let mut set = ParamSet::new();
        set.push("w", ArrayD::from_elem(IxDyn(&[2, 2]), fill));
        set
    }

    #[test]
    fn rate_one_freezes_the_shadow() {
        let mut ema = EmaTracker::new(vec![rate("1.0")], &master(3.0));
        for fill in [5.0, -2.0, 100.0] {
            ema.update(0, &master(fill));
        }
        assert_eq!(ema.shadow(0).get("w").unwrap()[[0, 0]], 3.0);
    }

    #[test]
    fn shadow_converges_monotonically_toward_fixed_master() {
        let mut ema = EmaTracker::new(vec![rate("0.9")], &master(0.0));
        let target = master(10.0);

        let mut prev_gap = 10.0_f32;
        for _ in 0..20 {
            ema.update(0, &target);
            let gap = (10.0 - ema.shadow(0).get("w").unwrap()[[0, 0]]).abs();
            assert!(gap < prev_gap);
            prev_gap = gap;
        }
        assert!(prev_gap < 10.0 * 0.9_f32.powi(20) + 1e-4);
    }

    #[test]
    fn each_rate_tracks_its_own_shadow() {
        let mut ema = EmaTracker::new(vec![rate("0.5"), rate("0.9999")], &master(0.0));
        ema.update_all(&master(1.0));

        let fast = ema.shadow(0).get("w").unwrap()[[0, 0]];
        let slow = ema.shadow(1).get("w").unwrap()[[0, 0]];
        assert!((fast - 0.5).abs() < 1e-6);
        assert!((slow - 1e-4).abs() < 1e-6);
    }

    #[test]
    fn load_replaces_one_shadow_only() {
        let mut ema = EmaTracker::new(vec![rate("0.5"), rate("0.9")], &master(0.0));
        ema.load(1, &master(7.0)).unwrap();
        assert_eq!(ema.shadow(0).get("w").unwrap()[[0, 0]], 0.0);
        assert_eq!(ema.shadow(1).get("w").unwrap()[[0, 0]], 7.0);
    }
}
