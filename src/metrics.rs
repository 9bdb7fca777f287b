use std::collections::BTreeMap;

/// Which quarter of the diffusion schedule a timestep falls in, 0..=3.
pub fn quartile(t: usize, num_timesteps: usize) -> usize {
    4 * t / num_timesteps
}

/// Accumulates running means between metric dumps.
///
/// Keys are created on first use; `dump` logs every mean and resets the
/// accumulator for the next window.
#[derive(Debug, Default)]
pub struct MeanTracker {
    sums: BTreeMap<String, (f64, u64)>,
}

impl MeanTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logkv_mean(&mut self, key: impl Into<String>, value: f64) {
        let entry = self.sums.entry(key.into()).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    /// Records a batch of per-example losses under `key`, plus one
    /// schedule-quartile breakdown key per example.
    pub fn log_loss_quartiles(
        &mut self,
        key: &str,
        timesteps: &[usize],
        losses: &[f32],
        num_timesteps: usize,
    ) {
        for (&t, &loss) in timesteps.iter().zip(losses) {
            self.logkv_mean(key, loss as f64);
            let q = quartile(t, num_timesteps);
            self.logkv_mean(format!("{key}_q{q}"), loss as f64);
        }
    }

    pub fn mean(&self, key: &str) -> Option<f64> {
        self.sums
            .get(key)
            .map(|&(sum, count)| sum / count.max(1) as f64)
    }

    /// Logs every accumulated mean and starts a fresh window.
    pub fn dump(&mut self) {
        for (key, &(sum, count)) in &self.sums {
            log::info!("{key}: {:.6}", sum / count.max(1) as f64);
        }
        self.sums.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quartile_boundaries() {
        assert_eq!(quartile(0, 100), 0);
        assert_eq!(quartile(24, 100), 0);
        assert_eq!(quartile(25, 100), 1);
        assert_eq!(quartile(77, 100), 3);
        assert_eq!(quartile(99, 100), 3);
        // Schedules not divisible by four still land in 0..=3.
        assert_eq!(quartile(6, 7), 3);
    }

    #[test]
    fn means_accumulate_until_dump() {
        let mut tracker = MeanTracker::new();
        tracker.logkv_mean("loss", 1.0);
        tracker.logkv_mean("loss", 3.0);
        assert_eq!(tracker.mean("loss"), Some(2.0));

        tracker.dump();
        assert_eq!(tracker.mean("loss"), None);
    }

    #[test]
    fn quartile_breakdown_keys() {
        let mut tracker = MeanTracker::new();
        tracker.log_loss_quartiles("loss", &[0, 77, 99], &[1.0, 2.0, 4.0], 100);

        assert_eq!(tracker.mean("loss"), Some(7.0 / 3.0));
        assert_eq!(tracker.mean("loss_q0"), Some(1.0));
        assert_eq!(tracker.mean("loss_q3"), Some(3.0));
        assert_eq!(tracker.mean("loss_q1"), None);
    }
}
