use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};

/// One EMA decay rate. The raw textual token is preserved so checkpoint
/// filenames render the rate exactly as it was configured, not a
/// reformatted float.
#[derive(Debug, Clone, PartialEq)]
pub struct DecayRate {
    pub token: String,
    pub value: f32,
}

/// The training run's configuration surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Logical batch size pulled from the data source.
    pub batch_size: usize,
    /// Physical batch bound; zero or negative means "use batch_size".
    pub microbatch: i64,
    /// Base learning rate, annealed linearly to zero over the run.
    pub learning_rate: f32,
    /// Single float or comma-separated list, e.g. `"0.9999"` or
    /// `"0.5,0.9999"`. One EMA shadow is tracked per rate.
    pub ema_rate: String,
    /// Dump accumulated metrics every this many steps.
    pub log_interval: usize,
    /// Checkpoint every this many steps.
    pub save_interval: usize,
    /// Path to a checkpoint to resume from; empty for a cold start.
    pub resume_checkpoint: String,
    pub weight_decay: f32,
    /// Total planned optimizer steps. Zero is a degenerate but valid
    /// configuration: the loop returns immediately.
    pub total_planned_steps: usize,
    /// Elementwise gradient clamp; negative disables clipping.
    pub gradient_clip_threshold: f32,
    /// Differential-privacy mode: memory-bounded micro-batching plus
    /// per-example gradient clipping at the optimizer step.
    pub privacy_enabled: bool,
    /// Per-example gradient norm bound in privacy mode.
    #[serde(default = "default_privacy_max_grad_norm")]
    pub privacy_max_grad_norm: f32,
    /// Gaussian noise multiplier in privacy mode; zero adds no noise.
    #[serde(default)]
    pub privacy_noise_multiplier: f32,
    /// Directory checkpoints are written to.
    pub checkpoint_dir: PathBuf,
    /// RNG seed; `None` seeds from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_privacy_max_grad_norm() -> f32 {
    1.0
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            microbatch: -1,
            learning_rate: 1e-4,
            ema_rate: "0.9999".to_string(),
            log_interval: 50,
            save_interval: 2000,
            resume_checkpoint: String::new(),
            weight_decay: 0.0,
            total_planned_steps: 0,
            gradient_clip_threshold: -1.0,
            privacy_enabled: false,
            privacy_max_grad_norm: default_privacy_max_grad_norm(),
            privacy_noise_multiplier: 0.0,
            checkpoint_dir: PathBuf::from("checkpoints"),
            seed: None,
        }
    }
}

impl TrainConfig {
    /// The physical batch bound actually in effect.
    pub fn microbatch_size(&self) -> usize {
        if self.microbatch <= 0 {
            self.batch_size
        } else {
            self.microbatch as usize
        }
    }

    /// The configured resume path, or `None` when empty.
    pub fn resume_checkpoint(&self) -> Option<&Path> {
        if self.resume_checkpoint.is_empty() {
            None
        } else {
            Some(Path::new(&self.resume_checkpoint))
        }
    }

    /// Parses `ema_rate` into its fixed-order rate list.
    ///
    /// The list's order is the join key against the parallel list of
    /// EMA shadow sets and never changes after this call.
    ///
    /// # Errors
    /// `InvalidConfig` for unparsable tokens or rates outside `(0, 1]`.
    pub fn ema_rates(&self) -> Result<Vec<DecayRate>> {
        self.ema_rate
            .split(',')
            .map(|token| {
                let token = token.trim();
                let value: f32 = token.parse().map_err(|_| {
                    TrainError::InvalidConfig(format!("ema_rate token {token:?} is not a float"))
                })?;
                if !(value > 0.0 && value <= 1.0) {
                    return Err(TrainError::InvalidConfig(format!(
                        "ema_rate {value} is outside (0, 1]"
                    )));
                }
                Ok(DecayRate {
                    token: token.to_string(),
                    value,
                })
            })
            .collect()
    }
}
