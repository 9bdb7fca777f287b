use std::path::PathBuf;

use diffusion_core::{
    BatchRecord, DataSource, Diffusion, Model, Optimizer, PrivateClip, ScheduleSampler,
};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    checkpoint::{CheckpointCodec, decode_step, encode_ema, encode_step},
    config::TrainConfig,
    ema::EmaTracker,
    error::{Result, TrainError},
    metrics::MeanTracker,
    privacy::{BatchSplitter, expand_position_grad},
};

/// Carried in the training state for mixed-precision parity in logs.
/// Training here is full precision, so the value never moves.
pub const INITIAL_LOG_LOSS_SCALE: f32 = 20.0;

/// Redirects checkpoint writes when set.
pub const BLOB_LOGDIR_ENV: &str = "DIFFUSION_BLOB_LOGDIR";

/// Stops the run after the first checkpoint when set; smoke-test runs
/// use it to exercise the full save path without a full training run.
pub const TRAINING_TEST_ENV: &str = "DIFFUSION_TRAINING_TEST";

/// Per-example gradient the recording hook shapes with a singleton
/// example axis; repaired before private clipping.
const POSITION_PARAM: &str = "position_embeddings.weight";
const NORM_PARAM: &str = "layer_norm.weight";

/// Environment-driven overrides, captured once so tests can inject them
/// without mutating process state.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub blob_logdir: Option<PathBuf>,
    pub bounded_test_run: bool,
}

impl EnvOverrides {
    pub fn from_process() -> Self {
        Self {
            blob_logdir: std::env::var_os(BLOB_LOGDIR_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            bounded_test_run: std::env::var_os(TRAINING_TEST_ENV).is_some_and(|v| !v.is_empty()),
        }
    }
}

/// Step counters for one run.
///
/// `step` counts optimizer steps taken by this process; `resume_step`
/// is the absolute step of the checkpoint the run resumed from. Their
/// sum is the absolute step used for learning-rate annealing, budget
/// accounting and checkpoint filenames.
#[derive(Debug, Clone, Copy)]
pub struct TrainState {
    pub step: usize,
    pub resume_step: usize,
    pub log_loss_scale: f32,
}

impl TrainState {
    pub fn absolute_step(&self) -> usize {
        self.step + self.resume_step
    }
}

/// Linear decay of the learning rate over the planned step budget.
pub fn annealed_lr(base: f32, absolute_step: usize, total_planned_steps: usize) -> f32 {
    if total_planned_steps == 0 {
        return base;
    }
    base * (1.0 - absolute_step as f32 / total_planned_steps as f32)
}

/// The update path behind one optimizer step: the plain optimizer over
/// accumulated gradients, or per-example clipping in privacy mode.
enum StepEngine<O: Optimizer> {
    Plain(O),
    Private(PrivateClip<O>),
}

impl<O: Optimizer> StepEngine<O> {
    fn set_learning_rate(&mut self, lr: f32) {
        match self {
            Self::Plain(opt) => opt.set_learning_rate(lr),
            Self::Private(clip) => clip.set_learning_rate(lr),
        }
    }
}

/// Drives a full training run: batch intake, timestep sampling, the
/// forward/backward pair, the optimizer step, EMA shadow updates and
/// periodic checkpointing, resuming from a prior run when a checkpoint
/// resolves.
pub struct TrainLoop<M, D, O, S, DS>
where
    M: Model,
    D: Diffusion<M>,
    O: Optimizer,
    S: ScheduleSampler,
    DS: DataSource,
{
    model: M,
    diffusion: D,
    data: DS,
    engine: StepEngine<O>,
    sampler: S,
    splitter: BatchSplitter,
    ema: EmaTracker,
    codec: CheckpointCodec,
    config: TrainConfig,
    state: TrainState,
    metrics: MeanTracker,
    rng: StdRng,
    env: EnvOverrides,
}

impl<M, D, O, S, DS> TrainLoop<M, D, O, S, DS>
where
    M: Model,
    D: Diffusion<M>,
    O: Optimizer,
    S: ScheduleSampler,
    DS: DataSource,
{
    /// Builds the loop and performs resumption: resolves a resume
    /// checkpoint (discovery first, then the configured path), loads
    /// master parameters from it, and seeds each EMA shadow from its
    /// sibling snapshot when one exists, falling back to a copy of the
    /// freshly loaded master.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mut model: M,
        diffusion: D,
        data: DS,
        optimizer: O,
        sampler: S,
        codec: CheckpointCodec,
        config: TrainConfig,
        env: EnvOverrides,
    ) -> Result<Self> {
        if config.log_interval == 0 || config.save_interval == 0 {
            return Err(TrainError::InvalidConfig(
                "log_interval and save_interval must be positive".to_string(),
            ));
        }
        let rates = config.ema_rates()?;

        let codec = match &env.blob_logdir {
            Some(dir) => codec.with_dir(dir.clone()),
            None => codec,
        };

        let resume = codec.resolve_resume(config.resume_checkpoint());
        let resume_step = resume
            .as_deref()
            .and_then(|p| p.file_name())
            .map(|name| decode_step(&name.to_string_lossy()))
            .unwrap_or(0);
        if let Some(path) = &resume {
            log::info!(
                "resuming from {} at step {resume_step}",
                path.display()
            );
            let snapshot = CheckpointCodec::load(path)?;
            model.parameters_mut().load_named(&snapshot)?;
        }

        let mut ema = EmaTracker::new(rates, model.parameters());
        for i in 0..ema.rates().len() {
            let token = ema.rates()[i].token.clone();
            if let Some(path) = codec.find_ema_checkpoint(resume.as_deref(), resume_step, &token) {
                log::info!("loading EMA shadow ({token}) from {}", path.display());
                let snapshot = CheckpointCodec::load(&path)?;
                ema.load(i, &snapshot)?;
            }
        }

        let engine = if config.privacy_enabled {
            StepEngine::Private(PrivateClip::new(
                optimizer,
                config.privacy_max_grad_norm,
                config.privacy_noise_multiplier,
            ))
        } else {
            StepEngine::Plain(optimizer)
        };
        let splitter = BatchSplitter::new(config.privacy_enabled, config.microbatch_size());
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            model,
            diffusion,
            data,
            engine,
            sampler,
            splitter,
            ema,
            codec,
            config,
            state: TrainState {
                step: 0,
                resume_step,
                log_loss_scale: INITIAL_LOG_LOSS_SCALE,
            },
            metrics: MeanTracker::new(),
            rng,
            env,
        })
    }

    pub fn state(&self) -> &TrainState {
        &self.state
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    pub fn ema(&self) -> &EmaTracker {
        &self.ema
    }

    pub fn metrics(&self) -> &MeanTracker {
        &self.metrics
    }

    /// Runs until the absolute step budget is exhausted, checkpointing
    /// on the configured interval and once more at the end when the
    /// final step fell between intervals. A zero budget returns
    /// immediately without touching the data source.
    pub fn run_loop(&mut self) -> Result<()> {
        while self.state.absolute_step() < self.config.total_planned_steps {
            let record = self.next_batch()?;
            self.run_step(record)?;

            if self.state.step % self.config.log_interval == 0 {
                self.metrics.dump();
            }
            if self.state.step % self.config.save_interval == 0 {
                self.save()?;
                if self.env.bounded_test_run {
                    return Ok(());
                }
            }
        }
        if self.state.step % self.config.save_interval != 0 {
            self.save()?;
        }
        Ok(())
    }

    /// One optimizer step over one logical batch.
    fn run_step(&mut self, record: BatchRecord) -> Result<()> {
        let lr = annealed_lr(
            self.config.learning_rate,
            self.state.absolute_step(),
            self.config.total_planned_steps,
        );
        self.engine.set_learning_rate(lr);

        self.forward_backward(&record)?;
        self.optimize()?;
        self.model.zero_grad();
        self.ema.update_all(self.model.parameters());

        self.state.step += 1;
        self.metrics.logkv_mean("step", self.state.absolute_step() as f64);
        self.metrics.logkv_mean(
            "samples",
            (self.state.absolute_step() * self.config.batch_size) as f64,
        );
        // One batch per step, so epoch progress is steps over epoch size.
        self.metrics.logkv_mean(
            "epoch",
            self.state.step as f64 / self.data.batches_per_epoch().max(1) as f64,
        );
        self.metrics
            .logkv_mean("lr", lr as f64);
        self.metrics
            .logkv_mean("lg_loss_scale", self.state.log_loss_scale as f64);
        Ok(())
    }

    /// Forward and backward over every physical chunk of the batch.
    ///
    /// Chunk importance weights are scaled by the chunk's share of the
    /// logical batch so the accumulated gradients sum to the mean
    /// gradient of the whole batch.
    fn forward_backward(&mut self, record: &BatchRecord) -> Result<()> {
        let private = self.config.privacy_enabled;
        let total = record.batch_size() as f32;
        for chunk in self.splitter.split(record) {
            let (timesteps, weights) = self.sampler.sample(chunk.batch_size(), &mut self.rng);
            let losses = self
                .diffusion
                .training_losses(&mut self.model, &chunk, &timesteps, private)?
                .to_vec();

            if self.sampler.is_loss_aware() {
                self.sampler.update_with_all_losses(&timesteps, &losses);
            }
            // The logged loss carries the importance weights, so the
            // reported mean is the optimized objective mean(loss * weight).
            let weighted: Vec<f32> = losses.iter().zip(&weights).map(|(l, w)| l * w).collect();
            self.metrics.log_loss_quartiles(
                "loss",
                &timesteps,
                &weighted,
                self.diffusion.num_timesteps(),
            );

            let share = chunk.batch_size() as f32 / total;
            let scaled: Vec<f32> = weights.iter().map(|w| w * share).collect();
            self.diffusion
                .backward(&mut self.model, &chunk, &timesteps, &scaled, private)?;
        }
        Ok(())
    }

    fn optimize(&mut self) -> Result<()> {
        match &mut self.engine {
            StepEngine::Plain(opt) => {
                let mut grads = self.model.gradients().clone();
                let threshold = self.config.gradient_clip_threshold;
                if threshold >= 0.0 {
                    for (_, grad) in grads.iter_mut() {
                        grad.mapv_inplace(|g| g.clamp(-threshold, threshold));
                    }
                }
                opt.step(self.model.parameters_mut(), &grads)?;
            }
            StepEngine::Private(clip) => {
                let samples = {
                    let samples = self.model.grad_samples_mut().ok_or_else(|| {
                        TrainError::InvalidConfig(
                            "privacy mode needs a model that records per-example gradients"
                                .to_string(),
                        )
                    })?;
                    expand_position_grad(samples, POSITION_PARAM, NORM_PARAM)?;
                    samples.clone()
                };
                clip.step_with_samples(self.model.parameters_mut(), &samples, &mut self.rng)?;
                if let Some(samples) = self.model.grad_samples_mut() {
                    samples.clear();
                }
            }
        }
        Ok(())
    }

    /// Writes the master snapshot and one EMA snapshot per rate, all
    /// named by the absolute step. EMA snapshots substitute the shadow
    /// values into a copy of the master set so they serialize with the
    /// master's tensor ordering.
    pub fn save(&mut self) -> Result<()> {
        let absolute = self.state.absolute_step();
        self.codec
            .save(&encode_step(absolute), self.model.parameters())?;
        for i in 0..self.ema.rates().len() {
            let token = self.ema.rates()[i].token.clone();
            let mut snapshot = self.model.parameters().clone();
            snapshot.load_named(self.ema.shadow(i))?;
            self.codec.save(&encode_ema(&token, absolute), &snapshot)?;
        }
        Ok(())
    }

    /// Next logical batch, wrapping around epoch boundaries.
    fn next_batch(&mut self) -> Result<BatchRecord> {
        if let Some(record) = self.data.next_batch() {
            return Ok(record);
        }
        self.data.reset();
        self.data.next_batch().ok_or_else(|| {
            TrainError::InvalidConfig("data source yields no batches".to_string())
        })
    }
}
