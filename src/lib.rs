//! Training orchestration for a diffusion sequence model.
//!
//! The root of this workspace drives the training loop: step and epoch
//! control, checkpoint persistence and resumption, exponential-moving-
//! average shadow tracking across multiple decay rates, loss-aware
//! timestep sampling feedback, and memory-bounded micro-batching for
//! differentially-private runs. The tensor-level seams it orchestrates
//! (model, diffusion process, optimizer, samplers) live in
//! `diffusion_core`; the text corpus pipeline lives in `text_data`.

mod checkpoint;
mod config;
mod ema;
mod error;
mod metrics;
mod privacy;
mod train_loop;

pub use checkpoint::{CheckpointCodec, SUFFIX, decode_step, encode_ema, encode_step};
pub use config::{DecayRate, TrainConfig};
pub use ema::EmaTracker;
pub use error::{Result, TrainError};
pub use metrics::{MeanTracker, quartile};
pub use privacy::{BatchSplitter, MAX_PHYSICAL_BATCH, expand_position_grad};
pub use train_loop::{
    BLOB_LOGDIR_ENV, EnvOverrides, INITIAL_LOG_LOSS_SCALE, TRAINING_TEST_ENV, TrainLoop,
    TrainState, annealed_lr,
};
