mod batch;
mod diffusion;
mod error;
mod model;
mod optimizer;
mod params;
mod private;
mod sampler;

pub use batch::{BatchRecord, Cond, DataSource};
pub use diffusion::Diffusion;
pub use error::{CoreError, Result};
pub use model::{GradSamples, Model};
pub use optimizer::{AdamW, Optimizer};
pub use params::ParamSet;
pub use private::PrivateClip;
pub use sampler::{LossAwareSampler, ScheduleSampler, UniformSampler};
