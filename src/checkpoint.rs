use std::{
    fs,
    path::{Path, PathBuf},
};

use diffusion_core::ParamSet;
use ndarray::{ArrayD, IxDyn};
use safetensors::{
    SafeTensors,
    tensor::{Dtype, TensorView},
};

use crate::error::{Result, TrainError};

/// Snapshot file extension.
pub const SUFFIX: &str = ".safetensors";

/// Filename for the master snapshot at an absolute step:
/// `NNNNNN.safetensors`, step zero-padded to six digits.
pub fn encode_step(step: usize) -> String {
    format!("{step:06}{SUFFIX}")
}

/// Filename for an EMA snapshot: `ema_<rate>_<NNNNNN>.safetensors`.
/// The rate token is rendered verbatim as configured.
pub fn encode_ema(rate_token: &str, step: usize) -> String {
    format!("ema_{rate_token}_{step:06}{SUFFIX}")
}

/// Parses the step number out of a snapshot filename.
///
/// Fails closed: anything that does not end in the recognized suffix
/// with a trailing run of digits decodes to 0, meaning "no meaningful
/// step parsed". Callers must not treat 0 as corruption.
pub fn decode_step(filename: &str) -> usize {
    let Some(stem) = filename.strip_suffix(SUFFIX) else {
        return 0;
    };
    let digits: String = stem
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .take(6)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().unwrap_or(0)
}

/// Locates and persists parameter snapshots under one run directory.
///
/// Discovery of a resume checkpoint is an injectable strategy; the
/// default finds nothing, so resumption only happens when a path is
/// configured explicitly. Deployments with their own storage layout
/// plug in real discovery via [`CheckpointCodec::with_discovery`].
pub struct CheckpointCodec {
    dir: PathBuf,
    discover: Option<Box<dyn Fn() -> Option<PathBuf>>>,
}

impl CheckpointCodec {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            discover: None,
        }
    }

    pub fn with_discovery(mut self, discover: impl Fn() -> Option<PathBuf> + 'static) -> Self {
        self.discover = Some(Box::new(discover));
        self
    }

    /// Redirects writes to a different directory, keeping the discovery
    /// strategy. Used when the environment overrides the run directory.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Asks the discovery strategy for a resume checkpoint. The default
    /// strategy finds nothing; absence is a normal outcome.
    pub fn find_resume_checkpoint(&self) -> Option<PathBuf> {
        self.discover.as_ref().and_then(|f| f())
    }

    /// Discovery first, then the explicitly configured path.
    pub fn resolve_resume(&self, configured: Option<&Path>) -> Option<PathBuf> {
        self.find_resume_checkpoint()
            .or_else(|| configured.map(Path::to_path_buf))
    }

    /// Derives the sibling EMA snapshot for `(step, rate)` next to a
    /// resolved main checkpoint and checks that it exists. Absent main
    /// checkpoint or missing file both mean "no EMA snapshot", never an
    /// error: the caller falls back to a fresh copy of master.
    pub fn find_ema_checkpoint(
        &self,
        main_checkpoint: Option<&Path>,
        step: usize,
        rate_token: &str,
    ) -> Option<PathBuf> {
        let main = main_checkpoint?;
        let dir = main.parent().filter(|p| !p.as_os_str().is_empty());
        let path = dir
            .unwrap_or_else(|| Path::new("."))
            .join(encode_ema(rate_token, step));
        path.exists().then_some(path)
    }

    /// Persists a parameter set under `filename` in the run directory.
    ///
    /// Writes to a temporary sibling and renames it into place, so a
    /// failure never leaves a partial file visible under the canonical
    /// name.
    pub fn save(&self, filename: &str, params: &ParamSet) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(filename);

        let buffers: Vec<(String, Vec<usize>, Vec<u8>)> = params
            .iter()
            .map(|(name, tensor)| {
                let (values, _) = tensor.as_standard_layout().into_owned().into_raw_vec_and_offset();
                let bytes = bytemuck::cast_slice::<f32, u8>(&values).to_vec();
                (name.to_string(), tensor.shape().to_vec(), bytes)
            })
            .collect();
        let views: Vec<(&str, TensorView<'_>)> = buffers
            .iter()
            .map(|(name, shape, bytes)| {
                let view = TensorView::new(Dtype::F32, shape.clone(), bytes).map_err(|e| {
                    TrainError::BadSnapshot {
                        path: path.clone(),
                        reason: e.to_string(),
                    }
                })?;
                Ok((name.as_str(), view))
            })
            .collect::<Result<_>>()?;

        let data = safetensors::serialize(views, &None).map_err(|e| TrainError::BadSnapshot {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let tmp = self.dir.join(format!(".{filename}.tmp"));
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;

        log::info!("saved snapshot {}", path.display());
        Ok(path)
    }

    /// Loads a parameter set from a snapshot file.
    pub fn load(path: &Path) -> Result<ParamSet> {
        let buf = fs::read(path)?;
        let archive = SafeTensors::deserialize(&buf).map_err(|e| TrainError::BadSnapshot {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut params = ParamSet::new();
        for (name, view) in archive.tensors() {
            if view.dtype() != Dtype::F32 {
                return Err(TrainError::BadSnapshot {
                    path: path.to_path_buf(),
                    reason: format!("tensor {name} has dtype {:?}, expected F32", view.dtype()),
                });
            }
            let values: Vec<f32> = bytemuck::pod_collect_to_vec(view.data());
            let tensor = ArrayD::from_shape_vec(IxDyn(view.shape()), values).map_err(|e| {
                TrainError::BadSnapshot {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
            })?;
            params.push(name, tensor);
        }
        Ok(params)
    }
}
