use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs;
use crate::backend::BackendKind;

use super::defaults::{
    default_backend, default_batch_size, default_beta1, default_beta2, default_channels,
    default_d_lr, default_dataset_dir, default_g_lr, default_imsize, default_inst_noise_sigma,
    default_inst_noise_sigma_iters, default_log_step, default_nz, default_one, default_save_epoch,
    default_seed, default_total_steps,
};

/// Smallest image side the generator/discriminator stacks can be built for.
pub const MIN_IMSIZE: usize = 32;

/// Hyper-parameters and paths for one SAGAN training run.
///
/// Config keys (TOML) match the field names; every key is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Root of the training image folder, scanned recursively.
    #[serde(default = "default_dataset_dir")]
    pub dataset_dir: PathBuf,
    /// Total number of training steps; epochs derive from the dataset size.
    #[serde(default = "default_total_steps")]
    pub total_steps: usize,
    /// Discriminator passes per step; only the last pass's gradients are applied.
    #[serde(default = "default_one")]
    pub d_iters: usize,
    /// Generator passes per step; only the last pass's gradients are applied.
    #[serde(default = "default_one")]
    pub g_iters: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Square image side in pixels.
    #[serde(default = "default_imsize")]
    pub imsize: usize,
    /// Latent vector length.
    #[serde(default = "default_nz")]
    pub nz: usize,
    /// Generator base channel width.
    #[serde(default = "default_channels")]
    pub ngf: usize,
    /// Discriminator base channel width.
    #[serde(default = "default_channels")]
    pub ndf: usize,
    #[serde(default = "default_g_lr")]
    pub g_lr: f64,
    #[serde(default = "default_d_lr")]
    pub d_lr: f64,
    #[serde(default = "default_beta1")]
    pub beta1: f32,
    #[serde(default = "default_beta2")]
    pub beta2: f32,
    /// Starting standard deviation of the instance noise.
    #[serde(default = "default_inst_noise_sigma")]
    pub inst_noise_sigma: f32,
    /// Steps over which the instance noise anneals linearly to zero.
    #[serde(default = "default_inst_noise_sigma_iters")]
    pub inst_noise_sigma_iters: usize,
    /// Record and print metrics every this many steps.
    #[serde(default = "default_log_step")]
    pub log_step: usize,
    /// Write a checkpoint every this many epochs.
    #[serde(default = "default_save_epoch")]
    pub save_epoch: usize,
    /// Checkpoint directory; defaults to `<app root>/checkpoints`.
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    /// Sample grid directory; defaults to `<app root>/samples`.
    #[serde(default)]
    pub sample_path: Option<PathBuf>,
    /// Epoch of a saved checkpoint to resume from.
    #[serde(default)]
    pub pretrained_model: Option<usize>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dataset_dir: default_dataset_dir(),
            total_steps: default_total_steps(),
            d_iters: default_one(),
            g_iters: default_one(),
            batch_size: default_batch_size(),
            imsize: default_imsize(),
            nz: default_nz(),
            ngf: default_channels(),
            ndf: default_channels(),
            g_lr: default_g_lr(),
            d_lr: default_d_lr(),
            beta1: default_beta1(),
            beta2: default_beta2(),
            inst_noise_sigma: default_inst_noise_sigma(),
            inst_noise_sigma_iters: default_inst_noise_sigma_iters(),
            log_step: default_log_step(),
            save_epoch: default_save_epoch(),
            model_path: None,
            sample_path: None,
            pretrained_model: None,
            seed: default_seed(),
            backend: default_backend(),
        }
    }
}

impl TrainConfig {
    /// Reject settings the models or the training loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("total_steps", self.total_steps),
            ("d_iters", self.d_iters),
            ("g_iters", self.g_iters),
            ("batch_size", self.batch_size),
            ("nz", self.nz),
            ("log_step", self.log_step),
            ("save_epoch", self.save_epoch),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(invalid(format!("{name} must be greater than 0")));
            }
        }
        if !self.imsize.is_power_of_two() || self.imsize < MIN_IMSIZE {
            return Err(invalid(format!(
                "imsize must be a power of two of at least {MIN_IMSIZE}, got {}",
                self.imsize
            )));
        }
        for (name, value) in [("ngf", self.ngf), ("ndf", self.ndf)] {
            if value == 0 || value % 8 != 0 {
                return Err(invalid(format!(
                    "{name} must be a positive multiple of 8, got {value}"
                )));
            }
        }
        for (name, value) in [("g_lr", self.g_lr), ("d_lr", self.d_lr)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(format!("{name} must be positive, got {value}")));
            }
        }
        for (name, value) in [("beta1", self.beta1), ("beta2", self.beta2)] {
            if !(0.0..1.0).contains(&value) {
                return Err(invalid(format!("{name} must lie in [0, 1), got {value}")));
            }
        }
        if !(self.inst_noise_sigma.is_finite() && self.inst_noise_sigma >= 0.0) {
            return Err(invalid(format!(
                "inst_noise_sigma must be non-negative, got {}",
                self.inst_noise_sigma
            )));
        }
        Ok(())
    }

    /// Checkpoint directory, falling back to the app root.
    pub fn resolved_model_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.model_path {
            Some(path) => Ok(path.clone()),
            None => app_dirs::checkpoints_dir().map_err(map_app_dir_error),
        }
    }

    /// Sample grid directory, falling back to the app root.
    pub fn resolved_sample_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.sample_path {
            Some(path) => Ok(path.clone()),
            None => app_dirs::samples_dir().map_err(map_app_dir_error),
        }
    }

    /// Number of whole epochs that fit into `total_steps`.
    pub fn epochs(&self, steps_per_epoch: usize) -> usize {
        if steps_per_epoch == 0 {
            return 0;
        }
        self.total_steps / steps_per_epoch
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid { message }
}

pub(super) fn map_app_dir_error(error: app_dirs::AppDirError) -> ConfigError {
    match error {
        app_dirs::AppDirError::NoBaseDir => ConfigError::NoConfigDir,
        app_dirs::AppDirError::CreateDir { path, source } => ConfigError::CreateDir { path, source },
    }
}

/// Errors that can occur while reading, writing or validating the config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No application directory could be resolved.
    #[error("No suitable directory available for config and run artifacts")]
    NoConfigDir,
    /// Failed to create a directory.
    #[error("Unable to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to read a config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to write a config file.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Config text is not valid TOML for [`TrainConfig`].
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config to TOML at {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
    /// A value is out of range.
    #[error("Invalid training config: {message}")]
    Invalid { message: String },
}
