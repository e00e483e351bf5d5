//! Checkpoint files for a training run.
//!
//! Epoch `n` is stored as five siblings in the model directory: burnpack
//! weights for both networks, MessagePack optimizer records, and a JSON
//! metadata file carrying the architecture and loss history.
//!
//! Optimizer state is keyed by `ParamId`, and modules rebuilt from burnpack
//! files get fresh ids. Records are therefore written keyed by each
//! parameter's position in module visiting order and mapped back onto the
//! reloaded module's ids.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use burn::module::{AutodiffModule, Module, ParamId, list_param_ids};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Optimizer, SimpleOptimizer};
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder, RecorderError};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn_store::{BurnpackStore, ModuleSnapshot};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::model::{Discriminator, Generator};

const META_SUFFIX: &str = "_sagan.json";

/// Per-epoch averages of the logged training statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    #[serde(default)]
    pub epochs: Vec<usize>,
    pub d_loss: Vec<f32>,
    pub d_loss_real: Vec<f32>,
    pub d_loss_fake: Vec<f32>,
    pub d_gamma1: Vec<f32>,
    pub d_gamma2: Vec<f32>,
    pub g_loss: Vec<f32>,
    pub g_gamma1: Vec<f32>,
    pub g_gamma2: Vec<f32>,
}

/// Mean of each statistic over the logged steps of one epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EpochStats {
    pub d_loss: f32,
    pub d_loss_real: f32,
    pub d_loss_fake: f32,
    pub d_gamma1: f32,
    pub d_gamma2: f32,
    pub g_loss: f32,
    pub g_gamma1: f32,
    pub g_gamma2: f32,
}

impl TrainingHistory {
    pub fn len(&self) -> usize {
        self.d_loss.len()
    }

    pub fn is_empty(&self) -> bool {
        self.d_loss.is_empty()
    }

    pub fn push(&mut self, epoch: usize, stats: EpochStats) {
        self.epochs.push(epoch);
        self.d_loss.push(stats.d_loss);
        self.d_loss_real.push(stats.d_loss_real);
        self.d_loss_fake.push(stats.d_loss_fake);
        self.d_gamma1.push(stats.d_gamma1);
        self.d_gamma2.push(stats.d_gamma2);
        self.g_loss.push(stats.g_loss);
        self.g_gamma1.push(stats.g_gamma1);
        self.g_gamma2.push(stats.g_gamma2);
    }

    /// Statistics recorded for row `index`.
    pub fn row(&self, index: usize) -> Option<(usize, EpochStats)> {
        let epoch = self.epochs.get(index).copied().unwrap_or(index);
        Some((
            epoch,
            EpochStats {
                d_loss: *self.d_loss.get(index)?,
                d_loss_real: *self.d_loss_real.get(index)?,
                d_loss_fake: *self.d_loss_fake.get(index)?,
                d_gamma1: *self.d_gamma1.get(index)?,
                d_gamma2: *self.d_gamma2.get(index)?,
                g_loss: *self.g_loss.get(index)?,
                g_gamma1: *self.g_gamma1.get(index)?,
                g_gamma2: *self.g_gamma2.get(index)?,
            },
        ))
    }

    /// Drop rows recorded after `epoch`, used when resuming from an older save.
    pub fn truncate_after(&mut self, epoch: usize) {
        let keep = (0..self.len())
            .take_while(|idx| self.row(*idx).is_some_and(|(e, _)| e <= epoch))
            .count();
        self.epochs.truncate(keep);
        for series in [
            &mut self.d_loss,
            &mut self.d_loss_real,
            &mut self.d_loss_fake,
            &mut self.d_gamma1,
            &mut self.d_gamma2,
            &mut self.g_loss,
            &mut self.g_gamma1,
            &mut self.g_gamma2,
        ] {
            series.truncate(keep);
        }
    }
}

/// Architecture and history saved next to the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch: usize,
    pub imsize: usize,
    pub nz: usize,
    pub ngf: usize,
    pub ndf: usize,
    #[serde(default)]
    pub history: TrainingHistory,
}

/// Errors raised while reading or writing checkpoints.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Failed to create checkpoint directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid checkpoint metadata {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to store module weights at {path}: {message}")]
    Store { path: PathBuf, message: String },
    #[error("Failed to store optimizer state at {path}: {source}")]
    Record {
        path: PathBuf,
        source: RecorderError,
    },
    #[error("No checkpoint for epoch {epoch} in {dir}")]
    Missing { dir: PathBuf, epoch: usize },
}

/// File layout of checkpoints inside one directory.
#[derive(Debug, Clone)]
pub struct CheckpointDir {
    root: PathBuf,
}

impl CheckpointDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generator_path(&self, epoch: usize) -> PathBuf {
        self.root.join(format!("{epoch}_generator.bpk"))
    }

    pub fn discriminator_path(&self, epoch: usize) -> PathBuf {
        self.root.join(format!("{epoch}_discriminator.bpk"))
    }

    /// Optimizer record path without the `.mpk` extension the recorder adds.
    pub fn generator_optim_path(&self, epoch: usize) -> PathBuf {
        self.root.join(format!("{epoch}_generator_optim"))
    }

    pub fn discriminator_optim_path(&self, epoch: usize) -> PathBuf {
        self.root.join(format!("{epoch}_discriminator_optim"))
    }

    pub fn meta_path(&self, epoch: usize) -> PathBuf {
        self.root.join(format!("{epoch}{META_SUFFIX}"))
    }

    pub fn exists(&self, epoch: usize) -> bool {
        self.meta_path(epoch).is_file()
            && self.generator_path(epoch).is_file()
            && self.discriminator_path(epoch).is_file()
    }

    /// Write every file of epoch `meta.epoch`.
    pub fn save<B, O>(
        &self,
        meta: &CheckpointMeta,
        generator: &Generator<B>,
        discriminator: &Discriminator<B>,
        g_optim: &OptimizerAdaptor<O, Generator<B>, B>,
        d_optim: &OptimizerAdaptor<O, Discriminator<B>, B>,
    ) -> Result<(), CheckpointError>
    where
        B: AutodiffBackend,
        O: SimpleOptimizer<B::InnerBackend>,
    {
        fs::create_dir_all(&self.root).map_err(|source| CheckpointError::CreateDir {
            path: self.root.clone(),
            source,
        })?;
        let epoch = meta.epoch;
        save_module(generator, &self.generator_path(epoch))?;
        save_module(discriminator, &self.discriminator_path(epoch))?;
        save_record::<B, _>(
            state_by_position(generator, g_optim),
            self.generator_optim_path(epoch),
        )?;
        save_record::<B, _>(
            state_by_position(discriminator, d_optim),
            self.discriminator_optim_path(epoch),
        )?;
        self.save_meta(meta)?;
        info!("Saved checkpoint for epoch {epoch} to {}", self.root.display());
        Ok(())
    }

    pub fn save_meta(&self, meta: &CheckpointMeta) -> Result<(), CheckpointError> {
        let path = self.meta_path(meta.epoch);
        let json = serde_json::to_string_pretty(meta).map_err(|source| CheckpointError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(|source| CheckpointError::Write { path, source })
    }

    pub fn load_meta(&self, epoch: usize) -> Result<CheckpointMeta, CheckpointError> {
        let path = self.meta_path(epoch);
        if !path.is_file() {
            return Err(CheckpointError::Missing {
                dir: self.root.clone(),
                epoch,
            });
        }
        let bytes = fs::read(&path).map_err(|source| CheckpointError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| CheckpointError::Json { path, source })
    }

    /// Build a generator shaped by `meta` and load its weights.
    pub fn load_generator<B: Backend>(
        &self,
        meta: &CheckpointMeta,
        device: &B::Device,
    ) -> Result<Generator<B>, CheckpointError> {
        let mut generator = Generator::new(meta.imsize, meta.nz, meta.ngf, device);
        load_module(&mut generator, &self.generator_path(meta.epoch))?;
        Ok(generator)
    }

    pub fn load_discriminator<B: Backend>(
        &self,
        meta: &CheckpointMeta,
        device: &B::Device,
    ) -> Result<Discriminator<B>, CheckpointError> {
        let mut discriminator = Discriminator::new(meta.imsize, meta.ndf, device);
        load_module(&mut discriminator, &self.discriminator_path(meta.epoch))?;
        Ok(discriminator)
    }

    /// Restore both optimizers onto the reloaded `generator` and
    /// `discriminator`; missing records leave them untouched.
    pub fn load_optimizers<B, O>(
        &self,
        epoch: usize,
        generator: &Generator<B>,
        g_optim: OptimizerAdaptor<O, Generator<B>, B>,
        discriminator: &Discriminator<B>,
        d_optim: OptimizerAdaptor<O, Discriminator<B>, B>,
        device: &B::Device,
    ) -> Result<
        (
            OptimizerAdaptor<O, Generator<B>, B>,
            OptimizerAdaptor<O, Discriminator<B>, B>,
        ),
        CheckpointError,
    >
    where
        B: AutodiffBackend,
        O: SimpleOptimizer<B::InnerBackend>,
    {
        let path = self.generator_optim_path(epoch);
        let g_optim = match load_record::<B, _>(path.clone(), device)? {
            Some(record) => restore_by_position(generator, g_optim, record, &path),
            None => g_optim,
        };
        let path = self.discriminator_optim_path(epoch);
        let d_optim = match load_record::<B, _>(path.clone(), device)? {
            Some(record) => restore_by_position(discriminator, d_optim, record, &path),
            None => d_optim,
        };
        Ok((g_optim, d_optim))
    }

    /// Highest epoch with a metadata file, if any.
    pub fn latest_epoch(&self) -> Option<usize> {
        latest_epoch(&self.root)
    }
}

/// Highest epoch number among `{n}_sagan.json` files in `dir`.
pub fn latest_epoch(dir: &Path) -> Option<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("Unable to list checkpoints in {}: {err}", dir.display());
            return None;
        }
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_str()?;
            name.strip_suffix(META_SUFFIX)?.parse::<usize>().ok()
        })
        .max()
}

fn save_module<B: Backend, M: Module<B>>(module: &M, path: &Path) -> Result<(), CheckpointError> {
    let mut store = BurnpackStore::from_file(path).overwrite(true);
    module
        .save_into(&mut store)
        .map_err(|err| CheckpointError::Store {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
}

fn load_module<B: Backend, M: Module<B>>(module: &mut M, path: &Path) -> Result<(), CheckpointError> {
    if !path.is_file() {
        return Err(CheckpointError::Read {
            path: path.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
    }
    let mut store = BurnpackStore::from_file(path);
    module
        .load_from(&mut store)
        .map(|_| ())
        .map_err(|err| CheckpointError::Store {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
}

/// `optim` state keyed by the position of each parameter in `module`.
fn state_by_position<B, O, M>(
    module: &M,
    optim: &OptimizerAdaptor<O, M, B>,
) -> <OptimizerAdaptor<O, M, B> as Optimizer<M, B>>::Record
where
    B: AutodiffBackend,
    O: SimpleOptimizer<B::InnerBackend>,
    M: AutodiffModule<B>,
{
    let positions: HashMap<ParamId, u64> = list_param_ids::<M, B>(module).into_iter().zip(0..).collect();
    optim
        .to_record()
        .into_iter()
        .filter_map(|(id, state)| positions.get(&id).map(|pos| (ParamId::from(*pos), state)))
        .collect()
}

/// Load position-keyed `record` into `optim` under the ids of `module`.
fn restore_by_position<B, O, M>(
    module: &M,
    optim: OptimizerAdaptor<O, M, B>,
    record: <OptimizerAdaptor<O, M, B> as Optimizer<M, B>>::Record,
    path: &Path,
) -> OptimizerAdaptor<O, M, B>
where
    B: AutodiffBackend,
    O: SimpleOptimizer<B::InnerBackend>,
    M: AutodiffModule<B>,
{
    let ids = list_param_ids::<M, B>(module);
    let saved = record.len();
    let record: <OptimizerAdaptor<O, M, B> as Optimizer<M, B>>::Record = record
        .into_iter()
        .filter_map(|(position, state)| {
            let position = usize::try_from(position.val()).ok()?;
            ids.get(position).map(|id| (*id, state))
        })
        .collect();
    if record.len() < saved {
        warn!(
            "{} of {saved} optimizer entries in {} match no parameter",
            saved - record.len(),
            path.display()
        );
    }
    optim.load_record(record)
}

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

fn save_record<B: Backend, R: burn::record::Record<B>>(
    record: R,
    path: PathBuf,
) -> Result<(), CheckpointError> {
    Recorder::<B>::record(&recorder(), record, path.clone())
        .map_err(|source| CheckpointError::Record { path, source })
}

fn load_record<B: Backend, R: burn::record::Record<B>>(
    path: PathBuf,
    device: &B::Device,
) -> Result<Option<R>, CheckpointError> {
    if !path.with_extension("mpk").is_file() {
        warn!(
            "Optimizer state {} not found; starting optimizer fresh",
            path.display()
        );
        return Ok(None);
    }
    recorder()
        .load(path.clone(), device)
        .map(Some)
        .map_err(|source| CheckpointError::Record { path, source })
}
