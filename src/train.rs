//! SAGAN training loop.
//!
//! Each step runs `d_iters` discriminator passes on real and detached fake
//! images followed by one Adam step with the gradients of the last pass, then
//! the same for the generator over `g_iters` passes. Instance noise anneals
//! over the steps of each epoch and restarts with the next one. Losses stay on
//! the device except on log steps, every `log_step` steps, where they are
//! read back and averaged per epoch into the history stored with every
//! checkpoint.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use burn::module::{AutodiffModule, Module};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};
use thiserror::Error;
use tracing::{info, warn};

use crate::checkpoint::{CheckpointDir, CheckpointError, CheckpointMeta, EpochStats, TrainingHistory};
use crate::config::{ConfigError, TrainConfig};
use crate::data::{DataError, DataLoader};
use crate::loss::{hinge_dis_fake, hinge_dis_real, hinge_gen};
use crate::model::layers::denorm;
use crate::model::{Discriminator, Generator};
use crate::noise::{LatentSampler, add_instance_noise, instance_noise_sigma};
use crate::output::{self, OutputError};

type GeneratorOptimizer<B> = OptimizerAdaptor<Adam, Generator<B>, B>;
type DiscriminatorOptimizer<B> = OptimizerAdaptor<Adam, Discriminator<B>, B>;

const ADAM_EPSILON: f32 = 1e-8;

/// Errors that stop a training run.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Output(#[from] OutputError),
    #[error("Checkpoint epoch {epoch} was trained with {field} = {saved}, config has {configured}")]
    Mismatch {
        epoch: usize,
        field: &'static str,
        saved: usize,
        configured: usize,
    },
    #[error("Dataset yields no batches")]
    NoBatches,
}

/// Generator, discriminator and their optimizers for one run.
pub struct Sagan<B: AutodiffBackend> {
    config: TrainConfig,
    device: B::Device,
    generator: Generator<B>,
    discriminator: Discriminator<B>,
    g_optim: GeneratorOptimizer<B>,
    d_optim: DiscriminatorOptimizer<B>,
    history: TrainingHistory,
    start_epoch: usize,
    checkpoints: CheckpointDir,
    sample_dir: PathBuf,
    latents: LatentSampler,
}

impl<B: AutodiffBackend> Sagan<B> {
    /// Build fresh models, or restore them when `pretrained_model` is set.
    pub fn new(config: TrainConfig, device: B::Device) -> Result<Self, TrainError> {
        config.validate()?;
        let checkpoints = CheckpointDir::new(config.resolved_model_path()?);
        let sample_dir = config.resolved_sample_path()?;
        B::seed(&device, config.seed);

        let mut generator = Generator::new(config.imsize, config.nz, config.ngf, &device);
        let mut discriminator = Discriminator::new(config.imsize, config.ndf, &device);
        let mut g_optim = adam(&config).init::<B, Generator<B>>();
        let mut d_optim = adam(&config).init::<B, Discriminator<B>>();
        let mut history = TrainingHistory::default();
        let mut start_epoch = 0;

        if let Some(epoch) = config.pretrained_model {
            let meta = checkpoints.load_meta(epoch)?;
            check_architecture(&config, &meta)?;
            generator = checkpoints.load_generator::<B>(&meta, &device)?;
            discriminator = checkpoints.load_discriminator::<B>(&meta, &device)?;
            (g_optim, d_optim) = checkpoints.load_optimizers(
                epoch,
                &generator,
                g_optim,
                &discriminator,
                d_optim,
                &device,
            )?;
            history = meta.history;
            history.truncate_after(epoch);
            start_epoch = epoch;
            info!("Loaded pretrained models (epoch: {epoch})");
        }

        info!("Generator parameters: {}", generator.num_params());
        info!("Discriminator parameters: {}", discriminator.num_params());

        Ok(Self {
            latents: LatentSampler::new(config.seed),
            config,
            device,
            generator,
            discriminator,
            g_optim,
            d_optim,
            history,
            start_epoch,
            checkpoints,
            sample_dir,
        })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    /// Zero-based index of the next epoch to train.
    pub fn start_epoch(&self) -> usize {
        self.start_epoch
    }

    pub fn generator(&self) -> &Generator<B> {
        &self.generator
    }

    pub fn discriminator(&self) -> &Discriminator<B> {
        &self.discriminator
    }

    /// Train until `total_steps` worth of whole epochs have run.
    pub fn train(&mut self, loader: &DataLoader) -> Result<(), TrainError> {
        let steps_per_epoch = loader.steps_per_epoch();
        if steps_per_epoch == 0 {
            return Err(TrainError::NoBatches);
        }
        let epochs = self.config.epochs(steps_per_epoch);
        let fixed_z = self.latents.latents::<B::InnerBackend>(
            self.config.batch_size,
            self.config.nz,
            &self.device,
        );

        info!("Initiating training");
        info!(
            "Epochs: {epochs}, Total Steps: {}, Steps/Epoch: {steps_per_epoch}",
            self.config.total_steps
        );
        if epochs == 0 {
            warn!("total_steps is smaller than one epoch; nothing to train");
        }

        let start = Instant::now();
        for epoch in self.start_epoch..epochs {
            let mut stats = StatsAccumulator::default();
            for (step, batch) in loader.epoch(epoch)?.enumerate() {
                let sigma = self.noise_sigma(step);
                let real = batch.into_tensor::<B>(&self.device);
                let losses = self.train_step(real, sigma);

                if (step + 1) % self.config.log_step == 0 {
                    let losses = losses.values();
                    let (d_gamma1, d_gamma2) = self.discriminator.gammas();
                    let (g_gamma1, g_gamma2) = self.generator.gammas();
                    stats.add(EpochStats {
                        d_loss: losses.d_loss,
                        d_loss_real: losses.d_loss_real,
                        d_loss_fake: losses.d_loss_fake,
                        d_gamma1,
                        d_gamma2,
                        g_loss: losses.g_loss,
                        g_gamma1,
                        g_gamma2,
                    });
                    info!(
                        "Elapsed [{}], Epoch: [{}/{epochs}], Step [{}/{steps_per_epoch}], \
                         g_loss: {:.4}, d_loss: {:.4}, d_loss_real: {:.4}, d_loss_fake: {:.4}",
                        format_elapsed(start.elapsed()),
                        epoch + 1,
                        step + 1,
                        losses.g_loss,
                        losses.d_loss,
                        losses.d_loss_real,
                        losses.d_loss_fake
                    );
                }
            }

            match stats.mean() {
                Some(mean) => {
                    self.history.push(epoch + 1, mean);
                    info!(
                        "Elapsed [{}], Epoch: [{}/{epochs}], ave_g_loss: {:.4}, ave_d_loss: {:.4}, \
                         ave_d_loss_real: {:.4}, ave_d_loss_fake: {:.4}, ave_g_gamma1: {:.4}, \
                         ave_g_gamma2: {:.4}, ave_d_gamma1: {:.4}, ave_d_gamma2: {:.4}",
                        format_elapsed(start.elapsed()),
                        epoch + 1,
                        mean.g_loss,
                        mean.d_loss,
                        mean.d_loss_real,
                        mean.d_loss_fake,
                        mean.g_gamma1,
                        mean.g_gamma2,
                        mean.d_gamma1,
                        mean.d_gamma2
                    );
                }
                None => warn!(
                    "Epoch {} logged no steps (log_step {} > steps per epoch); history unchanged",
                    epoch + 1,
                    self.config.log_step
                ),
            }

            let images = self.generator.valid().forward(fixed_z.clone());
            let grid = output::tensor_grid(images)?;
            output::save_grid(&self.sample_dir.join(format!("Epoch {}.png", epoch + 1)), &grid)?;

            if (epoch + 1) % self.config.save_epoch == 0 {
                self.save_checkpoint(epoch + 1)?;
            }
            self.start_epoch = epoch + 1;
        }
        Ok(())
    }

    /// Instance-noise std at `step` within the current epoch.
    pub fn noise_sigma(&self, step: usize) -> f32 {
        instance_noise_sigma(
            step,
            self.config.inst_noise_sigma,
            self.config.inst_noise_sigma_iters,
        )
    }

    /// One discriminator phase followed by one generator phase.
    pub fn train_step(&mut self, real: Tensor<B, 4>, sigma: f32) -> StepLosses<B::InnerBackend> {
        let batch = real.dims()[0];

        let (mut d_loss_real, mut d_loss_fake) = self.discriminator_losses(&real, sigma);
        for _ in 1..self.config.d_iters {
            (d_loss_real, d_loss_fake) = self.discriminator_losses(&real, sigma);
        }
        let d_loss = d_loss_real.clone().add(d_loss_fake.clone());
        let grads = GradientsParams::from_grads(d_loss.backward(), &self.discriminator);
        self.discriminator = self
            .d_optim
            .step(self.config.d_lr, self.discriminator.clone(), grads);

        let mut g_loss = self.generator_loss(batch, sigma);
        for _ in 1..self.config.g_iters {
            g_loss = self.generator_loss(batch, sigma);
        }
        let grads = GradientsParams::from_grads(g_loss.backward(), &self.generator);
        self.generator = self
            .g_optim
            .step(self.config.g_lr, self.generator.clone(), grads);

        StepLosses {
            d_loss_real: d_loss_real.inner(),
            d_loss_fake: d_loss_fake.inner(),
            g_loss: g_loss.inner(),
        }
    }

    /// Hinge losses of D on noisy real images and noisy detached fakes.
    fn discriminator_losses(&mut self, real: &Tensor<B, 4>, sigma: f32) -> (Tensor<B, 1>, Tensor<B, 1>) {
        let d_out_real = self
            .discriminator
            .forward(add_instance_noise(real.clone(), sigma));
        let z = self.latents.latents::<B>(real.dims()[0], self.config.nz, &self.device);
        let fake = self.generator.forward(z).detach();
        let d_out_fake = self.discriminator.forward(add_instance_noise(fake, sigma));
        (hinge_dis_real(d_out_real), hinge_dis_fake(d_out_fake))
    }

    fn generator_loss(&mut self, batch: usize, sigma: f32) -> Tensor<B, 1> {
        let z = self.latents.latents::<B>(batch, self.config.nz, &self.device);
        let fake = self.generator.forward(z);
        hinge_gen(self.discriminator.forward(add_instance_noise(fake, sigma)))
    }

    /// Write models, optimizer state and history for `epoch`.
    pub fn save_checkpoint(&self, epoch: usize) -> Result<(), TrainError> {
        let meta = CheckpointMeta {
            epoch,
            imsize: self.config.imsize,
            nz: self.config.nz,
            ngf: self.config.ngf,
            ndf: self.config.ndf,
            history: self.history.clone(),
        };
        self.checkpoints.save(
            &meta,
            &self.generator,
            &self.discriminator,
            &self.g_optim,
            &self.d_optim,
        )?;
        info!("Saving models (epoch {epoch})");
        Ok(())
    }

    /// `count` fresh images in `[0, 1]` from the current generator.
    pub fn sample(&mut self, count: usize) -> Tensor<B::InnerBackend, 4> {
        sample_images(&self.generator.valid(), &mut self.latents, count, &self.device)
    }
}

/// Losses of the last pass of each phase, still on the device.
#[derive(Debug, Clone)]
pub struct StepLosses<B: Backend> {
    d_loss_real: Tensor<B, 1>,
    d_loss_fake: Tensor<B, 1>,
    g_loss: Tensor<B, 1>,
}

impl<B: Backend> StepLosses<B> {
    /// Read the losses back to the host.
    pub fn values(self) -> LossValues {
        let d_loss_real = scalar(self.d_loss_real);
        let d_loss_fake = scalar(self.d_loss_fake);
        LossValues {
            d_loss: d_loss_real + d_loss_fake,
            d_loss_real,
            d_loss_fake,
            g_loss: scalar(self.g_loss),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossValues {
    pub d_loss: f32,
    pub d_loss_real: f32,
    pub d_loss_fake: f32,
    pub g_loss: f32,
}

/// Generate `count` images from `generator`, mapped to `[0, 1]`.
pub fn sample_images<B: Backend>(
    generator: &Generator<B>,
    latents: &mut LatentSampler,
    count: usize,
    device: &B::Device,
) -> Tensor<B, 4> {
    let z = latents.latents::<B>(count, generator.nz(), device);
    denorm(generator.forward(z))
}

#[derive(Debug, Default)]
struct StatsAccumulator {
    sum: EpochStats,
    count: usize,
}

impl StatsAccumulator {
    fn add(&mut self, stats: EpochStats) {
        self.sum.d_loss += stats.d_loss;
        self.sum.d_loss_real += stats.d_loss_real;
        self.sum.d_loss_fake += stats.d_loss_fake;
        self.sum.d_gamma1 += stats.d_gamma1;
        self.sum.d_gamma2 += stats.d_gamma2;
        self.sum.g_loss += stats.g_loss;
        self.sum.g_gamma1 += stats.g_gamma1;
        self.sum.g_gamma2 += stats.g_gamma2;
        self.count += 1;
    }

    fn mean(&self) -> Option<EpochStats> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f32;
        Some(EpochStats {
            d_loss: self.sum.d_loss / n,
            d_loss_real: self.sum.d_loss_real / n,
            d_loss_fake: self.sum.d_loss_fake / n,
            d_gamma1: self.sum.d_gamma1 / n,
            d_gamma2: self.sum.d_gamma2 / n,
            g_loss: self.sum.g_loss / n,
            g_gamma1: self.sum.g_gamma1 / n,
            g_gamma2: self.sum.g_gamma2 / n,
        })
    }
}

fn adam(config: &TrainConfig) -> AdamConfig {
    AdamConfig::new()
        .with_beta_1(config.beta1)
        .with_beta_2(config.beta2)
        .with_epsilon(ADAM_EPSILON)
}

fn check_architecture(config: &TrainConfig, meta: &CheckpointMeta) -> Result<(), TrainError> {
    let pairs = [
        ("imsize", meta.imsize, config.imsize),
        ("nz", meta.nz, config.nz),
        ("ngf", meta.ngf, config.ngf),
        ("ndf", meta.ndf, config.ndf),
    ];
    for (field, saved, configured) in pairs {
        if saved != configured {
            return Err(TrainError::Mismatch {
                epoch: meta.epoch,
                field,
                saved,
                configured,
            });
        }
    }
    Ok(())
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f32 {
    tensor.into_scalar().elem::<f32>()
}

/// `H:MM:SS` wall-clock duration.
fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
