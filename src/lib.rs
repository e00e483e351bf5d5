//! Self-attention GAN training for anime face generation.
//!
//! The binaries wire these modules together; benchmarks and integration
//! tests use them directly.

/// Application directories under the user's home.
pub mod app_dirs;
/// Runtime backend selection.
pub mod backend;
/// Checkpoint save/restore.
pub mod checkpoint;
/// TOML training configuration.
pub mod config;
/// Image folder dataset and batch loading.
pub mod data;
/// Tracing subscriber setup.
pub mod logging;
/// Hinge adversarial losses.
pub mod loss;
/// Generator, discriminator and their layers.
pub mod model;
/// Latent and instance-noise sampling.
pub mod noise;
/// Sample grids and loss plots.
pub mod output;
/// Training loop.
pub mod train;
