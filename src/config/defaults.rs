use std::path::PathBuf;

use crate::backend::BackendKind;

pub(super) fn default_dataset_dir() -> PathBuf {
    PathBuf::from("data")
}

pub(super) fn default_total_steps() -> usize {
    100_000
}

pub(super) fn default_one() -> usize {
    1
}

pub(super) fn default_batch_size() -> usize {
    64
}

pub(super) fn default_imsize() -> usize {
    64
}

pub(super) fn default_nz() -> usize {
    128
}

pub(super) fn default_channels() -> usize {
    64
}

pub(super) fn default_g_lr() -> f64 {
    1e-4
}

pub(super) fn default_d_lr() -> f64 {
    4e-4
}

pub(super) fn default_beta1() -> f32 {
    0.0
}

pub(super) fn default_beta2() -> f32 {
    0.9
}

pub(super) fn default_inst_noise_sigma() -> f32 {
    0.1
}

pub(super) fn default_inst_noise_sigma_iters() -> usize {
    2_000
}

pub(super) fn default_log_step() -> usize {
    10
}

pub(super) fn default_save_epoch() -> usize {
    5
}

pub(super) fn default_seed() -> u64 {
    42
}

pub(super) fn default_backend() -> BackendKind {
    BackendKind::Wgpu
}
