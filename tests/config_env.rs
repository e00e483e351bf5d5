mod support;

use animegan::backend::{BackendKind, backend_override};
use animegan::config::{self, TrainConfig};
use support::animegan_env::AnimeganEnvGuard;
use tempfile::tempdir;

#[test]
fn default_paths_live_under_animegan_home() {
    let dir = tempdir().unwrap();
    let _guard = AnimeganEnvGuard::set_home(dir.path().to_path_buf());

    let config = config::load_or_default(None).unwrap();
    assert_eq!(config, TrainConfig::default());
    let root = dir.path().join(".animegan");
    assert_eq!(config.resolved_model_path().unwrap(), root.join("checkpoints"));
    assert_eq!(config.resolved_sample_path().unwrap(), root.join("samples"));
    assert_eq!(config::config_path().unwrap(), root.join("config.toml"));
}

#[test]
fn saved_config_is_picked_up_and_env_backend_wins() {
    let dir = tempdir().unwrap();
    let guard = AnimeganEnvGuard::set_home(dir.path().to_path_buf());

    let mut config = TrainConfig::default();
    config.batch_size = 16;
    config.backend = BackendKind::Wgpu;
    config::save_to_path(&config, &config::config_path().unwrap()).unwrap();

    guard.set_backend("cpu");
    let loaded = config::load_or_default(None).unwrap();
    assert_eq!(loaded.batch_size, 16);
    assert_eq!(loaded.backend, BackendKind::Cpu);
}

#[test]
fn unknown_env_backend_falls_back_to_wgpu() {
    let dir = tempdir().unwrap();
    let guard = AnimeganEnvGuard::set_home(dir.path().to_path_buf());
    assert_eq!(backend_override(), None);

    guard.set_backend("   ");
    assert_eq!(backend_override(), None);

    guard.set_backend("tpu");
    assert_eq!(backend_override(), Some(BackendKind::Wgpu));

    let mut config = TrainConfig::default();
    config.backend = BackendKind::Cpu;
    config::save_to_path(&config, &config::config_path().unwrap()).unwrap();
    assert_eq!(config::load_or_default(None).unwrap().backend, BackendKind::Wgpu);
}
