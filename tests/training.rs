mod support;

use animegan::backend::CpuTrainBackend;
use animegan::checkpoint::CheckpointDir;
use animegan::config::TrainConfig;
use animegan::data::{DataLoader, ImageFolder};
use animegan::output;
use animegan::train::Sagan;
use support::images::write_faces;
use tempfile::tempdir;

fn tiny_config(root: &std::path::Path) -> TrainConfig {
    TrainConfig {
        dataset_dir: root.join("faces"),
        total_steps: 4,
        batch_size: 2,
        imsize: 32,
        nz: 8,
        ngf: 8,
        ndf: 8,
        log_step: 1,
        save_epoch: 1,
        inst_noise_sigma_iters: 3,
        model_path: Some(root.join("models")),
        sample_path: Some(root.join("samples")),
        ..TrainConfig::default()
    }
}

fn loader_for(config: &TrainConfig) -> DataLoader {
    let folder = ImageFolder::open(&config.dataset_dir, config.imsize).unwrap();
    DataLoader::new(folder, config.batch_size, config.seed).unwrap()
}

#[test]
fn trains_saves_and_resumes() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    write_faces(&config.dataset_dir, 4, 40, 32);
    let loader = loader_for(&config);
    assert_eq!(loader.steps_per_epoch(), 2);

    let mut sagan = Sagan::<CpuTrainBackend>::new(config.clone(), Default::default()).unwrap();
    sagan.train(&loader).unwrap();

    let history = sagan.history();
    assert_eq!(history.epochs, vec![1, 2]);
    assert!(history.d_loss.iter().all(|loss| loss.is_finite()));

    let samples = dir.path().join("samples");
    for epoch in 1..=2 {
        let grid = image::open(samples.join(format!("Epoch {epoch}.png"))).unwrap();
        // Two 32px tiles in one row with 2px padding.
        assert_eq!((grid.width(), grid.height()), (70, 36));
    }

    let checkpoints = CheckpointDir::new(dir.path().join("models"));
    assert!(checkpoints.exists(1));
    assert!(checkpoints.exists(2));
    assert_eq!(checkpoints.latest_epoch(), Some(2));
    assert!(checkpoints.generator_optim_path(2).with_extension("mpk").is_file());
    let meta = checkpoints.load_meta(2).unwrap();
    assert_eq!(meta.history.len(), 2);

    let mut resumed_config = config;
    resumed_config.pretrained_model = Some(1);
    resumed_config.total_steps = 6;
    let mut resumed = Sagan::<CpuTrainBackend>::new(resumed_config, Default::default()).unwrap();
    assert_eq!(resumed.start_epoch(), 1);
    assert_eq!(resumed.history().epochs, vec![1]);
    resumed.train(&loader).unwrap();
    assert_eq!(resumed.history().epochs, vec![1, 2, 3]);
    assert_eq!(checkpoints.latest_epoch(), Some(3));

    let plot = dir.path().join("plots").join("losses.png");
    output::plot_history(resumed.history(), &plot).unwrap();
    assert!(plot.is_file());
}

#[test]
fn sparse_logging_leaves_history_empty_but_still_samples() {
    let dir = tempdir().unwrap();
    let mut config = tiny_config(dir.path());
    config.total_steps = 2;
    config.log_step = 10;
    config.save_epoch = 5;
    write_faces(&config.dataset_dir, 3, 32, 32);
    let loader = loader_for(&config);

    let mut sagan = Sagan::<CpuTrainBackend>::new(config, Default::default()).unwrap();
    sagan.train(&loader).unwrap();

    assert!(sagan.history().is_empty());
    assert!(dir.path().join("samples").join("Epoch 1.png").is_file());
    let checkpoints = CheckpointDir::new(dir.path().join("models"));
    assert_eq!(checkpoints.latest_epoch(), None);
}
