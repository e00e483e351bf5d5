//! Writes a grid of generated faces from a saved checkpoint.

use std::path::PathBuf;

use animegan::backend::{BackendKind, BackendTask, dispatch};
use animegan::checkpoint::CheckpointDir;
use animegan::config;
use animegan::logging;
use animegan::noise::LatentSampler;
use animegan::output;
use animegan::train::sample_images;
use burn::tensor::backend::AutodiffBackend;
use tracing::info;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = logging::init("sample") {
        eprintln!("Logging disabled: {err}");
    }
    let config = config::load_or_default(options.config.as_deref()).map_err(|err| err.to_string())?;
    let model_path = match &options.model_path {
        Some(path) => path.clone(),
        None => config.resolved_model_path().map_err(|err| err.to_string())?,
    };
    let checkpoints = CheckpointDir::new(model_path);
    let epoch = match options.epoch {
        Some(epoch) => epoch,
        None => checkpoints.latest_epoch().ok_or_else(|| {
            format!("No checkpoints found in {}", checkpoints.root().display())
        })?,
    };
    let out = match &options.out {
        Some(path) => path.clone(),
        None => config
            .resolved_sample_path()
            .map_err(|err| err.to_string())?
            .join(format!("sample_epoch_{epoch}.png")),
    };
    let task = SampleTask {
        checkpoints,
        epoch,
        count: options.count,
        seed: options.seed.unwrap_or(config.seed),
        out: out.clone(),
    };
    dispatch(options.backend.unwrap_or(config.backend), task)?;
    println!("Wrote {}", out.display());
    Ok(())
}

struct SampleTask {
    checkpoints: CheckpointDir,
    epoch: usize,
    count: usize,
    seed: u64,
    out: PathBuf,
}

impl BackendTask for SampleTask {
    type Output = Result<(), String>;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Self::Output {
        let meta = self
            .checkpoints
            .load_meta(self.epoch)
            .map_err(|err| err.to_string())?;
        let generator = self
            .checkpoints
            .load_generator::<B::InnerBackend>(&meta, &device)
            .map_err(|err| err.to_string())?;
        info!(
            "Sampling {} images from epoch {} ({}px)",
            self.count, meta.epoch, meta.imsize
        );
        let mut latents = LatentSampler::new(self.seed);
        let images = sample_images(&generator, &mut latents, self.count, &device);
        let grid = output::unit_tensor_grid(images).map_err(|err| err.to_string())?;
        output::save_grid(&self.out, &grid).map_err(|err| err.to_string())
    }
}

#[derive(Debug)]
struct CliOptions {
    config: Option<PathBuf>,
    model_path: Option<PathBuf>,
    epoch: Option<usize>,
    count: usize,
    seed: Option<u64>,
    out: Option<PathBuf>,
    backend: Option<BackendKind>,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut options = CliOptions {
        config: None,
        model_path: None,
        epoch: None,
        count: 64,
        seed: None,
        out: None,
        backend: None,
    };
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--config" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--config requires a value".to_string())?;
                options.config = Some(PathBuf::from(value));
            }
            "--model-path" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--model-path requires a value".to_string())?;
                options.model_path = Some(PathBuf::from(value));
            }
            "--epoch" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--epoch requires a value".to_string())?;
                options.epoch = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| format!("Invalid --epoch value: {value}"))?,
                );
            }
            "--count" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--count requires a value".to_string())?;
                options.count = value
                    .parse::<usize>()
                    .ok()
                    .filter(|count| *count > 0)
                    .ok_or_else(|| format!("Invalid --count value: {value}"))?;
            }
            "--seed" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--seed requires a value".to_string())?;
                options.seed = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| format!("Invalid --seed value: {value}"))?,
                );
            }
            "--out" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--out requires a value".to_string())?;
                options.out = Some(PathBuf::from(value));
            }
            "--backend" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--backend requires a value".to_string())?;
                options.backend = Some(
                    BackendKind::parse(value)
                        .ok_or_else(|| format!("Invalid --backend value: {value}"))?,
                );
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }
    Ok(options)
}

fn help_text() -> String {
    [
        "animegan-sample",
        "",
        "Generates a PNG grid (8 per row) from a saved generator.",
        "",
        "Usage:",
        "  animegan-sample [--epoch <n>] [--count 64] [--out grid.png]",
        "",
        "Options:",
        "  --config <file>      TOML config used for default paths and seed",
        "  --model-path <dir>   Checkpoint directory (default from config)",
        "  --epoch <n>          Checkpoint epoch (default: latest)",
        "  --count <n>          Number of images (default 64)",
        "  --seed <n>           Latent seed (default from config)",
        "  --out <file>         Output PNG (default: <sample dir>/sample_epoch_<n>.png)",
        "  --backend <name>     wgpu, cpu or cuda",
    ]
    .join("\n")
}
