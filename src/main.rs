//! Trains the SAGAN on an image folder.

use std::path::PathBuf;

use animegan::backend::{BackendKind, BackendTask, dispatch};
use animegan::config::{self, TrainConfig};
use animegan::data::{DataLoader, ImageFolder};
use animegan::logging;
use animegan::train::Sagan;
use burn::tensor::backend::AutodiffBackend;
use tracing::error;

fn main() {
    if let Err(err) = run() {
        error!("{err}");
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = logging::init("train") {
        eprintln!("Logging disabled: {err}");
    }

    let mut config =
        config::load_or_default(options.config.as_deref()).map_err(|err| err.to_string())?;
    options.apply(&mut config);
    config.validate().map_err(|err| err.to_string())?;

    if let Some(path) = &options.write_config {
        config::save_to_path(&config, path).map_err(|err| err.to_string())?;
        println!("Wrote config to {}", path.display());
        return Ok(());
    }

    let folder =
        ImageFolder::open(&config.dataset_dir, config.imsize).map_err(|err| err.to_string())?;
    let loader =
        DataLoader::new(folder, config.batch_size, config.seed).map_err(|err| err.to_string())?;
    let backend = config.backend;
    dispatch(backend, TrainTask { config, loader })
}

struct TrainTask {
    config: TrainConfig,
    loader: DataLoader,
}

impl BackendTask for TrainTask {
    type Output = Result<(), String>;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Self::Output {
        let mut sagan = Sagan::<B>::new(self.config, device).map_err(|err| err.to_string())?;
        sagan.train(&self.loader).map_err(|err| err.to_string())
    }
}

#[derive(Debug, Default)]
struct CliOptions {
    config: Option<PathBuf>,
    write_config: Option<PathBuf>,
    dataset_dir: Option<PathBuf>,
    total_steps: Option<usize>,
    batch_size: Option<usize>,
    imsize: Option<usize>,
    pretrained_model: Option<usize>,
    model_path: Option<PathBuf>,
    sample_path: Option<PathBuf>,
    backend: Option<BackendKind>,
}

impl CliOptions {
    fn apply(&self, config: &mut TrainConfig) {
        if let Some(dir) = &self.dataset_dir {
            config.dataset_dir = dir.clone();
        }
        if let Some(steps) = self.total_steps {
            config.total_steps = steps;
        }
        if let Some(batch) = self.batch_size {
            config.batch_size = batch;
        }
        if let Some(imsize) = self.imsize {
            config.imsize = imsize;
        }
        if self.pretrained_model.is_some() {
            config.pretrained_model = self.pretrained_model;
        }
        if self.model_path.is_some() {
            config.model_path = self.model_path.clone();
        }
        if self.sample_path.is_some() {
            config.sample_path = self.sample_path.clone();
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
    }
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut idx = 0usize;
    while idx < args.len() {
        let flag = args[idx].as_str();
        if matches!(flag, "-h" | "--help") {
            return Err(help_text());
        }
        idx += 1;
        let value = args
            .get(idx)
            .ok_or_else(|| format!("{flag} requires a value\n\n{}", help_text()))?;
        match flag {
            "--config" => options.config = Some(PathBuf::from(value)),
            "--write-config" => options.write_config = Some(PathBuf::from(value)),
            "--dataset" => options.dataset_dir = Some(PathBuf::from(value)),
            "--total-steps" => options.total_steps = Some(parse_number(flag, value)?),
            "--batch" => options.batch_size = Some(parse_number(flag, value)?),
            "--imsize" => options.imsize = Some(parse_number(flag, value)?),
            "--pretrained" => options.pretrained_model = Some(parse_number(flag, value)?),
            "--model-path" => options.model_path = Some(PathBuf::from(value)),
            "--sample-path" => options.sample_path = Some(PathBuf::from(value)),
            "--backend" => {
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

fn parse_number(flag: &str, value: &str) -> Result<usize, String> {
    value
        .parse::<usize>()
        .map_err(|_| format!("Invalid {flag} value: {value}"))
}

fn help_text() -> String {
    [
        "animegan",
        "",
        "Trains a self-attention GAN on a folder of images.",
        "",
        "Usage:",
        "  animegan [--config config.toml] [--dataset <dir>] [options]",
        "",
        "Options:",
        "  --config <file>        TOML config (default: <app root>/config.toml if present)",
        "  --write-config <file>  Write the effective config and exit",
        "  --dataset <dir>        Image folder, scanned recursively",
        "  --total-steps <n>      Training steps (default 100000)",
        "  --batch <n>            Batch size (default 64)",
        "  --imsize <n>           Image side, power of two >= 32 (default 64)",
        "  --pretrained <epoch>   Resume from the checkpoint saved at <epoch>",
        "  --model-path <dir>     Checkpoint directory",
        "  --sample-path <dir>    Directory for per-epoch sample grids",
        "  --backend <name>       wgpu, cpu or cuda (default wgpu; env ANIMEGAN_BACKEND)",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn flags_override_config_values() {
        let options = parse_args(args(&[
            "--dataset",
            "faces",
            "--total-steps",
            "500",
            "--pretrained",
            "5",
            "--backend",
            "cpu",
        ]))
        .unwrap();
        let mut config = TrainConfig::default();
        options.apply(&mut config);
        assert_eq!(config.dataset_dir, PathBuf::from("faces"));
        assert_eq!(config.total_steps, 500);
        assert_eq!(config.pretrained_model, Some(5));
        assert_eq!(config.backend, BackendKind::Cpu);
        assert_eq!(config.batch_size, TrainConfig::default().batch_size);
    }

    #[test]
    fn bad_arguments_report_errors() {
        assert!(parse_args(args(&["--batch", "many"])).unwrap_err().contains("Invalid --batch"));
        assert!(parse_args(args(&["--dataset"])).unwrap_err().contains("requires a value"));
        assert!(parse_args(args(&["--bogus", "1"])).unwrap_err().contains("Unknown argument"));
        assert!(parse_args(args(&["--help"])).unwrap_err().starts_with("animegan"));
    }
}
