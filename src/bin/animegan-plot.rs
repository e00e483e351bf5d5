//! Renders the loss history stored in a checkpoint.

use std::path::PathBuf;

use animegan::checkpoint::CheckpointDir;
use animegan::config;
use animegan::output;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    let model_path = match options.model_path {
        Some(path) => path,
        None => config::load_or_default(options.config.as_deref())
            .and_then(|config| config.resolved_model_path())
            .map_err(|err| err.to_string())?,
    };
    let checkpoints = CheckpointDir::new(model_path);
    let epoch = match options.epoch {
        Some(epoch) => epoch,
        None => checkpoints.latest_epoch().ok_or_else(|| {
            format!("No checkpoints found in {}", checkpoints.root().display())
        })?,
    };
    let meta = checkpoints.load_meta(epoch).map_err(|err| err.to_string())?;
    if meta.history.is_empty() {
        return Err(format!("Checkpoint epoch {epoch} has no recorded history"));
    }

    let out_dir = options.out_dir.unwrap_or_else(|| checkpoints.root().to_path_buf());
    let png = out_dir.join(format!("{epoch}_losses.png"));
    let csv = out_dir.join(format!("{epoch}_losses.csv"));
    output::plot_history(&meta.history, &png).map_err(|err| err.to_string())?;
    output::write_history_csv(&meta.history, &csv).map_err(|err| err.to_string())?;
    println!(
        "Plotted {} epochs: {} and {}",
        meta.history.len(),
        png.display(),
        csv.display()
    );
    Ok(())
}

#[derive(Debug, Default)]
struct CliOptions {
    config: Option<PathBuf>,
    model_path: Option<PathBuf>,
    epoch: Option<usize>,
    out_dir: Option<PathBuf>,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
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
            "--out-dir" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--out-dir requires a value".to_string())?;
                options.out_dir = Some(PathBuf::from(value));
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }
    Ok(options)
}

fn help_text() -> String {
    [
        "animegan-plot",
        "",
        "Plots per-epoch losses from a checkpoint and writes them as CSV.",
        "",
        "Usage:",
        "  animegan-plot [--model-path <dir>] [--epoch <n>] [--out-dir <dir>]",
        "",
        "Options:",
        "  --config <file>      TOML config used for the default checkpoint directory",
        "  --model-path <dir>   Checkpoint directory",
        "  --epoch <n>          Checkpoint epoch (default: latest)",
        "  --out-dir <dir>      Where to write <n>_losses.png and <n>_losses.csv",
        "",
        "Plot colours: d loss blue, d real green, d fake red, g loss orange.",
    ]
    .join("\n")
}
