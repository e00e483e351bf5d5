//! Logging setup shared by the training and sampling binaries.
//!
//! Every launch gets its own timestamped file under `<app root>/logs`, named
//! after the tool that wrote it, next to a human-readable stdout stream.
//! Only the newest files of each tool are kept.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::OnceLock,
};

use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

use crate::app_dirs::{self, AppDirError};

/// Log files retained per tool.
const KEEP_PER_TOOL: usize = 10;
/// Filter used when neither `ANIMEGAN_LOG` nor `RUST_LOG` is set.
const DEFAULT_FILTER: &str = "info,wgpu_core=warn,wgpu_hal=warn,naga=warn,cubecl=warn";
/// Overrides `RUST_LOG` for this application only.
pub const LOG_ENV: &str = "ANIMEGAN_LOG";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Log directory unavailable: {0}")]
    Dir(#[from] AppDirError),
    #[error("Failed to access log file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to format log filename time: {0}")]
    FormatTime(#[from] time::error::Format),
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Per-tool log files inside one directory.
#[derive(Debug, Clone)]
struct LogFiles {
    dir: PathBuf,
    tool: String,
}

impl LogFiles {
    fn new(dir: PathBuf, tool: &str) -> Self {
        Self {
            dir,
            tool: tool.to_string(),
        }
    }

    fn prefix(&self) -> String {
        format!("animegan-{}_", self.tool)
    }

    fn file_name(&self, now: OffsetDateTime) -> Result<String, LoggingError> {
        const NAME_FORMAT: &[FormatItem<'_>] =
            format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
        Ok(format!("{}{}.log", self.prefix(), now.format(NAME_FORMAT)?))
    }

    /// Existing files of this tool, oldest first.
    fn existing(&self) -> Result<Vec<PathBuf>, LoggingError> {
        let prefix = self.prefix();
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)
            .map_err(|source| LoggingError::Io {
                path: self.dir.clone(),
                source,
            })?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().is_some_and(|ext| ext == "log")
                    && path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| name.starts_with(&prefix))
            })
            .collect();
        // Timestamped names sort chronologically.
        files.sort();
        Ok(files)
    }

    fn prune(&self, keep: usize) -> Result<usize, LoggingError> {
        let files = self.existing()?;
        let excess = files.len().saturating_sub(keep);
        for path in &files[..excess] {
            fs::remove_file(path).map_err(|source| LoggingError::Io {
                path: path.clone(),
                source,
            })?;
        }
        Ok(excess)
    }
}

/// Install stdout and file logging for `tool` (e.g. `"train"`).
///
/// Later calls are no-ops. Errors leave the process without a subscriber, so
/// callers report them on stderr and carry on.
pub fn init(tool: &str) -> Result<(), LoggingError> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }
    let files = LogFiles::new(app_dirs::logs_dir()?, tool);
    let name = files.file_name(now_local_or_utc())?;
    let path = files.dir.join(&name);
    touch(&path)?;
    files.prune(KEEP_PER_TOOL)?;

    let (file_writer, guard) = tracing_appender::non_blocking(rolling::never(&files.dir, name));
    let timer = build_timer();
    let subscriber = Registry::default()
        .with(build_env_filter())
        .with(
            fmt::layer()
                .with_target(false)
                .with_timer(timer.clone())
                .with_writer(std::io::stdout),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_thread_names(true)
                .with_timer(timer)
                .with_writer(file_writer),
        );
    tracing::subscriber::set_global_default(subscriber)?;
    let _ = LOG_GUARD.set(guard);

    tracing::info!("Logging to {}", path.display());
    Ok(())
}

fn touch(path: &Path) -> Result<(), LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(|_| ())
        .map_err(|source| LoggingError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn build_timer() -> fmt::time::OffsetTime<time::format_description::BorrowedFormatItem<'static>> {
    const DISPLAY_FORMAT: &[FormatItem<'static>] =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    fmt::time::OffsetTime::new(offset, DISPLAY_FORMAT.into())
}

fn now_local_or_utc() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
