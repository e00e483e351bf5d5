//! Where logs, checkpoints and sample grids go by default.
//!
//! Everything lives in one `.animegan` folder under the OS config directory
//! (e.g. `%APPDATA%` on Windows), or under `$ANIMEGAN_HOME` when that is set.

use std::path::{Path, PathBuf};

use directories::BaseDirs;
use thiserror::Error;

pub const APP_DIR_NAME: &str = ".animegan";
/// Replaces the OS config directory as the base of [`APP_DIR_NAME`].
pub const HOME_ENV: &str = "ANIMEGAN_HOME";

#[derive(Debug, Error)]
pub enum AppDirError {
    #[error("Neither {HOME_ENV} nor an OS config directory is available")]
    NoBaseDir,
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Subfolders of the application root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppSubdir {
    Logs,
    Checkpoints,
    Samples,
}

impl AppSubdir {
    pub fn name(self) -> &'static str {
        match self {
            Self::Logs => "logs",
            Self::Checkpoints => "checkpoints",
            Self::Samples => "samples",
        }
    }
}

/// The `.animegan` root, created if missing.
pub fn app_root_dir() -> Result<PathBuf, AppDirError> {
    let base = base_dir(std::env::var(HOME_ENV).ok()).ok_or(AppDirError::NoBaseDir)?;
    create(root_in(&base))
}

pub fn subdir(kind: AppSubdir) -> Result<PathBuf, AppDirError> {
    create(app_root_dir()?.join(kind.name()))
}

pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    subdir(AppSubdir::Logs)
}

pub fn checkpoints_dir() -> Result<PathBuf, AppDirError> {
    subdir(AppSubdir::Checkpoints)
}

pub fn samples_dir() -> Result<PathBuf, AppDirError> {
    subdir(AppSubdir::Samples)
}

fn root_in(base: &Path) -> PathBuf {
    base.join(APP_DIR_NAME)
}

/// `home` wins when it is non-blank; otherwise the OS config directory.
fn base_dir(home: Option<String>) -> Option<PathBuf> {
    match home {
        Some(home) if !home.trim().is_empty() => Some(PathBuf::from(home)),
        _ => BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf()),
    }
}

fn create(path: PathBuf) -> Result<PathBuf, AppDirError> {
    match std::fs::create_dir_all(&path) {
        Ok(()) => Ok(path),
        Err(source) => Err(AppDirError::CreateDir { path, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn home_variable_replaces_os_config_dir() {
        assert_eq!(
            base_dir(Some("/srv/gan".to_string())),
            Some(PathBuf::from("/srv/gan"))
        );
        let fallback = base_dir(Some("   ".to_string()));
        assert_eq!(fallback, base_dir(None));
    }

    #[test]
    fn subfolder_names_are_stable() {
        let names: Vec<_> = [AppSubdir::Logs, AppSubdir::Checkpoints, AppSubdir::Samples]
            .into_iter()
            .map(AppSubdir::name)
            .collect();
        assert_eq!(names, ["logs", "checkpoints", "samples"]);
    }

    #[test]
    fn create_builds_nested_root() {
        let base = tempdir().unwrap();
        let root = create(root_in(base.path()).join("checkpoints")).unwrap();
        assert_eq!(root, base.path().join(".animegan").join("checkpoints"));
        assert!(root.is_dir());
        // Existing directories are fine.
        assert_eq!(create(root.clone()).unwrap(), root);
    }
}
