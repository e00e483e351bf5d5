use std::path::{Path, PathBuf};

use serde::de::Error as SerdeDeError;
use tracing::info;

use crate::{app_dirs, backend};

use super::types::{ConfigError, TrainConfig, map_app_dir_error};

/// Default filename used to store the training configuration.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Resolve the default configuration file path inside the app root.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let dir = app_dirs::app_root_dir().map_err(map_app_dir_error)?;
    Ok(dir.join(CONFIG_FILE_NAME))
}

/// Load the configuration, returning defaults when no file exists.
///
/// An explicit `path` must exist. Without one, the app-root `config.toml` is
/// used when present. The `ANIMEGAN_BACKEND` variable overrides the backend in
/// either case, and the result is validated before it is returned.
pub fn load_or_default(path: Option<&Path>) -> Result<TrainConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_from(path)?,
        None => {
            let default_path = config_path()?;
            if default_path.exists() {
                load_from(&default_path)?
            } else {
                info!(
                    "No config at {}; using built-in defaults",
                    default_path.display()
                );
                TrainConfig::default()
            }
        }
    };
    if let Some(kind) = backend::backend_override() {
        config.backend = kind;
    }
    config.validate()?;
    Ok(config)
}

/// Parse a TOML config file.
pub fn load_from(path: &Path) -> Result<TrainConfig, ConfigError> {
    let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8(bytes).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source: SerdeDeError::custom(source),
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })
}

/// Save configuration to a specific path, creating parent directories as needed.
pub fn save_to_path(config: &TrainConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    let text = toml::to_string_pretty(config).map_err(|source| ConfigError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, text).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use tempfile::tempdir;

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "batch_size = 16\nimsize = 32\nbackend = \"cpu\"\npretrained_model = 10\n",
        )
        .unwrap();

        let config = load_from(&path).unwrap();
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.imsize, 32);
        assert_eq!(config.backend, BackendKind::Cpu);
        assert_eq!(config.pretrained_model, Some(10));
        assert_eq!(config.nz, TrainConfig::default().nz);
        assert_eq!(config.d_lr, TrainConfig::default().d_lr);
    }

    #[test]
    fn saved_config_loads_back_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let config = TrainConfig {
            total_steps: 500,
            model_path: Some(dir.path().join("ckpt")),
            inst_noise_sigma: 0.25,
            ..TrainConfig::default()
        };
        save_to_path(&config, &path).unwrap();
        assert_eq!(load_from(&path).unwrap(), config);
    }

    #[test]
    fn malformed_toml_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "batch_size = \"many\"").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseToml { .. }));
        assert!(err.to_string().contains(CONFIG_FILE_NAME));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = load_or_default(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn invalid_values_fail_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "imsize = 100\n").unwrap();
        let err = load_or_default(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
