use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;
use tracing::debug;

use crate::core::config::data::{path_display, Config};

fn display_paths(paths: &[PathBuf]) -> String {
    paths.iter().map(path_display).collect::<Vec<_>>().join(", ")
}

/// Errors that can occur when loading configuration from disk. All of them
/// are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found (looked in {})", display_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },

    #[error("Failed to read config at {}: {source}", path_display(.path))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config at {}: {message}", path_display(.path))]
    Parse { path: PathBuf, message: String },

    #[error("Invalid config at {}: {message}", path_display(.path))]
    Invalid { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

impl Config {
    pub fn parse_str(contents: &str, format: ConfigFormat) -> Result<Config, String> {
        match format {
            ConfigFormat::Toml => toml::from_str(contents).map_err(|err| err.to_string()),
            ConfigFormat::Json => serde_json::from_str(contents).map_err(|err| err.to_string()),
        }
    }

    pub fn load_from_path(config_path: &Path) -> Result<Config, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::NotFound {
                searched: vec![config_path.to_path_buf()],
            });
        }

        let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        let config = Self::parse_str(&contents, ConfigFormat::from_path(config_path)).map_err(
            |message| ConfigError::Parse {
                path: config_path.to_path_buf(),
                message,
            },
        )?;

        config
            .options
            .validate()
            .map_err(|err| ConfigError::Invalid {
                path: config_path.to_path_buf(),
                message: err.to_string(),
            })?;

        debug!(path = %path_display(config_path), models = config.models.len(), "Loaded config");
        Ok(config)
    }

    /// Candidate locations, in lookup order, when no explicit path is given.
    pub fn candidate_paths(working_dir: &Path) -> Vec<PathBuf> {
        let mut candidates = vec![
            working_dir.join("config.toml"),
            working_dir.join("config.json"),
        ];
        if let Some(dirs) = ProjectDirs::from("", "", "ollamarama") {
            candidates.push(dirs.config_dir().join("config.toml"));
            candidates.push(dirs.config_dir().join("config.json"));
        }
        candidates
    }

    /// Picks the config file to load: `explicit` if given, otherwise the first
    /// existing candidate.
    pub fn locate(explicit: Option<&Path>, working_dir: &Path) -> Result<PathBuf, ConfigError> {
        if let Some(path) = explicit {
            return if path.exists() {
                Ok(path.to_path_buf())
            } else {
                Err(ConfigError::NotFound {
                    searched: vec![path.to_path_buf()],
                })
            };
        }

        let candidates = Self::candidate_paths(working_dir);
        candidates
            .iter()
            .find(|path| path.is_file())
            .cloned()
            .ok_or(ConfigError::NotFound {
                searched: candidates,
            })
    }

    pub fn load(explicit: Option<&Path>) -> Result<(Config, PathBuf), ConfigError> {
        let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let path = Self::locate(explicit, &working_dir)?;
        let config = Self::load_from_path(&path)?;
        Ok((config, path))
    }
}
