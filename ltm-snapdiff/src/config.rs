use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tmsh_diff_core::Dialect;

use crate::classify::ClassifierSettings;
use crate::registry::DeviceRef;
use crate::section::default_dialect;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "LTM_SNAPDIFF_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file; the platform data directory when unset.
    pub path: Option<PathBuf>,
    /// Age after which snapshots are listed as expired.
    pub retention_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    /// Directory read by the file-based fetcher.
    pub directory: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            directory: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub unordered_fields: Vec<String>,
    pub joined_fields: BTreeMap<String, String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        let dialect = default_dialect();
        Self {
            unordered_fields: dialect.unordered_fields.into_iter().collect(),
            joined_fields: dialect.joined_fields,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    pub ignore_fields: Vec<String>,
}

/// Tool configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub fetch: FetchConfig,
    pub parser: ParserConfig,
    pub diff: DiffConfig,
    pub classifier: ClassifierSettings,
    #[serde(rename = "device")]
    pub devices: Vec<DeviceRef>,
}

impl AppConfig {
    pub fn dialect(&self) -> Dialect {
        Dialect {
            unordered_fields: self.parser.unordered_fields.iter().cloned().collect(),
            joined_fields: self.parser.joined_fields.clone(),
        }
    }
}

/// Errors returned when loading config files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Load configuration from a TOML file. Missing keys take their defaults.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&raw, path.display().to_string())
}

/// Built-in configuration.
pub fn default_config() -> AppConfig {
    let embedded = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml"));
    parse_config(embedded, "embedded config".to_string()).unwrap_or_default()
}

/// Pick the configuration to use and describe where it came from.
///
/// Order: explicit path, `LTM_SNAPDIFF_CONFIG`, `config.toml` in the
/// platform config directory, built-in defaults.
pub fn resolve_config(explicit: Option<&Path>) -> Result<(AppConfig, String), ConfigError> {
    if let Some(path) = explicit {
        return Ok((load_config(path)?, path.display().to_string()));
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV).map(PathBuf::from) {
        return Ok((load_config(&path)?, path.display().to_string()));
    }
    if let Some(path) = user_config_path().filter(|p| p.is_file()) {
        return Ok((load_config(&path)?, path.display().to_string()));
    }
    Ok((default_config(), "built-in defaults".to_string()))
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "ltm-snapdiff").map(|dirs| dirs.config_dir().join("config.toml"))
}

fn parse_config(raw: &str, path: String) -> Result<AppConfig, ConfigError> {
    toml::from_str(raw).map_err(|source| ConfigError::Parse { path, source })
}
