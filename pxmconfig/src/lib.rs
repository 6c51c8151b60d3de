//! # PxMedia Configuration Module
//!
//! This module provides configuration management for the media core:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Typed, read-only settings handed to every component
//!
//! There is no global instance: the host loads a [`Config`] once and passes
//! it (usually behind an `Arc`) to whatever needs it. The core never writes
//! the configuration back.
//!
//! ## Usage
//!
//! ```no_run
//! use pxmconfig::Config;
//!
//! let config = Config::load_config("")?;
//! let max_bytes = config.settings().cache.max_bytes;
//! let cache_dir = config.cache_dir()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Context, Result};
use dirs::home_dir;
use serde_yaml::{Mapping, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::info;

pub mod logging;
pub mod settings;

pub use logging::init_logging;
pub use settings::{
    CacheSettings, DitherSetting, LoggingSettings, MetricSetting, PlaybackSettings,
    QuantizerSettings, ServiceSettings, ServicesSettings, Settings,
};

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("pxmedia.yaml");

const ENV_CONFIG_DIR: &str = "PXMEDIA_CONFIG";
const ENV_PREFIX: &str = "PXMEDIA_CONFIG__";
const CONFIG_DIR_NAME: &str = ".pxmedia";

/// Loaded configuration: the merged YAML tree and its typed view
#[derive(Debug, Clone)]
pub struct Config {
    config_dir: PathBuf,
    path: PathBuf,
    data: Value,
    settings: Settings,
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> PathBuf {
        // 1. Try provided directory
        if !directory.is_empty() {
            return PathBuf::from(directory);
        }

        // 2. Try environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return PathBuf::from(env_path);
        }

        // 3. Try current directory
        if Path::new(CONFIG_DIR_NAME).exists() {
            return PathBuf::from(CONFIG_DIR_NAME);
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config;
            }
        }

        PathBuf::from(CONFIG_DIR_NAME)
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)
                .with_context(|| format!("Cannot create config directory {}", path.display()))?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        fs::read_dir(path)
            .with_context(|| format!("Cannot read config directory {}", path.display()))?;

        Ok(())
    }

    /// Loads the configuration from the specified directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `PXMEDIA_CONFIG` environment variable
    /// 3. `.pxmedia` in the current directory
    /// 4. `.pxmedia` in the user's home directory
    ///
    /// The embedded defaults are merged with `config.yaml` when present, then
    /// `PXMEDIA_CONFIG__SECTION__KEY=value` environment variables are applied.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::find_config_dir(directory);
        Self::validate_config_dir(&config_dir)?;
        info!(config_dir = %config_dir.display(), "Using config directory");

        let path = config_dir.join("config.yaml");
        let external = match fs::read(&path) {
            Ok(data) => {
                info!(config_file = %path.display(), "Loaded config file");
                Some(data)
            }
            Err(_) => {
                info!(config_file = %path.display(), "Config file not found, using default embedded config");
                None
            }
        };

        Self::build(config_dir, path, external.as_deref(), env::vars())
    }

    /// Builds a configuration from a YAML document merged over the defaults
    ///
    /// Environment overrides are not applied; relative paths resolve against
    /// `config_dir`.
    pub fn from_yaml(config_dir: impl Into<PathBuf>, yaml: &str) -> Result<Self> {
        let config_dir = config_dir.into();
        let path = config_dir.join("config.yaml");
        Self::build(config_dir, path, Some(yaml.as_bytes()), std::iter::empty())
    }

    /// Embedded defaults only
    pub fn defaults(config_dir: impl Into<PathBuf>) -> Result<Self> {
        let config_dir = config_dir.into();
        let path = config_dir.join("config.yaml");
        Self::build(config_dir, path, None, std::iter::empty())
    }

    fn build(
        config_dir: PathBuf,
        path: PathBuf,
        external: Option<&[u8]>,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self> {
        let mut data: Value =
            serde_yaml::from_str(DEFAULT_CONFIG).context("Invalid embedded configuration")?;

        if let Some(bytes) = external {
            let external_value: Value = serde_yaml::from_slice(bytes)
                .with_context(|| format!("Invalid configuration file {}", path.display()))?;
            merge_yaml(&mut data, &lower_keys_value(external_value));
        }

        let mut data = lower_keys_value(data);
        apply_env_overrides(&mut data, vars);

        let settings: Settings = serde_yaml::from_value(data.clone())
            .context("Configuration does not match the expected schema")?;

        Ok(Self {
            config_dir,
            path,
            data,
            settings,
        })
    }

    /// Typed view of the configuration
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Path of the `config.yaml` file this configuration was read from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads a raw value by its key path
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let mut current = &self.data;
        for key in path {
            current = match current {
                Value::Mapping(map) => map
                    .get(Value::String(key.to_lowercase()))
                    .ok_or_else(|| anyhow!("Key '{}' not found", key))?,
                _ => return Err(anyhow!("Key '{}' is not inside a mapping", key)),
            };
        }
        Ok(current.clone())
    }

    /// Resolves the cache root and creates it if needed
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let dir = self.resolve_path(&self.settings.cache.directory);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create cache directory {}", dir.display()))?;
        Ok(dir)
    }

    fn resolve_path(&self, dir: &str) -> PathBuf {
        let path = Path::new(dir);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }
}

fn apply_env_overrides(config: &mut Value, vars: impl IntoIterator<Item = (String, String)>) {
    for (key, value) in vars {
        if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
            let key_path = stripped
                .split("__")
                .map(|k| k.to_lowercase())
                .collect::<Vec<_>>();
            if key_path.iter().any(|k| k.is_empty()) {
                continue;
            }
            info!(variable = %key, "Applying environment override");
            set_value_internal(config, &key_path, convert_env_value(&value));
        }
    }
}

fn set_value_internal(data: &mut Value, path: &[String], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        *data = value;
        return;
    };

    if !matches!(data, Value::Mapping(_)) {
        *data = Value::Mapping(Mapping::new());
    }

    if let Value::Mapping(map) = data {
        let key = Value::String(head.clone());
        let child = map
            .entry(key)
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        set_value_internal(child, rest, value);
    }
}

fn convert_env_value(value: &str) -> Value {
    if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
        return parsed;
    }
    Value::String(value.to_string())
}

fn lower_keys_value(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut new_map = Mapping::new();
            for (k, v) in map {
                if let Value::String(s) = k {
                    new_map.insert(Value::String(s.to_lowercase()), lower_keys_value(v));
                } else {
                    new_map.insert(k, lower_keys_value(v));
                }
            }
            Value::Mapping(new_map)
        }
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys_value).collect()),
        _ => value,
    }
}

/// Merges external YAML configuration into default configuration
///
/// Mappings are merged key by key, scalars and sequences from `external`
/// replace the default values.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}
