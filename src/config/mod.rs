//! Typed configuration from environment variables or a TOML file.
//!
//! Every setting has a default, so an empty environment is valid.
//! Malformed values fail fast at load time.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::NewWorkItem;
use crate::model::work::DEFAULT_TIMEOUT_SECS;
use crate::sink;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory receiving the `.arg` and `.txt` files of each work item.
    pub output_dir: PathBuf,
    /// Script time budget in seconds when the caller gives none.
    pub default_timeout: u64,
    /// Messages buffered per sink subscriber.
    pub sink_capacity: usize,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: std::env::temp_dir(),
            default_timeout: DEFAULT_TIMEOUT_SECS,
            sink_capacity: sink::DEFAULT_CAPACITY,
            otel_endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            output_dir: std::env::var_os("HOOKWORK_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            default_timeout: parsed_var("HOOKWORK_TIMEOUT")?.unwrap_or(defaults.default_timeout),
            sink_capacity: parsed_var("HOOKWORK_SINK_CAPACITY")?
                .unwrap_or(defaults.sink_capacity),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }

    /// Load configuration from a TOML file. Missing keys take defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("bad config file {}: {e}", path.display())))
    }

    /// Start a work item with this configuration's output directory,
    /// timeout and sink capacity.
    pub fn new_work_item(&self, name: impl Into<String>, script: impl Into<PathBuf>) -> NewWorkItem {
        NewWorkItem::new(name, script)
            .output_dir(self.output_dir.clone())
            .timeout(self.default_timeout)
            .sink_capacity(self.sink_capacity)
    }
}

fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid value for {name}: {raw:?} ({e})"))),
        Err(_) => Ok(None),
    }
}
