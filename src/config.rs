//! Generate configuration, read from a YAML file.
//!
//! ```yaml
//! database: database.db
//! repo: .
//! metric_parsers: []
//! skip_default_metrics: false
//! exclude: '^vendor/'
//! ```
//!
//! Relative paths are resolved against the directory holding the config file.

use crate::error::{DebtError, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "generate_config.yaml";

/// Matches nothing but the empty path, which never occurs in a diff.
const DEFAULT_EXCLUDE: &str = "^$";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGenerateConfig {
    database: PathBuf,
    repo: PathBuf,
    #[serde(default)]
    metric_parsers: Vec<String>,
    #[serde(default)]
    skip_default_metrics: bool,
    #[serde(default = "default_exclude")]
    exclude: String,
}

fn default_exclude() -> String {
    DEFAULT_EXCLUDE.to_string()
}

#[derive(Debug, Clone)]
pub struct GenerateConfig {
    pub database: PathBuf,
    pub repo: PathBuf,
    /// Registry names of parsers to enable on top of (or instead of) the defaults.
    pub metric_parsers: Vec<String>,
    pub skip_default_metrics: bool,
    pub exclude: Regex,
}

impl GenerateConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DebtError::Config(format!(
                "config file not found {}",
                path.display()
            )));
        }
        let contents = std::fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_yaml(&contents, base)
    }

    pub fn from_yaml(contents: &str, base: &Path) -> Result<Self> {
        let raw: RawGenerateConfig = serde_yaml::from_str(contents)?;
        let exclude = Regex::new(&raw.exclude)?;

        Ok(Self {
            database: resolve(base, raw.database),
            repo: resolve(base, raw.repo),
            metric_parsers: raw.metric_parsers,
            skip_default_metrics: raw.skip_default_metrics,
            exclude,
        })
    }
}

fn resolve(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}
