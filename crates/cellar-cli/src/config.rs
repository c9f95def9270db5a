use std::fs;
use std::path::Path;

use anyhow::Context;
use cellar_data::DataConfig;
use cellar_store::StoreConfig;
use serde::{Deserialize, Serialize};

/// Configuration file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "cellar.toml";

/// Contents of `cellar.toml`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellarConfig {
    pub data: DataConfig,
    pub store: StoreConfig,
}

impl CellarConfig {
    /// Load from `path`, or from `./cellar.toml` if present, or defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Path::new(DEFAULT_CONFIG_FILE),
            None => return Ok(Self::default()),
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
