use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::inference::InferenceConfig;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub inference: InferenceSection,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub context: ContextConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for InferenceSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            model: default_model(),
            streaming: false,
            temperature: default_temperature(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    11434
}
fn default_model() -> String {
    "phi3:medium".to_string()
}
fn default_temperature() -> f64 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("report-forge.json")
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ContextConfig {
    /// Extra instructions appended to every assembled user message.
    #[serde(default)]
    pub default_context: String,
}

impl Config {
    pub fn inference_config(&self) -> InferenceConfig {
        InferenceConfig {
            host: self.inference.host.clone(),
            port: self.inference.port,
            model: self.inference.model.clone(),
            streaming: self.inference.streaming,
            temperature: self.inference.temperature,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.inference.host.trim().is_empty() {
        anyhow::bail!("inference.host must not be empty");
    }

    if config.inference.port == 0 {
        anyhow::bail!("inference.port must be > 0");
    }

    if config.inference.model.trim().is_empty() {
        anyhow::bail!("inference.model must not be empty");
    }

    if !(0.0..=2.0).contains(&config.inference.temperature) {
        anyhow::bail!("inference.temperature must be in [0.0, 2.0]");
    }

    Ok(config)
}
