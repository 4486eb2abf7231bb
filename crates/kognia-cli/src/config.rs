//! `kognia.toml` loading.
//!
//! Every section is optional; a missing file yields the defaults. The model
//! API key may be left out of the file and supplied through `KOGNIA_API_KEY`.

use kognia_agent::{ModelConfig, ResearchToolsConfig};
use kognia_orchestrator::OrchestratorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable consulted when `model.api_key` is empty.
pub const API_KEY_ENV: &str = "KOGNIA_API_KEY";

#[derive(Debug, Deserialize)]
pub struct KogniaConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// `[executor]`, `[retry]`, `[compactor]` and `[router]`.
    #[serde(flatten)]
    pub orchestrator: OrchestratorConfig,
    /// Web search and fetch used by the Research specialist.
    #[serde(default)]
    pub research: ResearchToolsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for KogniaConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            data_dir: default_data_dir(),
            orchestrator: OrchestratorConfig::default(),
            research: ResearchToolsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl KogniaConfig {
    /// Parse a config document.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read the config file, falling back to defaults when it does not exist.
    ///
    /// The second value tells whether a file was found.
    pub async fn load(path: &Path) -> anyhow::Result<(Self, bool)> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let config = Self::parse(&content).map_err(|e| {
                    anyhow::anyhow!("Invalid config file '{}': {e}", path.display())
                })?;
                Ok((config, true))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok((Self::default(), false)),
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read config file '{}': {e}",
                path.display()
            )),
        }
    }

    /// Fill an empty API key from the environment.
    pub fn apply_env(&mut self, api_key: Option<String>) {
        if self.model.api_key.is_empty() {
            if let Some(key) = api_key.filter(|k| !k.is_empty()) {
                self.model.api_key = key;
            }
        }
    }

    /// SQLite database location.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("kognia.db")
    }
}
