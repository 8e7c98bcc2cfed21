//! Service configuration, loaded from a TOML file.
//!
//! Everything has a default except the capability list, so a minimal file is
//! just `[[capability]]` tables. Secrets never live in the file itself; the
//! provider key and capability credentials are named environment variables
//! resolved at start time.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::capability::CapabilityDescriptor;
use crate::model::DEFAULT_MODEL;
use crate::providers::openai::{OPENAI_DEFAULT_HOST, OPENAI_DEFAULT_TIMEOUT_SECS};

/// Reasoning provider settings, shared by routing and every specialist pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub host: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub temperature: Option<f32>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            host: OPENAI_DEFAULT_HOST.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: OPENAI_DEFAULT_TIMEOUT_SECS,
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound on one delegated capability invocation, in seconds.
    pub invoke_timeout_secs: u64,
    /// Reasoning/delegation rounds before composition is forced.
    pub max_rounds: usize,
    /// Turns of session history fed to the reasoning step.
    pub history_limit: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            invoke_timeout_secs: 60,
            max_rounds: 4,
            history_limit: 10,
        }
    }
}

impl DispatchConfig {
    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_secs(self.invoke_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file; created (with parent directories) if missing.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            path: PathBuf::from("switchboard.db"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub provider: ProviderConfig,
    pub dispatch: DispatchConfig,
    pub storage: StorageConfig,
    #[serde(rename = "capability")]
    pub capabilities: Vec<CapabilityDescriptor>,
}

impl ServiceConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }
}
