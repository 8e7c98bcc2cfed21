use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Process-level settings, distinct from the service TOML: where to listen,
/// where the TOML lives, how long shutdown may take. Every field can be
/// overridden with a `SWITCHBOARD__`-prefixed environment variable
/// (`SWITCHBOARD__PORT`, `SWITCHBOARD__LOG_DIR`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub config_file: PathBuf,
    pub shutdown_grace_secs: u64,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 8001)?
            .set_default("config_file", "switchboard.toml")?
            .set_default("shutdown_grace_secs", 15)?
            .add_source(
                Environment::with_prefix("SWITCHBOARD")
                    .prefix_separator("__")
                    .try_parsing(true),
            )
            .build()?;
        config.try_deserialize()
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
