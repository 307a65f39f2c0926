use std::path::{Path, PathBuf};

use pilot_core::strategy::StrategyConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PilotConfig {
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    #[serde(default = "default_vehicle")]
    pub vehicle: String,
    #[serde(default)]
    pub access_code: String,
    /// Local endpoint announced to the relay, if any.
    #[serde(default)]
    pub announce_url: Option<String>,
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: i64,
    #[serde(default = "default_discovery_timeout_ms")]
    pub discovery_timeout_ms: i64,
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
    #[serde(default = "default_journal_dir")]
    pub journal_dir: PathBuf,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            vehicle: default_vehicle(),
            access_code: String::new(),
            announce_url: None,
            probe_interval_ms: default_probe_interval_ms(),
            discovery_timeout_ms: default_discovery_timeout_ms(),
            keepalive_interval_ms: default_keepalive_interval_ms(),
            journal_dir: default_journal_dir(),
        }
    }
}

impl PilotConfig {
    pub fn strategy(&self) -> StrategyConfig {
        StrategyConfig {
            probe_interval_ms: self.probe_interval_ms,
            discovery_timeout_ms: self.discovery_timeout_ms,
        }
    }
}

fn default_relay_url() -> String {
    "http://127.0.0.1:8787".to_string()
}

fn default_vehicle() -> String {
    "starterkit".to_string()
}

fn default_probe_interval_ms() -> i64 {
    1500
}

fn default_discovery_timeout_ms() -> i64 {
    60_000
}

fn default_keepalive_interval_ms() -> u64 {
    10_000
}

fn default_journal_dir() -> PathBuf {
    PathBuf::from("data")
}

pub fn load(path: Option<&Path>) -> Result<PilotConfig, Box<dyn std::error::Error>> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_path()?,
    };

    if !path.exists() {
        info!(path = %path.display(), "no config file, using defaults");
        return Ok(PilotConfig::default());
    }

    let text = std::fs::read_to_string(&path)?;
    let config: PilotConfig = toml::from_str(&text)?;
    Ok(config)
}

fn default_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let base = dirs::config_dir().ok_or("failed to locate config dir")?;
    Ok(base.join("pilot").join("pilot.toml"))
}
