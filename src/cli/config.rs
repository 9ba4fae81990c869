use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Server used when nothing has been saved yet
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedServer {
    pub url: String,
    /// Path prefix of the record endpoints
    pub prefix: String,
    pub description: String,
    pub added_at: DateTime<Utc>,
    pub last_ping: Option<DateTime<Utc>>,
    pub status: ServerStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Up,
    Down,
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub current_server: Option<String>,
    pub servers: BTreeMap<String, SavedServer>,
}

impl SavedServer {
    pub fn new(url: String, prefix: String, description: String) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            prefix,
            description,
            added_at: Utc::now(),
            last_ping: None,
            status: ServerStatus::Unknown,
        }
    }

    pub fn update_ping(&mut self, status: ServerStatus) {
        self.last_ping = Some(Utc::now());
        self.status = status;
    }
}

impl ServerConfig {
    /// Server selected by name, or the current one
    pub fn resolve(&self, name: Option<&str>) -> anyhow::Result<Option<(&str, &SavedServer)>> {
        let Some(name) = name.or(self.current_server.as_deref()) else {
            return Ok(None);
        };
        match self.servers.get_key_value(name) {
            Some((name, server)) => Ok(Some((name.as_str(), server))),
            None => anyhow::bail!("unknown server '{}'; add it with `alpaca server add`", name),
        }
    }

    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let server_file = dir.join("server.json");

        if !server_file.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(server_file)?;
        let config: ServerConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, dir: &Path) -> anyhow::Result<()> {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(dir.join("server.json"), content)?;
        Ok(())
    }
}

pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    if let Ok(custom_dir) = std::env::var("ALPACA_CLI_CONFIG_DIR") {
        return Ok(PathBuf::from(custom_dir));
    }
    let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME environment variable not set"))?;
    Ok(PathBuf::from(home).join(".config").join("alpaca").join("cli"))
}

pub fn load_server_config() -> anyhow::Result<ServerConfig> {
    ServerConfig::load_from(&get_config_dir()?)
}

pub fn save_server_config(config: &ServerConfig) -> anyhow::Result<()> {
    config.save_to(&get_config_dir()?)
}
