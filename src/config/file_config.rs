use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub host: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub backend_timeout_sec: Option<u64>,

    pub geotab: Option<GeotabConfig>,
}

/// `[geotab]` table: account credentials
#[derive(Deserialize, Default, Clone)]
#[serde(default)]
pub struct GeotabConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub server: Option<String>,
}

impl std::fmt::Debug for GeotabConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeotabConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("server", &self.server)
            .finish()
    }
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
