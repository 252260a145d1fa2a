mod file_config;

pub use file_config::{FileConfig, GeotabConfig};

use crate::server::{RequestsLoggingLevel, ServerConfig};
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::time::Duration;

pub const DEFAULT_GEOTAB_SERVER: &str = "my.geotab.com";

/// Credentials and address of the Geotab account the server reads from
#[derive(Clone, PartialEq, Eq)]
pub struct GeotabSettings {
    pub username: String,
    pub password: String,
    pub database: String,
    /// Host name (`my.geotab.com`) or base URL (`https://host:port`)
    pub server: String,
}

impl std::fmt::Debug for GeotabSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeotabSettings")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("server", &self.server)
            .finish()
    }
}

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: String,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub backend_timeout_sec: u64,
    pub geotab_username: Option<String>,
    pub geotab_password: Option<String>,
    pub geotab_database: Option<String>,
    pub geotab_server: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub backend_timeout: Option<Duration>,
    pub geotab: GeotabSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();
        let geotab_file = file.geotab.unwrap_or_default();

        let host = file.host.unwrap_or_else(|| cli.host.clone());
        if host.trim().is_empty() {
            bail!("host must not be empty");
        }

        let port = file.port.unwrap_or(cli.port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let backend_timeout_sec = file.backend_timeout_sec.unwrap_or(cli.backend_timeout_sec);
        let backend_timeout = (backend_timeout_sec > 0).then(|| Duration::from_secs(backend_timeout_sec));

        let geotab = GeotabSettings {
            username: required(
                "Geotab username",
                "GEOTAB_USERNAME",
                geotab_file.username.or_else(|| cli.geotab_username.clone()),
            )?,
            password: required(
                "Geotab password",
                "GEOTAB_PASSWORD",
                geotab_file.password.or_else(|| cli.geotab_password.clone()),
            )?,
            database: required(
                "Geotab database",
                "GEOTAB_DATABASE",
                geotab_file.database.or_else(|| cli.geotab_database.clone()),
            )?,
            server: geotab_file
                .server
                .or_else(|| cli.geotab_server.clone())
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|| DEFAULT_GEOTAB_SERVER.to_string()),
        };
        validate_server(&geotab.server)?;

        Ok(Self {
            host,
            port,
            logging_level,
            backend_timeout,
            geotab,
        })
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            requests_logging_level: self.logging_level.clone(),
            host: self.host.clone(),
            port: self.port,
        }
    }
}

fn required(what: &str, env_var: &str, value: Option<String>) -> Result<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => bail!(
            "{} must be specified via {} or in the [geotab] section of the config file",
            what,
            env_var
        ),
    }
}

/// Accept a bare host (`my.geotab.com`, `host:8080`) or an http(s) base URL.
fn validate_server(server: &str) -> Result<()> {
    let host = server
        .strip_prefix("https://")
        .or_else(|| server.strip_prefix("http://"))
        .unwrap_or(server)
        .trim_end_matches('/');

    if host.is_empty() {
        bail!("Geotab server must not be empty");
    }
    if server.contains("://") && !server.starts_with("http://") && !server.starts_with("https://") {
        bail!("Geotab server must use http or https: {}", server);
    }
    let valid = host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']'));
    if !valid {
        bail!("Geotab server is not a valid host name: {}", server);
    }
    Ok(())
}

fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
