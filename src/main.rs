use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use geotab_mcp_server::config::{AppConfig, CliConfig, FileConfig, DEFAULT_GEOTAB_SERVER};
use geotab_mcp_server::mcp::create_dispatcher;
use geotab_mcp_server::{run_server, GeotabClient, RequestsLoggingLevel};

#[derive(Parser, Debug)]
#[clap(version, about = "Model Context Protocol server for Geotab APIs")]
struct CliArgs {
    /// Path to a TOML config file. Its values override CLI and environment values.
    #[clap(long, env = "MCP_CONFIG")]
    pub config: Option<PathBuf>,

    /// The address to listen on.
    #[clap(long, env = "MCP_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// The port to listen on.
    #[clap(short, long, env = "MCP_PORT", default_value_t = 8000)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, env = "MCP_LOGGING_LEVEL", default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Seconds an operation may wait for Geotab. Set to 0 to wait indefinitely.
    #[clap(long, env = "MCP_BACKEND_TIMEOUT_SEC", default_value_t = 30)]
    pub backend_timeout_sec: u64,

    /// Geotab account user name.
    #[clap(long, env = "GEOTAB_USERNAME")]
    pub geotab_username: Option<String>,

    /// Geotab account password.
    #[clap(long, env = "GEOTAB_PASSWORD", hide_env_values = true)]
    pub geotab_password: Option<String>,

    /// Geotab database name.
    #[clap(long, env = "GEOTAB_DATABASE")]
    pub geotab_database: Option<String>,

    /// Geotab server host or base URL.
    #[clap(long, env = "GEOTAB_SERVER", default_value = DEFAULT_GEOTAB_SERVER)]
    pub geotab_server: String,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            host: self.host.clone(),
            port: self.port,
            logging_level: self.logging_level.clone(),
            backend_timeout_sec: self.backend_timeout_sec,
            geotab_username: self.geotab_username.clone(),
            geotab_password: self.geotab_password.clone(),
            geotab_database: self.geotab_database.clone(),
            geotab_server: Some(self.geotab_server.clone()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let app_config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;
    info!("Resolved configuration: {:?}", app_config);

    let client = GeotabClient::new(app_config.geotab.clone())
        .context("Failed to create Geotab client")?;
    client
        .authenticate()
        .await
        .context("Failed to authenticate with Geotab")?;

    let dispatcher = create_dispatcher(Arc::new(client), app_config.backend_timeout)
        .context("Failed to build the operation registry")?;

    info!("Starting Geotab MCP server v{}", env!("CARGO_PKG_VERSION"));
    run_server(app_config.server_config(), dispatcher).await
}
