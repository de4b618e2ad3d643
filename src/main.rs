//! Primary CLI binary (spec §7D): loads a fully-resolved `HubConfig`,
//! builds the `Hub`, connects eager servers, and runs the HTTP and/or
//! stdio Upstream Gateway.

use clap::Parser;
use hatago_hub_lib::config::ConfigManager;
use hatago_hub_lib::gateway;
use hatago_hub_lib::hub;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "hatago-hub", about = "MCP aggregating hub")]
struct Cli {
    /// Path to the JSON configuration file (default: platform app-data dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the configured gateway port
    #[arg(long)]
    port: Option<u16>,

    /// Run the stdio upstream gateway instead of the HTTP gateway
    #[arg(long)]
    stdio: bool,

    /// Log level, e.g. "info", "debug", "hatago_hub_lib=debug"
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_level.clone())),
        )
        .init();

    let config_path = match cli.config.clone() {
        Some(p) => p,
        None => match ConfigManager::default_path() {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("could not resolve a default config path: {e:#}");
                return std::process::ExitCode::from(1);
            }
        },
    };

    let manager = ConfigManager::new(config_path);
    let mut config = match manager.load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("failed to load config: {e:#}");
            return std::process::ExitCode::from(1);
        }
    };

    if let Some(port) = cli.port {
        config.gateway_port = port;
    }

    let hub = hub::build_from_config(config.clone()).await;
    hub.start_eager_servers().await;

    let health_hub = std::sync::Arc::clone(&hub);
    let health_interval = Duration::from_secs(config.health_check_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(health_interval);
        loop {
            ticker.tick().await;
            health_hub.health_check_cycle().await;
        }
    });

    // The stdio gateway always runs in the foreground when requested, since
    // its exit code is the process exit code (spec §6 "exit codes").
    // The HTTP gateway runs alongside it in the background either way, so a
    // `--stdio` front-end can still be introspected over HTTP.
    let http_hub = std::sync::Arc::clone(&hub);
    let http_port = config.gateway_port;
    tokio::spawn(async move {
        if let Err(e) = gateway::http::serve(http_hub, http_port).await {
            tracing::error!("HTTP gateway exited with error: {e:#}");
        }
    });

    let result = if cli.stdio {
        gateway::stdio::serve(hub).await
    } else {
        std::future::pending::<()>().await;
        Ok(())
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("gateway exited with error: {e:#}");
            std::process::ExitCode::from(1)
        }
    }
}
