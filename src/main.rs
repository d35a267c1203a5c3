//! Infusion relay service - Main Entry Point
//!
//! Accepts drug orders over HTTP, computes infusion speeds in the background,
//! and posts the results back to the order-management collaborator.

use clap::{Parser, Subcommand};
use infusion_relay::config::ServiceConfig;
use infusion_relay::dispatch::{DispatchSettings, TaskDispatcher};
use infusion_relay::error::{ServiceError, ServiceResult};
use infusion_relay::intake;
use infusion_relay::observability::{init_default_logging, init_logging, metrics, LogFormat};
use infusion_relay::relay::{HttpRelayConfig, HttpResultRelay};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn, Level};

/// Asynchronous infusion rate calculation service
#[derive(Parser)]
#[command(name = "infusion-relay")]
#[command(about = "Asynchronous infusion rate calculation service")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listening port, overriding the configuration file
    #[arg(short, long, env = "INFUSION_RELAY_PORT")]
    port: Option<u16>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.verbose {
        0 => init_default_logging(),
        n => {
            let level = if n == 1 { Level::DEBUG } else { Level::TRACE };
            let format = LogFormat::parse(&std::env::var("LOG_FORMAT").unwrap_or_default());
            init_logging(level, format, false);
        }
    }

    info!("Starting infusion-relay v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e.sanitized());
            process::exit(1);
        }
    };

    if let Some(port) = cli.port {
        config.service.port = port;
    }

    let result = match cli.command {
        Commands::Run => run_service(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e.sanitized());
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(config_path: &Option<PathBuf>) -> ServiceResult<ServiceConfig> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(ServiceConfig::load_from_file(path)?)
        }
        None => {
            let default_paths = ["infusion-relay.toml", "config/infusion-relay.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(ServiceConfig::load_from_file(&path)?);
                }
            }

            warn!("No configuration file found, using built-in defaults");
            let config = ServiceConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

async fn run_service(config: ServiceConfig) -> ServiceResult<()> {
    let relay = HttpResultRelay::new(HttpRelayConfig::from_service_config(&config)?)?;
    info!(
        endpoint = relay.endpoint(),
        timeout_secs = config.collaborator.timeout_secs,
        "Result relay configured"
    );

    let settings = DispatchSettings::from_config(&config);
    let dispatcher = TaskDispatcher::new(Arc::new(relay), settings);

    let routes = intake::routes(dispatcher, config.service.name.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.service.port));

    // Touch the collector so uptime counts from startup
    metrics();

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .map_err(|e| ServiceError::server(format!("Failed to install SIGINT handler: {e}")))?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .map_err(|e| ServiceError::server(format!("Failed to install SIGTERM handler: {e}")))?;

    let (bound, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(addr, async move {
            tokio::select! {
                _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
            }
        })
        .map_err(|e| ServiceError::server(format!("Failed to bind {addr}: {e}")))?;

    info!(
        service = %config.service.name,
        address = %bound,
        "Service listening"
    );

    server.await;

    let snapshot = metrics().get_metrics();
    if snapshot.orders.orders_in_flight > 0 {
        warn!(
            in_flight = snapshot.orders.orders_in_flight,
            "Shutting down with orders still in flight; their results will not be relayed"
        );
    }

    Ok(())
}

fn handle_config_command(config: ServiceConfig, show: bool) -> ServiceResult<()> {
    if show {
        let rendered = toml::to_string_pretty(&config)
            .map_err(|e| ServiceError::server(format!("Failed to render configuration: {e}")))?;
        println!("Current configuration:");
        println!("{rendered}");
    }

    match config.get_secret_key() {
        Ok(_) => info!(
            env = %config.collaborator.secret_key_env,
            "Collaborator secret is set"
        ),
        Err(e) => warn!("{}", e),
    }

    info!("Configuration validation complete");
    Ok(())
}
