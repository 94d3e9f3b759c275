use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use floodgate::config::{FloodgateConfig, LogFormat};
use floodgate::grpc::GrpcServer;
use floodgate::ratelimit::{AdmissionRegistry, AdmissionRules};

/// In-process admission control service.
#[derive(Parser, Debug)]
#[command(name = "floodgate", version, about)]
struct Args {
    /// Service configuration file (YAML)
    #[arg(long, value_name = "PATH", env = "FLOODGATE_CONFIG")]
    config: Option<String>,

    /// Admission rules file (YAML); overrides `rules_path` from the config
    #[arg(long, value_name = "PATH")]
    rules: Option<String>,

    /// gRPC listen address; overrides the config
    #[arg(long, value_name = "ADDR")]
    grpc_addr: Option<SocketAddr>,

    /// Log output format; overrides the config
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = FloodgateConfig::load(args.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(rules) = args.rules {
        config.rules_path = Some(rules);
    }
    if let Some(addr) = args.grpc_addr {
        config.server.grpc_addr = addr;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }

    init_tracing(config.logging.format);

    info!("Starting Floodgate admission service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(grpc_addr = %config.server.grpc_addr, "Configuration loaded");

    let rules = match config.rules_path.as_deref() {
        Some(path) => AdmissionRules::from_file(path)
            .with_context(|| format!("failed to load admission rules from {}", path))?,
        None => {
            warn!("No rules file configured; every resource will be reported as unknown");
            AdmissionRules::new()
        }
    };
    info!(resources = rules.len(), "Admission rules loaded");

    let registry = Arc::new(AdmissionRegistry::new(&rules)?);

    GrpcServer::new(config.server.grpc_addr, registry)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    info!("Floodgate admission service stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
