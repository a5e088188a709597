//! relaylog-primary - the node that assigns ids and owns the authoritative log.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relaylog::config::PrimaryConfig;
use relaylog::error::Result;
use relaylog::replication::transport::TcpPeerTransport;
use relaylog::replication::PrimaryReplicator;

#[derive(Parser)]
#[command(name = "relaylog-primary")]
#[command(author, version, about = "Replicated append-only log primary", long_about = None)]
struct Cli {
    /// Path to an optional TOML config file. CLI flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset.
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// RPC address of each secondary, may be repeated.
    #[arg(long = "replica")]
    replicas: Vec<String>,

    /// HTTP API bind address.
    #[arg(long)]
    http_bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let mut config = match &cli.config {
        Some(path) => PrimaryConfig::from_file(path)?,
        None => PrimaryConfig::default(),
    };

    if !cli.replicas.is_empty() {
        config.replicas = cli.replicas;
    }
    if let Some(http_bind) = cli.http_bind {
        config.http_bind = http_bind;
    }

    config.validate()?;

    tracing::info!(
        replicas = config.replicas.len(),
        http_bind = %config.http_bind,
        "starting relaylog primary"
    );

    let replicator = PrimaryReplicator::new(config.clone(), Arc::new(TcpPeerTransport));
    replicator.spawn_heartbeat_loop();

    let app = relaylog::api::primary::router(Arc::clone(&replicator));
    let listener = tokio::net::TcpListener::bind(&config.http_bind).await?;

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                tracing::error!("HTTP server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
    }

    tracing::info!("relaylog primary shutdown complete");
    Ok(())
}

fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
