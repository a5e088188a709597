//! relaylog-secondary - a passive replica that applies entries from the primary.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relaylog::config::SecondaryConfig;
use relaylog::error::Result;
use relaylog::replication::message::{Request, Response};
use relaylog::replication::transport::{serve, RequestHandler};
use relaylog::replication::SecondaryApplier;

#[derive(Parser)]
#[command(name = "relaylog-secondary")]
#[command(author, version, about = "Replicated append-only log secondary", long_about = None)]
struct Cli {
    /// Path to an optional TOML config file. CLI flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset.
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Name this secondary reports in `Heartbeat` responses.
    #[arg(long)]
    name: Option<String>,

    /// RPC listen address (what the primary dials).
    #[arg(long)]
    rpc_bind: Option<String>,

    /// HTTP API bind address.
    #[arg(long)]
    http_bind: Option<String>,

    /// Artificial delay (milliseconds) applied before acquiring the state
    /// mutex in `Replicate`, a fault-injection / latency-testing knob.
    #[arg(long)]
    artificial_delay_ms: Option<u64>,
}

/// Dispatches inbound peer RPCs to the [`SecondaryApplier`].
struct SecondaryHandler {
    applier: Arc<SecondaryApplier>,
}

#[async_trait]
impl RequestHandler for SecondaryHandler {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Replicate(entry) => {
                let outcome = self.applier.replicate(entry.id, entry.payload).await;
                Response::LogAck {
                    success: outcome.success,
                    message: outcome.message.to_string(),
                }
            }
            Request::Heartbeat { secondary_name } => {
                tracing::debug!("heartbeat from {}", secondary_name);
                let last_log_id = self.applier.heartbeat().await;
                Response::HeartbeatResp {
                    status: "Healthy".to_string(),
                    last_log_id,
                }
            }
            Request::GetMissedLogs { last_received_id } => {
                let entries = self.applier.get_missed_logs(last_received_id).await;
                Response::MissedResp { entries }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let mut config = match &cli.config {
        Some(path) => SecondaryConfig::from_file(path)?,
        None => SecondaryConfig::default(),
    };

    if let Some(name) = cli.name {
        config.name = name;
    }
    if let Some(rpc_bind) = cli.rpc_bind {
        config.rpc_bind = rpc_bind;
    }
    if let Some(http_bind) = cli.http_bind {
        config.http_bind = http_bind;
    }
    if let Some(delay) = cli.artificial_delay_ms {
        config.artificial_delay_ms = delay;
    }

    config.validate()?;

    tracing::info!(
        name = %config.name,
        rpc_bind = %config.rpc_bind,
        http_bind = %config.http_bind,
        "starting relaylog secondary"
    );

    let applier = Arc::new(SecondaryApplier::new(config.name.clone(), config.artificial_delay()));
    let handler = Arc::new(SecondaryHandler {
        applier: Arc::clone(&applier),
    });

    let app = relaylog::api::secondary::router(Arc::clone(&applier));
    let http_listener = tokio::net::TcpListener::bind(&config.http_bind).await?;
    let rpc_bind = config.rpc_bind.clone();

    tokio::select! {
        result = axum::serve(http_listener, app) => {
            if let Err(e) = result {
                tracing::error!("HTTP server error: {}", e);
            }
        }
        result = serve(&rpc_bind, handler) => {
            if let Err(e) = result {
                tracing::error!("RPC server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
    }

    tracing::info!("relaylog secondary shutdown complete");
    Ok(())
}

fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
