//! gnodex-applier - drains the event queue into token balances.
//!
//! Runs as its own process so ingestion and balance application scale and
//! fail independently; the SQS queue is the only coupling between them.
//!
//! ```bash
//! gnodex-applier --batch 10
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use gnodex_core::metrics::init_metrics;
use gnodex_core::ports::EventQueue;
use gnodex_core::services::{ApplierConfig, BalanceApplier};
use gnodex_queue::{QueueConfig, SqsEventQueue};
use gnodex_storage::{Database, DatabaseConfig, PgRepositories};

/// gnodex-applier CLI - balance applier worker.
#[derive(Parser, Debug)]
#[command(name = "gnodex-applier")]
#[command(about = "gnodex - balance applier worker")]
#[command(version)]
struct Cli {
    /// PostgreSQL database URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost/gnodex"
    )]
    database_url: String,

    /// SQS queue name for parsed token events.
    #[arg(long, env = "SQS_QUEUE_NAME", default_value = "token-events")]
    queue_name: String,

    /// SQS endpoint override (e.g. a LocalStack edge URL).
    #[arg(long, env = "SQS_ENDPOINT_URL")]
    queue_endpoint: Option<String>,

    /// AWS region for the queue.
    #[arg(long, env = "AWS_DEFAULT_REGION", default_value = "ap-northeast-2")]
    queue_region: String,

    /// Maximum messages per receive call (1..=10).
    #[arg(long, default_value = "10")]
    batch: i32,

    /// Prometheus metrics port.
    #[arg(long, env = "METRICS_PORT", default_value = "9091")]
    metrics_port: u16,

    /// Enable JSON log output.
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);
    init_metrics_exporter(cli.metrics_port);

    info!("🚀 Starting gnodex-applier");
    debug!(database_url = %mask_password(&cli.database_url), "Database endpoint");

    info!("🗄️  Connecting to database...");
    let db = Database::connect(&DatabaseConfig::for_applier(&cli.database_url))
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.context("Failed to run migrations")?;
    info!("🗄️  Database ready (migrations applied)");

    let repositories = Arc::new(PgRepositories::new(&db));

    let queue = Arc::new(
        SqsEventQueue::connect(QueueConfig {
            queue_name: cli.queue_name.clone(),
            endpoint_url: cli.queue_endpoint.clone(),
            region: cli.queue_region.clone(),
            max_messages: cli.batch.clamp(1, 10),
        })
        .await
        .context("Failed to connect to event queue")?,
    );

    let applier = BalanceApplier::new(ApplierConfig::default(), repositories, queue.clone());

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("🛑 Shutdown requested");
        signal_cancel.cancel();
    });

    info!("✅ gnodex-applier ready");
    let result = applier.run(cancel).await;

    EventQueue::close(queue.as_ref()).await;
    db.close().await;

    match result {
        Ok(()) => {
            info!("🛑 Shutdown complete");
            Ok(())
        }
        Err(e) => Err(e).context("applier failed"),
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

/// Prometheus metrics exporter (optional - failures don't crash the app).
fn init_metrics_exporter(port: u16) {
    match format!("0.0.0.0:{port}").parse::<std::net::SocketAddr>() {
        Ok(addr) => match PrometheusBuilder::new().with_http_listener(addr).install() {
            Ok(()) => {
                init_metrics();
                info!("📊 Metrics: http://localhost:{port}/metrics");
            }
            Err(e) => {
                warn!("⚠️  Failed to start metrics exporter: {e}. Continuing without metrics.");
            }
        },
        Err(e) => {
            warn!("⚠️  Invalid metrics address: {e}. Continuing without metrics.");
        }
    }
}

/// Mask password in database URL for logging.
fn mask_password(url_str: &str) -> String {
    match url::Url::parse(url_str) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => url_str.to_string(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
