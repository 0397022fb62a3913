//! gnodex - Gno token-balance indexer (syncer).
//!
//! # Usage
//!
//! ```bash
//! # Follow the chain head and backfill in parallel, until SIGINT/SIGTERM
//! gnodex --realtime
//!
//! # Re-walk the full range to repair gaps
//! gnodex --integrity
//!
//! # One-shot range sync (defaults: 1..=1000)
//! gnodex --from 500 --to 1500
//! ```

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use gnodex_core::metrics::init_metrics;
use gnodex_core::ports::{EventQueue, HeadSubscription};
use gnodex_core::services::{
    EventExtractor, FetcherConfig, IntegrityScanner, Orchestrator, OrchestratorConfig,
    RangeFetcher, Syncer,
};
use gnodex_queue::{QueueConfig, SqsEventQueue};
use gnodex_storage::{Database, DatabaseConfig, PgRepositories};
use gnodex_upstream::{GnoUpstream, UpstreamConfig};

/// gnodex CLI - Gno blockchain indexer.
#[derive(Parser, Debug)]
#[command(name = "gnodex")]
#[command(about = "gnodex - Gno token-balance indexer")]
#[command(version)]
struct Cli {
    /// GraphQL query endpoint.
    #[arg(
        long,
        env = "GRAPHQL_ENDPOINT",
        default_value = "https://indexer.onbloc.xyz/graphql/query"
    )]
    graphql_endpoint: String,

    /// GraphQL subscription (WebSocket) endpoint.
    #[arg(
        long,
        env = "GRAPHQL_WS_ENDPOINT",
        default_value = "wss://indexer.onbloc.xyz/graphql/query"
    )]
    graphql_ws_endpoint: String,

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

    /// Prometheus metrics port.
    #[arg(long, env = "METRICS_PORT", default_value = "9090")]
    metrics_port: u16,

    /// Enable JSON log output.
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Run realtime sync (live heads + backfill) until SIGINT/SIGTERM.
    #[arg(long, conflicts_with_all = ["integrity", "from", "to"])]
    realtime: bool,

    /// Run the integrity scanner once and exit.
    #[arg(long, conflicts_with_all = ["from", "to"])]
    integrity: bool,

    /// One-shot sync: first height (inclusive).
    #[arg(long)]
    from: Option<u64>,

    /// One-shot sync: last height (inclusive).
    #[arg(long)]
    to: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);
    init_metrics_exporter(cli.metrics_port);

    info!("🚀 Starting gnodex");
    debug!(endpoint = %cli.graphql_endpoint, "Query endpoint");
    debug!(endpoint = %cli.graphql_ws_endpoint, "Stream endpoint");
    debug!(database_url = %mask_password(&cli.database_url), "Database endpoint");

    // ─────────────────────────────────────────────────────────────────────
    // 🗄️ DATABASE
    // ─────────────────────────────────────────────────────────────────────
    info!("🗄️  Connecting to database...");
    let db = Database::connect(&DatabaseConfig::for_indexer(&cli.database_url))
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.context("Failed to run migrations")?;
    info!("🗄️  Database ready (migrations applied)");

    let repositories = Arc::new(PgRepositories::new(&db));

    // ─────────────────────────────────────────────────────────────────────
    // 📮 EVENT QUEUE
    // ─────────────────────────────────────────────────────────────────────
    let queue = Arc::new(
        SqsEventQueue::connect(QueueConfig {
            queue_name: cli.queue_name.clone(),
            endpoint_url: cli.queue_endpoint.clone(),
            region: cli.queue_region.clone(),
            ..Default::default()
        })
        .await
        .context("Failed to connect to event queue")?,
    );

    // ─────────────────────────────────────────────────────────────────────
    // 📡 UPSTREAM
    // ─────────────────────────────────────────────────────────────────────
    let upstream = Arc::new(
        GnoUpstream::connect(UpstreamConfig {
            query_endpoint: cli.graphql_endpoint.clone(),
            stream_endpoint: cli.graphql_ws_endpoint.clone(),
        })
        .context("Failed to build upstream client")?,
    );

    // ─────────────────────────────────────────────────────────────────────
    // ⚙️ PIPELINE
    // ─────────────────────────────────────────────────────────────────────
    let extractor = Arc::new(EventExtractor::new(repositories.clone(), queue.clone()));
    let fetcher = RangeFetcher::new(
        FetcherConfig::default(),
        upstream.clone(),
        repositories.clone(),
        extractor,
    );
    let syncer = Arc::new(Syncer::new(fetcher, repositories.clone()));

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("🛑 Shutdown requested");
        signal_cancel.cancel();
    });

    let result = if cli.realtime {
        let orchestrator =
            Orchestrator::new(OrchestratorConfig::default(), syncer, upstream.clone());
        info!("✅ gnodex ready (realtime)");
        orchestrator.run(cancel.clone()).await
    } else if cli.integrity {
        let scanner = IntegrityScanner::new(syncer, upstream.clone());
        scanner.run(&cancel).await
    } else {
        let from = cli.from.unwrap_or(1);
        let to = cli.to.unwrap_or(1000);
        if from > to {
            bail!("invalid range: --from {from} is greater than --to {to}");
        }
        info!(from, to, "⛓️  One-shot range sync");
        syncer.sync_range(from, to, &cancel).await
    };

    // ─────────────────────────────────────────────────────────────────────
    // 🛑 SHUTDOWN
    // ─────────────────────────────────────────────────────────────────────
    HeadSubscription::close(upstream.as_ref()).await;
    EventQueue::close(queue.as_ref()).await;
    db.close().await;

    match result {
        Ok(()) => {
            info!("🛑 Shutdown complete");
            Ok(())
        }
        Err(e) => Err(e).context("indexer failed"),
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
