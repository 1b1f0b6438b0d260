use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use quotagate::config::{ServiceConfig, StoreBackend};
use quotagate::http::HttpServer;
use quotagate::ratelimit::{CounterStore, FixedWindowLimiter, MemoryStore, RedisStore, RuleSet};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Fixed-window rate limiting service.
#[derive(Debug, Parser)]
#[command(name = "quotagate", version, about)]
struct Args {
    /// Path to the service configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,

    /// Address to serve HTTP on, overriding the configuration
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Counter store URL, overriding the configuration
    #[arg(long)]
    store_url: Option<String>,

    /// Path to the rate limit rules file, overriding the configuration
    #[arg(long)]
    rules: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .init(),
    }

    info!("Starting Quotagate Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = ServiceConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.http_addr {
        config.server.http_addr = addr;
    }
    if let Some(url) = args.store_url {
        config.store.url = url;
    }
    if let Some(rules) = args.rules {
        config.rate_limiting.rules_path = Some(rules);
    }
    info!(http_addr = %config.server.http_addr, backend = ?config.store.backend, "Configuration loaded");

    let rules = match config.rate_limiting.rules_path.as_deref() {
        Some(path) => RuleSet::from_file(path)?,
        None => RuleSet::empty(),
    };
    info!(rule_count = rules.len(), "Rate limit rules loaded");

    let store: Arc<dyn CounterStore> = match config.store.backend {
        StoreBackend::Redis => Arc::new(RedisStore::connect(&config.store.url).await?),
        StoreBackend::Memory => {
            info!("Using in-memory counter store; counters are local to this instance");
            Arc::new(MemoryStore::new())
        }
    };

    let rate_limiter = Arc::new(FixedWindowLimiter::new(Arc::new(rules), store));
    info!("Rate limiter initialized");

    let server = HttpServer::bind(config.server.http_addr, rate_limiter).await?;

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Quotagate Rate Limiting Service stopped");
    Ok(())
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
