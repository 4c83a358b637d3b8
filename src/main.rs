use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use clickgate::config::{ClickgateConfig, CounterStoreConfig, LoggingConfig};
use clickgate::db::{InMemoryRepository, LinkRepository, PgRepository, UserRepository};
use clickgate::http::{AppState, HttpServer};
use clickgate::ratelimit::{CounterBackend, CounterStore, RedisCounterStore, SlidingWindowLimiter};

/// URL shortener redirect and analytics service.
#[derive(Debug, Parser)]
#[command(name = "clickgate", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "CLICKGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ClickgateConfig::load(cli.config.as_deref())?;
    if let Some(addr) = cli.listen {
        config.server.http_addr = addr;
    }

    init_tracing(&config.logging);

    info!("Starting Clickgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(http_addr = %config.server.http_addr, "Configuration loaded");

    let limiter = Arc::new(
        SlidingWindowLimiter::new(connect_counter_store(&config.counter_store).await)
            .with_key_prefix(config.counter_store.key_prefix.clone()),
    );
    spawn_counter_store_reprobe(&limiter, &config.counter_store);

    let (links, users): (Arc<dyn LinkRepository>, Arc<dyn UserRepository>) =
        match config.database.url.as_deref() {
            Some(url) => {
                let repo = Arc::new(PgRepository::connect(url, &config.database).await?);
                (repo.clone(), repo)
            }
            None => {
                warn!("No database configured, using in-process store (data is not persisted)");
                let repo = Arc::new(InMemoryRepository::new());
                (repo.clone(), repo)
            }
        };

    let state = AppState::new(&config, limiter, links, users);
    HttpServer::new(config.server.http_addr, state)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    info!("Clickgate stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Connect to the counter store, falling back to fail-open mode.
async fn connect_counter_store(config: &CounterStoreConfig) -> CounterBackend {
    let Some(url) = config.url.as_deref() else {
        warn!("Counter store not configured, rate limiting is disabled");
        return CounterBackend::Unconfigured;
    };

    match RedisCounterStore::connect(url, Duration::from_millis(config.op_timeout_ms)).await {
        Ok(store) => CounterBackend::Available(Arc::new(store)),
        Err(e) => {
            warn!(error = %e, "Counter store unreachable, rate limiting is disabled until it recovers");
            CounterBackend::Unconfigured
        }
    }
}

/// Keep trying to attach the counter store if startup could not.
fn spawn_counter_store_reprobe(limiter: &Arc<SlidingWindowLimiter>, config: &CounterStoreConfig) {
    let Some(url) = config.url.clone() else {
        return;
    };
    if limiter.is_available() || config.probe_interval_secs == 0 {
        return;
    }

    let op_timeout = Duration::from_millis(config.op_timeout_ms);
    limiter.clone().spawn_reprobe(
        Duration::from_secs(config.probe_interval_secs),
        move || {
            let url = url.clone();
            async move {
                RedisCounterStore::connect(&url, op_timeout)
                    .await
                    .map(|store| Arc::new(store) as Arc<dyn CounterStore>)
            }
        },
    );
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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
