use clap::Parser;
use mimir::config::CacheConfig;
use mimir::core::{ConnectionEvent, ConnectionManager, RedisConnector};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_appender::non_blocking;
// no EnvFilter feature; use a simple level switch via RUST_LOG

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[derive(Parser)]
#[command(name = "mimir")]
#[command(about = "Resilient cache-client supervisor")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mimir.yaml")]
    config: String,
}

fn init_logging() {
    let (non_blocking_writer, guard) = non_blocking(std::io::stderr());
    // Keep guard alive for the program lifetime to avoid log loss
    let _ = LOG_GUARD.set(guard);

    let fmt = tracing_subscriber::fmt()
        .with_writer(non_blocking_writer)
        .with_ansi(true)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .compact();

    // Map RUST_LOG to a max level (debug/info/warn/error/trace)
    let level = match std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    let _ = fmt.with_max_level(level).try_init();
}

/// Forward connection events to the log until the manager closes.
async fn log_connection_events(mut events: broadcast::Receiver<ConnectionEvent>) {
    loop {
        match events.recv().await {
            Ok(ConnectionEvent::StateChanged { from, to }) => {
                info!("connection state changed: {:?} -> {:?}", from, to);
            }
            Ok(ConnectionEvent::AttemptFailed { attempt, retry_in }) => match retry_in {
                Some(delay) => warn!("connect attempt {} failed, next try in {:?}", attempt, delay),
                None => error!("connect attempt {} failed, retry budget exhausted", attempt),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("event logger lagged, skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn run_with_config_path_and_shutdown(
    config_path: &str,
    shutdown: impl std::future::Future<Output = ()> + Send,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = CacheConfig::from_yaml_file(config_path).await?;
    info!(
        "Cache target: {}:{} (tls: {})",
        config.host, config.port, config.use_tls
    );

    let connector = Arc::new(RedisConnector::from_config(&config));
    let manager = Arc::new(ConnectionManager::from_config(connector, &config));

    let events = manager.subscribe();
    let logger = tokio::spawn(log_connection_events(events));

    manager.start();
    shutdown.await;
    info!("Shutdown signal received");

    if let Err(e) = manager.shutdown() {
        error!("Shutdown error: {}", e);
    }
    logger.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let args = Args::parse();
    info!("Starting Mimir - resilient cache client");
    run_with_config_path_and_shutdown(&args.config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    info!("Mimir stopped");
    Ok(())
}
