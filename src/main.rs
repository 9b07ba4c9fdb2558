use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::TurnstileConfig;
use turnstile::http::HttpServer;
use turnstile::ratelimit::WindowLimiter;
use turnstile::store::MemoryStore;

/// Fixed-window admission control service.
#[derive(Parser, Debug)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Enable debug logging (ignored when RUST_LOG is set)
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);
    if args.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Starting Turnstile Admission Control Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = TurnstileConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.http_addr {
        config.server.http_addr = addr;
    }
    config.validate()?;
    info!(
        http_addr = %config.server.http_addr,
        max_requests = config.rate_limiting.max_requests,
        window = %config.rate_limiting.window_duration,
        "Configuration loaded"
    );

    // One store and one limiter for the lifetime of the process
    let store = MemoryStore::with_default_ttl(config.store.default_ttl()?);
    let janitor = store.spawn_janitor(config.store.purge_interval()?)?;
    let limiter = Arc::new(WindowLimiter::new(
        config.rate_limiting.limiter_config()?,
        store,
    )?);
    info!(config = ?limiter.config(), "Window limiter initialized");

    let server = HttpServer::new(config.server.http_addr, limiter)
        .with_trusted_caller_header(config.server.trust_caller_header);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    janitor.abort();
    info!("Turnstile Admission Control Service stopped");
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
