mod bootstrap;
mod clock;
mod config;
mod entries;
mod error;
mod expiry;
mod payment;
mod server;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,feeds_backend=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("🚀 Starting feeds expiry worker");

    let config = config::Config::from_env()?;

    let state = bootstrap::initialize_app_state(&config).await?;
    let scheduler = state.scheduler.clone();

    scheduler.start();

    let app = server::create_app(state);
    let shutdown_scheduler = scheduler.clone();
    server::run_server(app, &config.bind_address, async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        shutdown_scheduler.stop();
    })
    .await?;

    // Covers a server that exited without a signal
    scheduler.stop();
    info!("👋 Expiry worker shut down");

    Ok(())
}
