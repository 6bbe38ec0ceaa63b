mod routes;
mod stream;

use std::path::PathBuf;
use std::sync::Arc;

use frame_relay_common::config::Config;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use routes::AppState;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load_or_default(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    // Cancelled on Ctrl-C; every viewer stream hangs off this token.
    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState::new(&config, shutdown.clone()));
    let app = routes::router(state);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    info!(
        addr,
        interval_ms = config.stream.interval_ms,
        command_variant = ?config.command.variant,
        "frame-relay server starting"
    );
    info!("web interface: http://localhost:{}", config.server.port);
    info!("video feed endpoint: http://localhost:{}/api/video (POST)", config.server.port);
    info!("command endpoint: http://localhost:{}/api/command (POST)", config.server.port);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        eprintln!("Failed to bind to {addr}: {e}");
        std::process::exit(1);
    });

    let signal = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown requested, closing viewer streams");
            signal.cancel();
        })
        .await;

    if let Err(e) = served {
        error!(error = %e, "server terminated unexpectedly");
        std::process::exit(1);
    }
}
