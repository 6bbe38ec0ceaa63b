mod mjpeg;
mod relay;

use frame_relay_common::config::Config;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use relay::RelayClient;

#[derive(Debug, thiserror::Error)]
pub enum PusherError {
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("HTTP connection failed: {0}")]
    HttpConnect(reqwest::Error),
    #[error("HTTP stream error: {0}")]
    HttpStream(reqwest::Error),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("relay rejected frame with HTTP status {0}")]
    RelayStatus(u16),
}

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

    let pusher = &config.pusher;
    info!(
        relay = pusher.relay_url,
        source = pusher.source_url,
        mode = pusher.mode,
        "starting frame-relay pusher"
    );

    let relay = match RelayClient::new(&pusher.relay_url) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "failed to create relay client");
            std::process::exit(1);
        }
    };

    match pusher.mode.as_str() {
        "mjpeg" => {
            let url = format!("{}?quality={}&fps={}", pusher.source_url, pusher.quality, pusher.fps);
            mjpeg::run_mjpeg_pusher(&url, &relay).await;
        }
        "polling" => {
            let url = format!(
                "{}?quality={}",
                pusher.source_url.replace("/stream", "/frame"),
                pusher.quality
            );
            let interval = Duration::from_secs_f64(1.0 / pusher.fps);
            if let Err(e) = mjpeg::run_polling_pusher(&url, &relay, interval).await {
                error!(error = %e, "polling pusher stopped");
                std::process::exit(1);
            }
        }
        other => {
            error!(mode = other, "unknown pusher mode, expected 'mjpeg' or 'polling'");
            std::process::exit(1);
        }
    }
}
