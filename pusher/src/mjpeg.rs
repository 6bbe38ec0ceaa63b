use frame_relay_common::multipart::MultipartParser;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::relay::RelayClient;
use crate::PusherError;

static SEQ_COUNTER: AtomicU64 = AtomicU64::new(0);

const DEFAULT_BOUNDARY: &str = "frame";

/// Consume the camera's MJPEG stream and push every frame to the relay.
/// Reconnects with exponential backoff on failure.
pub async fn run_mjpeg_pusher(stream_url: &str, relay: &RelayClient) {
    let mut backoff = Duration::from_secs(2);
    let max_backoff = Duration::from_secs(30);

    loop {
        info!(url = stream_url, "connecting to MJPEG stream");
        match consume_stream(stream_url, relay).await {
            Ok(()) => {
                info!("stream ended cleanly, reconnecting");
                backoff = Duration::from_secs(2);
            }
            Err(e) => {
                error!(error = %e, "stream error, reconnecting in {:?}", backoff);
            }
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(max_backoff);
    }
}

async fn consume_stream(url: &str, relay: &RelayClient) -> Result<(), PusherError> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(PusherError::Client)?;
    let response = client
        .get(url)
        .send()
        .await
        .map_err(PusherError::HttpConnect)?;

    if !response.status().is_success() {
        return Err(PusherError::HttpStatus(response.status().as_u16()));
    }

    let boundary = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(boundary_from_content_type)
        .unwrap_or(DEFAULT_BOUNDARY)
        .to_string();
    info!(status = %response.status(), boundary, "connected to MJPEG stream");

    let mut byte_stream = response.bytes_stream();
    let mut parser = MultipartParser::new(&boundary);

    while let Some(chunk) = byte_stream.next().await {
        let chunk = chunk.map_err(PusherError::HttpStream)?;
        for frame in parser.push(&chunk) {
            if frame.is_empty() {
                continue;
            }
            let seq = SEQ_COUNTER.fetch_add(1, Ordering::Relaxed);
            debug!(seq, bytes = frame.len(), "pushing frame to relay");
            // A rejected upload only loses this frame; the next one replaces it anyway.
            if let Err(e) = relay.push(frame).await {
                warn!(error = %e, seq, "failed to push frame to relay");
            }
        }
    }

    Ok(())
}

/// Polling-based fallback: periodically fetch single frames.
pub async fn run_polling_pusher(
    frame_url: &str,
    relay: &RelayClient,
    interval: Duration,
) -> Result<(), PusherError> {
    let client = reqwest::Client::new();
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        match client.get(frame_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let frame = resp.bytes().await.map_err(PusherError::HttpStream)?;
                let seq = SEQ_COUNTER.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = relay.push(frame).await {
                    warn!(error = %e, seq, "failed to push frame to relay");
                }
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "non-success response from camera");
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch camera frame");
            }
        }
    }
}

/// Extract `boundary=...` from a `multipart/x-mixed-replace` content type.
fn boundary_from_content_type(content_type: &str) -> Option<&str> {
    content_type.split(';').find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        key.eq_ignore_ascii_case("boundary")
            .then(|| value.trim_matches('"'))
            .filter(|b| !b.is_empty())
    })
}
