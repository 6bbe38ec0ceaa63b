use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use frame_relay_common::command::{CommandAck, CommandRelay, LogActuator};
use frame_relay_common::config::Config;
use frame_relay_common::frame::FrameStore;
use frame_relay_common::multipart::stream_content_type;
use frame_relay_common::synth::FrameSynthesizer;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use crate::stream::StreamMultiplexer;

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub store: FrameStore,
    pub multiplexer: StreamMultiplexer,
    pub commands: CommandRelay,
    pub template_path: PathBuf,
}

impl AppState {
    pub fn new(config: &Config, shutdown: CancellationToken) -> Self {
        let store = FrameStore::new();
        let multiplexer = StreamMultiplexer::new(
            store.clone(),
            FrameSynthesizer::new(&config.synth),
            Duration::from_millis(config.stream.interval_ms),
            &config.stream.boundary,
            shutdown,
        );
        Self {
            store,
            multiplexer,
            commands: CommandRelay::new(Arc::new(LogActuator), config.command.variant),
            template_path: PathBuf::from(&config.server.template_path),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/video", get(stream_video))
        .route("/api/video", post(ingest_video))
        .route("/api/command", post(send_command))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET / — HTML shell that embeds `/video` and the steering controls
async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match tokio::fs::read_to_string(&state.template_path).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(path = %state.template_path.display(), error = %e, "failed to load template");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to load template").into_response()
        }
    }
}

/// GET /video — endless multipart/x-mixed-replace stream, one part per tick
async fn stream_video(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let viewer = state.multiplexer.open();
    (
        [(
            header::CONTENT_TYPE,
            stream_content_type(state.multiplexer.boundary()),
        )],
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(viewer),
    )
}

/// POST /api/video — replace the current frame with the raw request body
async fn ingest_video(State(state): State<Arc<AppState>>, body: Body) -> impl IntoResponse {
    // No size cap on uploads; the body is consumed (and released) either way.
    match axum::body::to_bytes(body, usize::MAX).await {
        Ok(frame) => {
            debug!(bytes = frame.len(), "frame ingested");
            state.store.set(frame);
            StatusCode::OK.into_response()
        }
        Err(e) => {
            warn!(error = %e, "failed to read frame upload");
            (StatusCode::BAD_REQUEST, "failed to read body").into_response()
        }
    }
}

/// POST /api/command — validate a steering command and hand it to the actuator
/// Body: { "angle": f64, "intensity": f64, "x": f64, "y": f64 } or { "command": "left" }
async fn send_command(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    match state.commands.relay(&body) {
        Ok(command) => Json(CommandAck::ok(command)).into_response(),
        Err(e) => {
            warn!(error = %e, sink = state.commands.sink_name(), "rejected command");
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}
