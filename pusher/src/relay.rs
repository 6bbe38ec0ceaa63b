use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

use crate::PusherError;

/// Uploads frames to a relay's ingest endpoint (`POST /api/video`).
#[derive(Clone)]
pub struct RelayClient {
    client: reqwest::Client,
    ingest_url: String,
}

impl RelayClient {
    pub fn new(relay_url: &str) -> Result<Self, PusherError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(PusherError::Client)?;
        Ok(Self {
            client,
            ingest_url: format!("{}/api/video", relay_url.trim_end_matches('/')),
        })
    }

    pub async fn push(&self, frame: Bytes) -> Result<(), PusherError> {
        let bytes = frame.len();
        let response = self
            .client
            .post(&self.ingest_url)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(frame)
            .send()
            .await
            .map_err(PusherError::HttpConnect)?;

        if !response.status().is_success() {
            return Err(PusherError::RelayStatus(response.status().as_u16()));
        }
        debug!(bytes, "frame pushed to relay");
        Ok(())
    }
}
