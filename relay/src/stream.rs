use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use frame_relay_common::frame::{Frame, FrameStore};
use frame_relay_common::multipart::encode_part;
use frame_relay_common::synth::FrameSynthesizer;
use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

/// Fans the shared frame store out to any number of viewers.
///
/// Every viewer gets its own task with its own timer. On each tick the task
/// reads the store (falling back to a synthetic frame when it's empty) and
/// pushes one multipart part to the viewer's response body. Viewers are not
/// synchronized with each other.
#[derive(Clone)]
pub struct StreamMultiplexer {
    store: FrameStore,
    synth: FrameSynthesizer,
    interval: Duration,
    boundary: Arc<str>,
    shutdown: CancellationToken,
    next_viewer: Arc<AtomicU64>,
}

impl StreamMultiplexer {
    pub fn new(
        store: FrameStore,
        synth: FrameSynthesizer,
        interval: Duration,
        boundary: &str,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            synth,
            // `tokio::time::interval` panics on a zero period.
            interval: interval.max(Duration::from_millis(1)),
            boundary: Arc::from(boundary),
            shutdown,
            next_viewer: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Start streaming to a new viewer.
    ///
    /// The returned stream is the response body. Dropping it (client went away)
    /// or cancelling the server shutdown token stops the viewer's task.
    pub fn open(&self) -> ViewerStream {
        self.open_with(self.shutdown.child_token())
    }

    fn open_with(&self, cancel: CancellationToken) -> ViewerStream {
        let id = self.next_viewer.fetch_add(1, Ordering::Relaxed);
        // One slot: a part is only produced once the previous one was taken.
        let (tx, rx) = mpsc::channel(1);

        info!(viewer = id, interval_ms = self.interval.as_millis() as u64, "viewer connected");
        tokio::spawn(run_viewer(self.clone(), id, tx, cancel.clone()));

        ViewerStream {
            parts: ReceiverStream::new(rx),
            _guard: cancel.drop_guard(),
        }
    }

    /// Current frame as one encoded part, synthesizing when nothing was ingested.
    async fn next_part(&self) -> Option<Bytes> {
        let frame = self.store.get();
        let frame = if frame.is_empty() {
            self.synthesize().await?
        } else {
            frame
        };
        Some(encode_part(&self.boundary, frame.as_bytes()))
    }

    async fn synthesize(&self) -> Option<Frame> {
        let synth = self.synth.clone();
        match tokio::task::spawn_blocking(move || synth.next()).await {
            Ok(Ok(frame)) => Some(frame.into_frame()),
            Ok(Err(e)) => {
                warn!(error = %e, "failed to synthesize placeholder frame, skipping tick");
                None
            }
            Err(e) => {
                error!(error = %e, "spawn_blocking failed");
                None
            }
        }
    }
}

async fn run_viewer(
    mux: StreamMultiplexer,
    id: u64,
    tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(mux.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sent: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tx.closed() => break,
            _ = ticker.tick() => {}
        }

        let Some(part) = mux.next_part().await else {
            continue;
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent_ok = tx.send(part) => {
                if sent_ok.is_err() {
                    break;
                }
            }
        }
        sent += 1;
        if sent % 100 == 0 {
            debug!(viewer = id, parts = sent, "parts streamed");
        }
    }

    info!(viewer = id, parts = sent, "viewer disconnected");
}

/// Response body for one viewer: a never-ending sequence of multipart parts.
pub struct ViewerStream {
    parts: ReceiverStream<Bytes>,
    _guard: DropGuard,
}

impl Stream for ViewerStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.parts).poll_next(cx).map(|part| part.map(Ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_relay_common::config::SynthConfig;
    use frame_relay_common::multipart::MultipartParser;
    use futures_util::StreamExt;
    use tokio::time::timeout;

    fn multiplexer(store: FrameStore, shutdown: CancellationToken) -> StreamMultiplexer {
        let synth = FrameSynthesizer::new(&SynthConfig {
            width: 64,
            height: 36,
            quality: 80,
        });
        StreamMultiplexer::new(store, synth, Duration::from_millis(10), "frame", shutdown)
    }

    async fn next_payload(viewer: &mut ViewerStream) -> Bytes {
        let chunk = timeout(Duration::from_secs(5), viewer.next())
            .await
            .expect("timed out waiting for a part")
            .expect("stream ended early")
            .unwrap();
        let mut parts = MultipartParser::new("frame").push(&chunk);
        assert_eq!(parts.len(), 1, "each chunk carries exactly one part");
        parts.remove(0)
    }

    #[tokio::test]
    async fn empty_store_streams_synthetic_jpegs() {
        let mux = multiplexer(FrameStore::new(), CancellationToken::new());
        let mut viewer = mux.open();

        let first = next_payload(&mut viewer).await;
        let second = next_payload(&mut viewer).await;
        assert_eq!(&first[..2], &[0xFF, 0xD8]);
        assert_eq!(&second[..2], &[0xFF, 0xD8]);
        assert_ne!(first, second, "placeholder should animate between ticks");
    }

    #[tokio::test]
    async fn zero_interval_still_streams() {
        let store = FrameStore::new();
        store.set(vec![4, 2]);
        let synth = FrameSynthesizer::new(&SynthConfig::default());
        let mux = StreamMultiplexer::new(
            store,
            synth,
            Duration::ZERO,
            "frame",
            CancellationToken::new(),
        );
        let mut viewer = mux.open();
        assert_eq!(&next_payload(&mut viewer).await[..], &[4, 2]);
        assert_eq!(&next_payload(&mut viewer).await[..], &[4, 2]);
    }

    #[tokio::test]
    async fn ingested_frame_replaces_placeholder() {
        let store = FrameStore::new();
        let mux = multiplexer(store.clone(), CancellationToken::new());
        let mut viewer = mux.open();
        next_payload(&mut viewer).await;

        store.set(b"real camera frame".to_vec());
        // One buffered part and one in-flight part may predate the set.
        let mut stale = 0;
        while &next_payload(&mut viewer).await[..] != b"real camera frame" {
            stale += 1;
            assert!(stale <= 2, "ingested frame never reached the viewer");
        }
    }

    #[tokio::test]
    async fn part_framing_matches_payload_length() {
        let store = FrameStore::new();
        store.set(vec![0xAB; 3000]);
        let mux = multiplexer(store, CancellationToken::new());
        let mut viewer = mux.open();

        let chunk = timeout(Duration::from_secs(5), viewer.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(chunk.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 3000\r\n\r\n"));
        assert!(chunk.ends_with(b"\r\n"));
    }

    #[tokio::test]
    async fn cancelled_viewer_emits_at_most_one_more_part() {
        let shutdown = CancellationToken::new();
        let mux = multiplexer(FrameStore::new(), shutdown.clone());
        let cancel = shutdown.child_token();
        let mut viewer = mux.open_with(cancel.clone());
        next_payload(&mut viewer).await;

        cancel.cancel();
        let mut after_cancel = 0;
        while let Some(part) = timeout(Duration::from_secs(5), viewer.next()).await.unwrap() {
            part.unwrap();
            after_cancel += 1;
        }
        assert!(after_cancel <= 1, "got {after_cancel} parts after cancel");
        assert!(!shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn shutdown_stops_every_viewer() {
        let shutdown = CancellationToken::new();
        let store = FrameStore::new();
        store.set(vec![1, 2, 3]);
        let mux = multiplexer(store, shutdown.clone());
        let mut a = mux.open();
        let mut b = mux.open();
        next_payload(&mut a).await;
        next_payload(&mut b).await;

        shutdown.cancel();
        for viewer in [&mut a, &mut b] {
            let drained = timeout(Duration::from_secs(5), viewer.collect::<Vec<_>>())
                .await
                .unwrap();
            assert!(drained.len() <= 1);
        }
    }

    #[tokio::test]
    async fn dropping_the_body_cancels_the_viewer() {
        let shutdown = CancellationToken::new();
        let mux = multiplexer(FrameStore::new(), shutdown.clone());
        let token = shutdown.child_token();
        let viewer = mux.open_with(token.clone());
        assert!(!token.is_cancelled());

        drop(viewer);
        assert!(token.is_cancelled());
        assert!(!shutdown.is_cancelled(), "one viewer must not stop the others");
    }
}
