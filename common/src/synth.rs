use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use tracing::debug;

use crate::config::SynthConfig;
use crate::frame::Frame;

/// Placeholder image produced when no real frame has been ingested yet.
#[derive(Debug, Clone)]
pub struct SyntheticFrame {
    /// Counter value this image was rendered with (first call yields 1).
    pub counter: u64,
    pub jpeg: Bytes,
}

impl SyntheticFrame {
    /// Phase of the color field, `counter * 0.1`.
    pub fn phase(&self) -> f64 {
        phase(self.counter)
    }

    pub fn into_frame(self) -> Frame {
        Frame::from(self.jpeg)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    #[error("failed to encode synthetic frame: {0}")]
    Encode(#[from] image::ImageError),
}

/// Procedural test-pattern generator.
///
/// Clones share one counter, so every call across all viewers gets its own
/// strictly increasing value. The counter is independent of the frame store.
#[derive(Debug, Clone)]
pub struct FrameSynthesizer {
    counter: Arc<AtomicU64>,
    width: u32,
    height: u32,
    quality: u8,
}

impl FrameSynthesizer {
    pub fn new(config: &SynthConfig) -> Self {
        Self {
            counter: Arc::new(AtomicU64::new(0)),
            width: config.width,
            height: config.height,
            quality: config.quality,
        }
    }

    /// Render and JPEG-encode the next placeholder frame.
    ///
    /// CPU bound; async callers should run it on the blocking pool.
    pub fn next(&self) -> Result<SyntheticFrame, SynthError> {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let img = self.render(counter);

        let mut jpeg = Vec::with_capacity(64 * 1024);
        JpegEncoder::new_with_quality(&mut jpeg, self.quality).encode_image(&img)?;

        debug!(counter, bytes = jpeg.len(), "synthesized placeholder frame");
        Ok(SyntheticFrame {
            counter,
            jpeg: Bytes::from(jpeg),
        })
    }

    /// Raster for a given counter value, without touching the shared counter.
    pub fn render(&self, counter: u64) -> RgbImage {
        let t = phase(counter);
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let (x, y) = (x as f64, y as f64);
            Rgb([
                channel(x / 50.0 + t),
                channel(y / 50.0 + t),
                channel((x + y) / 100.0 + t),
            ])
        })
    }
}

fn phase(counter: u64) -> f64 {
    counter as f64 * 0.1
}

/// `128 + 127*sin(v)` truncated into a byte.
fn channel(v: f64) -> u8 {
    (128.0 + 127.0 * v.sin()) as u8
}
