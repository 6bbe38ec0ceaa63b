use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;

/// One encoded image as pushed by a producer (usually JPEG).
///
/// The payload is opaque: nothing in the relay inspects or validates it.
/// Cloning is cheap, the bytes are reference counted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
}

impl Frame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// An empty frame means "nothing ingested yet".
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<Bytes> for Frame {
    fn from(data: Bytes) -> Self {
        Self { data }
    }
}

/// Latest-frame buffer shared between the ingest endpoint and every viewer.
///
/// Each `set` replaces the whole frame (last writer wins, no queueing), and
/// readers always observe one complete frame. Readers only hold the lock long
/// enough to clone the handle, so concurrent viewers never wait on each other.
#[derive(Debug, Clone, Default)]
pub struct FrameStore {
    current: Arc<RwLock<Frame>>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, frame: impl Into<Frame>) {
        let frame = frame.into();
        // A panicked writer can't leave a half-written frame behind, so poison is ignored.
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = frame;
    }

    pub fn get(&self) -> Frame {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_before_first_set() {
        let store = FrameStore::new();
        assert!(store.get().is_empty());
        assert_eq!(store.get().len(), 0);
    }

    #[test]
    fn get_returns_last_set() {
        let store = FrameStore::new();
        store.set(vec![0xFF, 0xD8, 0xFF, 0xE0]);
        assert_eq!(store.get().as_bytes(), &[0xFF, 0xD8, 0xFF, 0xE0]);

        store.set(Bytes::from_static(b"second"));
        assert_eq!(store.get().as_bytes(), b"second");
    }

    #[test]
    fn clones_share_the_same_buffer() {
        let store = FrameStore::new();
        let writer = store.clone();
        writer.set(vec![1, 2, 3]);
        assert_eq!(store.get().as_bytes(), &[1, 2, 3]);
    }

    #[test]
    fn readers_never_see_torn_frames() {
        let store = FrameStore::new();
        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..500u32 {
                    let fill = (i % 251) as u8;
                    store.set(vec![fill; 4096 + (i as usize % 7)]);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let frame = store.get();
                        if let Some(&first) = frame.as_bytes().first() {
                            assert!(frame.as_bytes().iter().all(|&b| b == first));
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
