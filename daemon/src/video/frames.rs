//! Frame hand-off between the GStreamer streaming thread and the tick

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
#[cfg(feature = "profiling")]
use std::time::Instant;

use crate::surface::VideoFrame;

/// Single-frame mailbox shared with the appsink callback
///
/// Only the newest frame is kept. A frame replaced before the tick took it
/// counts as dropped.
#[derive(Clone, Default)]
pub struct FrameMailbox {
    inner: Arc<Mailbox>,
}

#[derive(Default)]
struct Mailbox {
    frame: Mutex<Option<VideoFrame>>,
    fresh: AtomicBool,
    dropped: AtomicU64,
    #[cfg(feature = "profiling")]
    delivered_at: Mutex<Option<Instant>>,
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Streaming thread side
    pub fn deposit(&self, frame: VideoFrame) {
        let Ok(mut slot) = self.inner.frame.lock() else {
            return;
        };

        if self.inner.fresh.load(Ordering::Relaxed) {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            log::trace!("Video frame dropped (previous frame not consumed in time)");
        }

        *slot = Some(frame);
        self.inner.fresh.store(true, Ordering::Release);

        #[cfg(feature = "profiling")]
        if let Ok(mut delivered_at) = self.inner.delivered_at.lock() {
            *delivered_at = Some(Instant::now());
        }
    }

    /// Tick side: the newest frame, once
    pub fn take(&self) -> Option<VideoFrame> {
        if !self.inner.fresh.swap(false, Ordering::AcqRel) {
            return None;
        }
        self.inner.frame.lock().ok()?.take()
    }

    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    #[cfg(feature = "profiling")]
    pub fn delivered_at(&self) -> Option<Instant> {
        *self.inner.delivered_at.lock().ok()?
    }
}
