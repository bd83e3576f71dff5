//! Video decoding for playable surfaces
//!
//! - `pipeline`: GStreamer pipeline setup and the appsink frame callback
//! - `frames`: frame hand-off between the streaming thread and the tick
//! - `stats`: presented/dropped frame counters
//! - `player`: [`GstSurface`], the [`PlayableSurface`](crate::surface::PlayableSurface) implementation
//!
//! # Architecture
//!
//! 1. `uridecodebin` picks a decoder for the clip URI
//! 2. `videoconvert` converts to BGRA
//! 3. Frames are delivered to the `AppSink` callback
//! 4. The controller drains bus messages as surface signals every tick

#[cfg(feature = "video")]
mod frames;
#[cfg(feature = "video")]
mod pipeline;
#[cfg(feature = "video")]
mod player;
#[cfg(feature = "video")]
mod stats;

#[cfg(feature = "video")]
pub use player::GstSurface;

#[cfg(not(feature = "video"))]
pub use player_stub::GstSurface;

#[cfg(not(feature = "video"))]
mod player_stub {
    use anyhow::Result;

    use crate::resolver::ClipHandle;
    use crate::surface::{PlayableSurface, SurfaceSignal, VideoFrame};

    /// Stub surface when video feature is disabled
    pub struct GstSurface;

    impl GstSurface {
        pub fn new(_name: impl Into<String>) -> Result<Self> {
            anyhow::bail!("Video support not compiled in")
        }
    }

    impl PlayableSurface for GstSurface {
        fn set_source(&mut self, _handle: &ClipHandle) -> Result<()> {
            anyhow::bail!("Video support not compiled in")
        }

        fn play(&mut self) -> Result<()> {
            anyhow::bail!("Video support not compiled in")
        }

        fn poll_signals(&mut self) -> Vec<SurfaceSignal> {
            Vec::new()
        }

        fn take_frame(&mut self) -> Option<VideoFrame> {
            None
        }

        fn release(&mut self) {}
    }
}
