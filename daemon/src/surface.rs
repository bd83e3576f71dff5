//! Playable surface contract
//!
//! A surface wraps one video-decoding resource. The controller commands it
//! (`set_source`, `play`) and drains its lifecycle signals once per tick.

use anyhow::Result;
use std::fmt;

use crate::resolver::ClipHandle;

/// Decoded BGRA frame
#[derive(Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    /// Frame filled with one BGRA pixel value
    pub fn solid(width: u32, height: u32, bgra: [u8; 4]) -> Self {
        let data = bgra.repeat((width * height) as usize);
        Self::new(width, height, data)
    }

    pub fn stride(&self) -> usize {
        self.width as usize * 4
    }

    /// Whether `data` holds exactly `width * height` BGRA pixels
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.stride() * self.height as usize
    }
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Lifecycle events that are reported but never move the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Waiting,
    Playing,
    Pause,
    RateChange,
    Suspend,
    Emptied,
    DurationChange,
    Buffering(u8),
}

/// Signals a surface emits for the source it currently holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceSignal {
    /// Source is loaded; duration is `None` for streams that cannot report one
    MetadataReady { duration_ms: Option<u64> },
    Ended,
    Error(String),
    Observed(LifecycleEvent),
}

pub trait PlayableSurface: Send {
    /// Begin loading `handle`, replacing the current source
    ///
    /// Signals still pending for the replaced source must not be reported
    /// afterwards.
    fn set_source(&mut self, handle: &ClipHandle) -> Result<()>;

    /// Start playback of the loaded source from its current position
    fn play(&mut self) -> Result<()>;

    /// Drain signals emitted since the last call
    fn poll_signals(&mut self) -> Vec<SurfaceSignal>;

    /// Newest decoded frame, if one arrived since the last call
    fn take_frame(&mut self) -> Option<VideoFrame>;

    /// Stop decoding and drop the current source
    fn release(&mut self);
}
