use anyhow::Result;

use crate::resolver::ClipHandle;
use crate::surface::{PlayableSurface, SurfaceSignal};

/// One playable surface and what it reported for its current load
pub(super) struct SurfaceSlot {
    pub surface: Box<dyn PlayableSurface>,
    /// Clip index of the current load
    pub clip: Option<usize>,
    /// `Some(duration)` once metadata arrived
    pub ready: Option<Option<u64>>,
    pub ended: bool,
    pub error: Option<String>,
}

impl SurfaceSlot {
    pub fn new(surface: Box<dyn PlayableSurface>) -> Self {
        Self {
            surface,
            clip: None,
            ready: None,
            ended: false,
            error: None,
        }
    }

    fn clear_signals(&mut self) {
        self.ready = None;
        self.ended = false;
        self.error = None;
    }

    /// Point the surface at `handle`; signals of the previous load are forgotten
    pub fn load(&mut self, index: usize, handle: &ClipHandle) -> Result<()> {
        self.clear_signals();
        self.clip = Some(index);
        self.surface.set_source(handle)
    }

    /// Whether this slot holds a healthy load of clip `index`
    pub fn holds(&self, index: usize) -> bool {
        self.clip == Some(index) && self.error.is_none()
    }

    /// Record the signals emitted since the last tick
    pub fn poll(&mut self, slot: usize) {
        for signal in self.surface.poll_signals() {
            let Some(clip) = self.clip else {
                log::debug!("discarding {:?} from idle surface {}", signal, slot);
                continue;
            };

            match signal {
                SurfaceSignal::MetadataReady { duration_ms } => {
                    log::debug!(
                        "surface {}: clip {} ready (duration {:?} ms)",
                        slot,
                        clip,
                        duration_ms
                    );
                    self.ready = Some(duration_ms);
                }
                SurfaceSignal::Ended => self.ended = true,
                SurfaceSignal::Error(message) => {
                    if self.error.is_none() {
                        self.error = Some(message);
                    }
                }
                SurfaceSignal::Observed(event) => {
                    log::trace!("surface {}: clip {} {:?}", slot, clip, event);
                }
            }
        }
    }

    pub fn release(&mut self) {
        self.surface.release();
        self.clear_signals();
        self.clip = None;
    }
}
