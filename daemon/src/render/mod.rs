//! Render backends
//!
//! A backend turns the active surface's newest frame into output pixels.
//! Two strategies exist:
//!
//! - [`DirectDraw`]: CPU copy of the frame into a destination rectangle
//! - `CompositedBackend` (`gpu` feature): textured plane through an orthographic camera
//!
//! Both are sized once from a [`Viewport`] measured at `init`.

mod direct;
pub mod scene;

pub use direct::DirectDraw;

use anyhow::Result;

use crate::surface::VideoFrame;

/// Largest output side in device pixels (wgpu's default 2D texture limit)
pub const MAX_SURFACE_SIDE: u32 = 8192;

/// Measured container bounds in device-independent pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Destination rectangle in device pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Output surface size plus the rectangle frames are drawn into
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub surface_width: u32,
    pub surface_height: u32,
    pub dest: Rect,
    pub device_pixel_ratio: f64,
}

impl Viewport {
    /// Scale measured bounds by the device pixel ratio
    ///
    /// Sizes are floored and never below one pixel. The surface extends far
    /// enough to hold the destination rectangle at its offset, saturating at
    /// `u32::MAX`; [`Config`](crate::config::Config) keeps configured stages
    /// within [`MAX_SURFACE_SIDE`].
    pub fn measure(bounds: Bounds, device_pixel_ratio: f64) -> Self {
        let scale = |v: f64| (v.max(0.0) * device_pixel_ratio).floor() as u32;

        let dest = Rect {
            x: scale(bounds.x),
            y: scale(bounds.y),
            width: scale(bounds.width).max(1),
            height: scale(bounds.height).max(1),
        };

        Self {
            surface_width: dest.x.saturating_add(dest.width),
            surface_height: dest.y.saturating_add(dest.height),
            dest,
            device_pixel_ratio,
        }
    }

    /// Bytes in one BGRA output frame
    pub fn surface_len(&self) -> usize {
        self.surface_width as usize * self.surface_height as usize * 4
    }
}

pub trait RenderBackend: Send {
    /// Draw one frame and present the result on the output surface
    fn draw(&mut self, frame: &VideoFrame) -> Result<()>;

    fn name(&self) -> &'static str;
}
