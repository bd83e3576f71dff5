use anyhow::{Context, Result};
use fast_image_resize as fr;

use super::{RenderBackend, Viewport};
use crate::output::OutputSurface;
use crate::surface::VideoFrame;

/// CPU canvas that frames are copied onto at a fixed destination rectangle
pub struct DirectDraw {
    viewport: Viewport,
    canvas: Vec<u8>,
    output: Box<dyn OutputSurface>,
    resizer: fr::Resizer,
    frames_drawn: u64,
}

impl DirectDraw {
    /// Create the canvas, clear it to `clear` (RGBA) and present it once
    pub fn new(
        viewport: Viewport,
        clear: (u8, u8, u8, u8),
        mut output: Box<dyn OutputSurface>,
    ) -> Result<Self> {
        let (r, g, b, a) = clear;
        let canvas = [b, g, r, a].repeat(viewport.surface_len() / 4);

        output
            .present(&canvas, viewport.surface_width, viewport.surface_height)
            .context("Failed to clear output surface")?;

        log::info!(
            "Direct draw canvas {}x{}, destination {:?}",
            viewport.surface_width,
            viewport.surface_height,
            viewport.dest
        );

        Ok(Self {
            viewport,
            canvas,
            output,
            resizer: fr::Resizer::new(),
            frames_drawn: 0,
        })
    }

    /// Resize a frame to the destination rectangle size
    fn scale_to_dest(&mut self, frame: &VideoFrame) -> Result<Vec<u8>> {
        let dest = self.viewport.dest;

        let src = fr::images::Image::from_vec_u8(
            frame.width,
            frame.height,
            frame.data.clone(),
            fr::PixelType::U8x4,
        )
        .context("Failed to create source image")?;

        let mut dst = fr::images::Image::new(dest.width, dest.height, fr::PixelType::U8x4);

        self.resizer
            .resize(
                &src,
                &mut dst,
                &fr::ResizeOptions::new()
                    .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3)),
            )
            .context("Failed to resize frame")?;

        Ok(dst.into_vec())
    }

    /// Copy packed destination-sized pixels into the canvas row by row
    fn blit(&mut self, pixels: &[u8]) {
        let dest = self.viewport.dest;
        let canvas_stride = self.viewport.surface_width as usize * 4;
        let row_bytes = dest.width as usize * 4;
        let x_offset = dest.x as usize * 4;

        for (row, src_row) in pixels.chunks_exact(row_bytes).enumerate() {
            let start = (dest.y as usize + row) * canvas_stride + x_offset;
            if let Some(dst_row) = self.canvas.get_mut(start..start + row_bytes) {
                dst_row.copy_from_slice(src_row);
            }
        }
    }
}

impl RenderBackend for DirectDraw {
    fn draw(&mut self, frame: &VideoFrame) -> Result<()> {
        if !frame.is_valid() {
            anyhow::bail!("Malformed frame: {:?}", frame);
        }

        let dest = self.viewport.dest;
        if frame.width == dest.width && frame.height == dest.height {
            self.blit(&frame.data);
        } else {
            let scaled = self.scale_to_dest(frame)?;
            self.blit(&scaled);
        }

        self.output.present(
            &self.canvas,
            self.viewport.surface_width,
            self.viewport.surface_height,
        )?;
        self.frames_drawn += 1;

        if self.frames_drawn == 1 {
            log::debug!(
                "First frame drawn ({}x{} -> {}x{})",
                frame.width,
                frame.height,
                dest.width,
                dest.height
            );
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "direct-draw"
    }
}
