//! Render target boundary
//!
//! The stage measures the container once and builds the render backend and
//! playable surfaces the controller drives.

use anyhow::{Context, Result};
use common::RenderBackendKind;

use crate::config::StageSettings;
use crate::output::{MappedOutput, parse_hex_color};
use crate::render::{Bounds, DirectDraw, RenderBackend, Viewport};
use crate::surface::PlayableSurface;
use crate::video::GstSurface;

pub trait Stage: Send {
    /// Measure the container in device pixels
    fn measure(&mut self) -> Viewport;

    fn create_backend(
        &mut self,
        kind: RenderBackendKind,
        viewport: &Viewport,
    ) -> Result<Box<dyn RenderBackend>>;

    /// Create the playable surface for slot `index`
    fn create_surface(&mut self, index: usize) -> Result<Box<dyn PlayableSurface>>;
}

/// Stage described by the `[stage]` configuration section
pub struct HostStage {
    settings: StageSettings,
}

impl HostStage {
    pub fn new(settings: StageSettings) -> Self {
        Self { settings }
    }

    fn clear_color(&self) -> Result<(u8, u8, u8, u8)> {
        parse_hex_color(&self.settings.clear_color)
            .with_context(|| format!("Invalid clear color: {}", self.settings.clear_color))
    }

    fn open_output(&self, viewport: &Viewport) -> Result<MappedOutput> {
        MappedOutput::create(
            self.settings.output_path(),
            viewport.surface_width,
            viewport.surface_height,
        )
    }
}

impl Stage for HostStage {
    fn measure(&mut self) -> Viewport {
        let bounds = Bounds {
            x: self.settings.x,
            y: self.settings.y,
            width: self.settings.width,
            height: self.settings.height,
        };
        Viewport::measure(bounds, self.settings.device_pixel_ratio)
    }

    fn create_backend(
        &mut self,
        kind: RenderBackendKind,
        viewport: &Viewport,
    ) -> Result<Box<dyn RenderBackend>> {
        let clear = self.clear_color()?;

        match kind {
            RenderBackendKind::DirectDraw => {
                let output = self.open_output(viewport)?;
                Ok(Box::new(DirectDraw::new(*viewport, clear, Box::new(output))?))
            }
            #[cfg(feature = "gpu")]
            RenderBackendKind::Composited => {
                let output = self.open_output(viewport)?;
                Ok(Box::new(crate::gpu::CompositedBackend::new(
                    *viewport,
                    clear,
                    Box::new(output),
                )?))
            }
            #[cfg(not(feature = "gpu"))]
            RenderBackendKind::Composited => anyhow::bail!("GPU support not compiled in"),
        }
    }

    fn create_surface(&mut self, index: usize) -> Result<Box<dyn PlayableSurface>> {
        Ok(Box::new(GstSurface::new(format!("surface {}", index))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_stage_measures_config_bounds() {
        let mut stage = HostStage::new(StageSettings {
            width: 640.0,
            height: 360.0,
            device_pixel_ratio: 2.0,
            ..Default::default()
        });

        let viewport = stage.measure();
        assert_eq!(viewport.surface_width, 1280);
        assert_eq!(viewport.surface_height, 720);
    }

    #[test]
    fn test_host_stage_direct_draw_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("frame.bgra");
        let mut stage = HostStage::new(StageSettings {
            width: 4.0,
            height: 2.0,
            output: output.display().to_string(),
            clear_color: "FF0000".to_string(),
            ..Default::default()
        });

        let viewport = stage.measure();
        let backend = stage
            .create_backend(RenderBackendKind::DirectDraw, &viewport)
            .unwrap();
        assert_eq!(backend.name(), "direct-draw");
        drop(backend);

        let bytes = std::fs::read(&output).unwrap();
        assert_eq!(bytes.len(), 4 * 2 * 4);
        assert_eq!(&bytes[..4], &[0, 0, 255, 255]);
    }
}
