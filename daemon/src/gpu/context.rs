//! Headless wgpu device for offscreen composition

use anyhow::{Context, Result};

pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    adapter: String,
    max_texture_side: u32,
}

impl GpuContext {
    /// Open the preferred adapter without a presentation surface
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::default();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("No GPU adapter available for composition")?;

        let info = adapter.get_info();
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Clipchain Compositor"),
                ..Default::default()
            })
            .await
            .with_context(|| format!("Failed to open GPU device on {}", info.name))?;

        let max_texture_side = device.limits().max_texture_dimension_2d;
        log::info!(
            "Compositing on {} ({:?}), textures up to {}px",
            info.name,
            info.backend,
            max_texture_side
        );

        Ok(Self {
            device,
            queue,
            adapter: info.name,
            max_texture_side,
        })
    }

    /// Fail early when a texture of this size cannot exist on the device
    pub fn check_texture_size(&self, width: u32, height: u32) -> Result<()> {
        if width > self.max_texture_side || height > self.max_texture_side {
            anyhow::bail!(
                "{}x{} exceeds the {}px texture limit of {}",
                width,
                height,
                self.max_texture_side,
                self.adapter
            );
        }
        Ok(())
    }
}
