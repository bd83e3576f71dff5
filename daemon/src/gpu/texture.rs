use anyhow::{Context, Result};

use crate::swap_red_blue;

/// A GPU texture plus its default view
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl GpuTexture {
    /// Format of offscreen render targets; read back as RGBA
    pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    /// Create an empty BGRA8 texture for video frames (GStreamer format)
    pub fn video_source(device: &wgpu::Device, width: u32, height: u32) -> Self {
        Self::create(
            device,
            "GPU Video Texture (BGRA)",
            width,
            height,
            wgpu::TextureFormat::Bgra8Unorm,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        )
    }

    /// Create an empty render target texture that can be read back
    pub fn render_target(device: &wgpu::Device, width: u32, height: u32) -> Self {
        Self::create(
            device,
            "GPU Render Target",
            width,
            height,
            Self::TARGET_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        )
    }

    fn create(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            width,
            height,
        }
    }

    /// Upload BGRA frame data directly (no CPU conversion)
    pub fn upload(&self, queue: &wgpu::Queue, data: &[u8]) -> Result<()> {
        let expected_size = (self.width * self.height * 4) as usize;
        if data.len() != expected_size {
            anyhow::bail!(
                "Invalid texture data size: expected {} bytes ({}x{} BGRA), got {} bytes",
                expected_size,
                self.width,
                self.height,
                data.len()
            );
        }

        queue.write_texture(
            self.texture.as_image_copy(),
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.width * 4),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );

        Ok(())
    }

    /// Read an RGBA render target back to CPU as packed BGRA
    pub fn read_to_bgra(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<u8>> {
        // Calculate aligned bytes per row (must be multiple of 256)
        let unpadded_bytes_per_row = self.width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let buffer_size = (padded_bytes_per_row * self.height) as wgpu::BufferAddress;

        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("GPU Texture Read Buffer"),
            size: buffer_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("GPU Texture Read Encoder"),
        });

        encoder.copy_texture_to_buffer(
            self.texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &staging_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );

        queue.submit(Some(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        let _ = device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        });

        rx.recv()
            .context("Failed to receive buffer mapping result")?
            .context("Failed to map GPU buffer")?;

        let data = buffer_slice.get_mapped_range();

        // Remove row padding
        let row_bytes = unpadded_bytes_per_row as usize;
        let mut pixels = Vec::with_capacity(row_bytes * self.height as usize);
        for row in data
            .chunks(padded_bytes_per_row as usize)
            .take(self.height as usize)
        {
            pixels.extend_from_slice(&row[..row_bytes]);
        }

        drop(data);
        staging_buffer.unmap();

        swap_red_blue!(pixels);
        Ok(pixels)
    }
}
