//! Composited render backend
//!
//! Built once at `init`: a plane mesh, an orthographic camera framing it and
//! a render pipeline. Each draw uploads the frame into the plane's texture,
//! renders the scene into an offscreen target and presents the read-back
//! pixels.

use anyhow::{Context, Result};
use wgpu::util::DeviceExt;

use super::context::GpuContext;
use super::plane_pipeline::PlanePipeline;
use super::texture::GpuTexture;
use crate::output::OutputSurface;
use crate::render::scene::{CameraUniform, Scene};
use crate::render::{RenderBackend, Viewport};
use crate::surface::VideoFrame;

/// Plane texture plus the bind group that samples it
struct FrameTexture {
    texture: GpuTexture,
    bind_group: wgpu::BindGroup,
}

pub struct CompositedBackend {
    context: GpuContext,
    viewport: Viewport,
    scene: Scene,
    pipeline: wgpu::RenderPipeline,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    camera_bind_group: wgpu::BindGroup,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    frame_texture: Option<FrameTexture>,
    target: GpuTexture,
    clear: wgpu::Color,
    output: Box<dyn OutputSurface>,
    frames_drawn: u64,
}

impl CompositedBackend {
    pub fn new(
        viewport: Viewport,
        clear: (u8, u8, u8, u8),
        output: Box<dyn OutputSurface>,
    ) -> Result<Self> {
        let context = pollster::block_on(GpuContext::new())?;
        context.check_texture_size(viewport.surface_width, viewport.surface_height)?;

        let device = &context.device;
        let scene = Scene::framed_plane();

        let plane = PlanePipeline::new(device, GpuTexture::TARGET_FORMAT);

        let camera_uniform = CameraUniform::from(&scene.camera);
        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Uniform Buffer"),
            contents: bytemuck::bytes_of(&camera_uniform),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera Bind Group"),
            layout: &plane.camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Plane Vertex Buffer"),
            contents: bytemuck::cast_slice(&scene.plane.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Plane Index Buffer"),
            contents: bytemuck::cast_slice(&scene.plane.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Frame Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let target =
            GpuTexture::render_target(device, viewport.surface_width, viewport.surface_height);

        let (r, g, b, a) = clear;
        let clear = wgpu::Color {
            r: r as f64 / 255.0,
            g: g as f64 / 255.0,
            b: b as f64 / 255.0,
            a: a as f64 / 255.0,
        };

        log::info!(
            "Composited backend ready: {}x{} target, plane viewport {:?}",
            viewport.surface_width,
            viewport.surface_height,
            viewport.dest
        );

        Ok(Self {
            context,
            viewport,
            scene,
            pipeline: plane.pipeline,
            texture_layout: plane.texture_layout,
            sampler,
            camera_bind_group,
            vertex_buffer,
            index_buffer,
            frame_texture: None,
            target,
            clear,
            output,
            frames_drawn: 0,
        })
    }

    /// Reuse the plane texture unless the frame size changed
    fn ensure_frame_texture(&mut self, width: u32, height: u32) -> Result<()> {
        let stale = self
            .frame_texture
            .as_ref()
            .is_none_or(|t| t.texture.width != width || t.texture.height != height);

        if stale {
            self.context.check_texture_size(width, height)?;
            let texture = GpuTexture::video_source(&self.context.device, width, height);
            let bind_group = self
                .context
                .device
                .create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Frame Texture Bind Group"),
                    layout: &self.texture_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&texture.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&self.sampler),
                        },
                    ],
                });
            log::debug!("Allocated {}x{} plane texture", width, height);
            self.frame_texture = Some(FrameTexture {
                texture,
                bind_group,
            });
        }

        Ok(())
    }

    fn render_scene(&self, frame_texture: &FrameTexture) {
        let dest = self.viewport.dest;
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Scene Encoder"),
                });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            render_pass.set_viewport(
                dest.x as f32,
                dest.y as f32,
                dest.width as f32,
                dest.height as f32,
                0.0,
                1.0,
            );
            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &self.camera_bind_group, &[]);
            render_pass.set_bind_group(1, &frame_texture.bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            render_pass.draw_indexed(0..self.scene.plane.indices.len() as u32, 0, 0..1);
        }

        self.context.queue.submit(std::iter::once(encoder.finish()));
    }
}

impl RenderBackend for CompositedBackend {
    fn draw(&mut self, frame: &VideoFrame) -> Result<()> {
        if !frame.is_valid() {
            anyhow::bail!("Malformed frame: {:?}", frame);
        }

        self.ensure_frame_texture(frame.width, frame.height)?;
        let frame_texture = self
            .frame_texture
            .as_ref()
            .context("Plane texture missing")?;
        frame_texture
            .texture
            .upload(&self.context.queue, &frame.data)?;

        self.render_scene(frame_texture);

        let pixels = self
            .target
            .read_to_bgra(&self.context.device, &self.context.queue)?;
        self.output.present(
            &pixels,
            self.viewport.surface_width,
            self.viewport.surface_height,
        )?;

        self.frames_drawn += 1;
        if self.frames_drawn == 1 {
            log::debug!(
                "First composited frame ({}x{} texture)",
                frame.width,
                frame.height
            );
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "composited"
    }
}
