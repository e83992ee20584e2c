use std::time::Duration;

use glam::UVec2;

use crate::error::RenderError;
use crate::gpu::{
    BufferDescriptor, BufferHandle, BufferUsage, ClearFlags, FenceHandle, GpuContext, GpuDevice,
    MapAccess, PixelFormat, Viewport,
};
use crate::renderer::batch::MeshBatch;
use crate::renderer::uniforms::{self, CameraUniforms};
use crate::scene::ActorId;

use super::pipeline;
use super::shaders::BuiltinShaders;
use super::targets::{DepthAttachment, RenderTarget};

/// Actor ids of the last frame whose readback has completed. Row 0 is the
/// bottom of the screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedHitMap {
    size: UVec2,
    ids: Vec<u32>,
}

impl CachedHitMap {
    pub fn new(size: UVec2, ids: Vec<u32>) -> Self {
        Self { size, ids }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.x
    }

    pub fn height(&self) -> u32 {
        self.size.y
    }

    pub fn actor_at(&self, x: u32, y: u32) -> Option<ActorId> {
        if x >= self.size.x || y >= self.size.y {
            return None;
        }
        match self.ids.get((y * self.size.x + x) as usize) {
            Some(0) | None => None,
            Some(&id) => Some(id),
        }
    }
}

/// Renders actor ids into an integer target and reads it back without
/// stalling: the copy lands in a pixel buffer and is picked up once its fence
/// has signaled.
pub(crate) struct HitMapPass {
    target: RenderTarget,
    pixel_buffer: BufferHandle,
    pending: Option<FenceHandle>,
    cached: Option<CachedHitMap>,
}

impl HitMapPass {
    pub fn new<D: GpuDevice>(ctx: &mut GpuContext<D>, size: UVec2) -> Result<Self, RenderError> {
        let target = RenderTarget::new(
            ctx,
            "HitMap",
            size,
            &[PixelFormat::R32UI],
            DepthAttachment::Owned(PixelFormat::Depth24),
        )?;
        let pixel_buffer = ctx.device_mut().create_buffer(&BufferDescriptor {
            label: "HitMapReadback",
            size: size.x as u64 * size.y as u64 * PixelFormat::R32UI.bytes_per_pixel() as u64,
            usage: BufferUsage::STREAM | BufferUsage::MAP_READ,
        });
        Ok(Self {
            target,
            pixel_buffer,
            pending: None,
            cached: None,
        })
    }

    pub fn render<D: GpuDevice>(
        &mut self,
        ctx: &mut GpuContext<D>,
        shaders: &BuiltinShaders,
        batches: &[MeshBatch],
        camera: &CameraUniforms,
    ) {
        ctx.configure_pipeline_state(&pipeline::hit_map());
        ctx.bind_framebuffer(Some(self.target.framebuffer));
        let viewport = Viewport::from_size(self.target.size);
        ctx.set_viewport(viewport);
        ctx.device_mut()
            .clear(ClearFlags::COLOR | ClearFlags::DEPTH, [0.0; 4], 1.0);

        let shader = shaders.hit_map;
        ctx.use_shader(shader);
        camera.apply(ctx, shader);
        for batch in batches {
            ctx.device_mut().set_uniform(
                shader,
                uniforms::MESH_BATCH_OFFSET,
                batch.batched_so_far.into(),
            );
            ctx.draw_instanced(batch.vertex_array(), 0, batch.draw_count, batch.size());
        }

        // One readback in flight at a time.
        if self.pending.is_none() {
            let device = ctx.device_mut();
            device.read_pixels_into_buffer(self.target.framebuffer, 0, viewport, self.pixel_buffer);
            self.pending = Some(device.create_fence());
        }
    }

    /// Non-blocking check for a finished readback. Returns `true` when the
    /// cached hit map was refreshed.
    pub fn poll<D: GpuDevice>(&mut self, ctx: &mut GpuContext<D>) -> bool {
        let Some(fence) = self.pending else {
            return false;
        };
        let device = ctx.device_mut();
        if !device.wait_fence(fence, Duration::ZERO) {
            return false;
        }
        device.free_fence(fence);
        self.pending = None;

        let size = self.target.size;
        let len = size.x as u64 * size.y as u64 * 4;
        let ids = match device.map_buffer_range(self.pixel_buffer, MapAccess::READ, 0, len) {
            Some(bytes) => bytes
                .chunks_exact(4)
                .map(|px| u32::from_ne_bytes([px[0], px[1], px[2], px[3]]))
                .collect(),
            None => {
                log::error!("Failed to map the hit map readback buffer");
                return false;
            }
        };
        device.unmap_buffer(self.pixel_buffer);
        self.cached = Some(CachedHitMap::new(size, ids));
        true
    }

    pub fn cached(&self) -> Option<&CachedHitMap> {
        self.cached.as_ref()
    }

    pub fn texture(&self) -> crate::gpu::TextureHandle {
        self.target.color(0)
    }

    pub fn destroy<D: GpuDevice>(self, ctx: &mut GpuContext<D>) {
        let device = ctx.device_mut();
        if let Some(fence) = self.pending {
            device.free_fence(fence);
        }
        device.destroy_buffer(self.pixel_buffer);
        self.target.destroy(ctx);
    }
}
