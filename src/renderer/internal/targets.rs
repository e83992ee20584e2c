use glam::UVec2;

use crate::asset::MeshResource;
use crate::error::RenderError;
use crate::gpu::{
    FramebufferHandle, GpuContext, GpuDevice, Key, PixelFormat, TextureDescriptor, TextureFilter,
    TextureHandle,
};
use crate::renderer::primitives::{cube_mesh, fullscreen_quad, upload_mesh};

pub(crate) enum DepthAttachment {
    None,
    Owned(PixelFormat),
    Shared(TextureHandle),
}

/// A framebuffer together with the textures it renders into.
#[derive(Debug)]
pub(crate) struct RenderTarget {
    pub framebuffer: FramebufferHandle,
    pub colors: Vec<TextureHandle>,
    pub depth: Option<TextureHandle>,
    owns_depth: bool,
    pub size: UVec2,
}

impl RenderTarget {
    pub fn new<D: GpuDevice>(
        ctx: &mut GpuContext<D>,
        label: &str,
        size: UVec2,
        color_formats: &[PixelFormat],
        depth: DepthAttachment,
    ) -> Result<Self, RenderError> {
        let device = ctx.device_mut();
        let framebuffer = device.create_framebuffer(label);

        let mut colors = Vec::with_capacity(color_formats.len());
        for (index, &format) in color_formats.iter().enumerate() {
            let texture = device.create_texture(
                &TextureDescriptor::new_2d(label, size, format).with_filter(TextureFilter::Linear),
                None,
            );
            device.set_color_attachment(framebuffer, index as u32, Some(texture));
            colors.push(texture);
        }

        let (depth, owns_depth) = match depth {
            DepthAttachment::None => (None, false),
            DepthAttachment::Owned(format) => {
                let texture =
                    device.create_texture(&TextureDescriptor::new_2d(label, size, format), None);
                (Some(texture), true)
            }
            DepthAttachment::Shared(texture) => (Some(texture), false),
        };
        device.set_depth_attachment(framebuffer, depth);

        if colors.is_empty() {
            device.disable_color_output(framebuffer);
        } else {
            device.setup_draw_buffers(framebuffer);
        }

        let target = Self {
            framebuffer,
            colors,
            depth,
            owns_depth,
            size,
        };
        let status = ctx.device().framebuffer_status(framebuffer);
        if !status.is_complete() {
            target.destroy(ctx);
            return Err(RenderError::FramebufferIncomplete {
                framebuffer: label.to_string(),
                status,
            });
        }
        Ok(target)
    }

    pub fn color(&self, index: usize) -> TextureHandle {
        self.colors.get(index).copied().unwrap_or_default()
    }

    pub fn destroy<D: GpuDevice>(self, ctx: &mut GpuContext<D>) {
        let device = ctx.device_mut();
        for texture in self.colors {
            device.destroy_texture(texture);
        }
        if let (true, Some(depth)) = (self.owns_depth, self.depth) {
            device.destroy_texture(depth);
        }
        device.destroy_framebuffer(self.framebuffer);
        ctx.invalidate();
    }
}

/// Fullscreen quad and unit cube shared by the screen-space passes.
pub(crate) struct ScreenGeometry {
    quad: MeshResource,
    cube: MeshResource,
}

impl ScreenGeometry {
    pub fn new<D: GpuDevice>(ctx: &mut GpuContext<D>) -> Result<Self, RenderError> {
        let (vertices, indices) = fullscreen_quad();
        let quad = upload_mesh(ctx, "FullscreenQuad", &vertices, &indices);
        let (vertices, indices) = cube_mesh();
        let cube = upload_mesh(ctx, "SkyboxCube", &vertices, &indices);
        if !quad.is_resident() || !cube.is_resident() {
            return Err(RenderError::missing("screen geometry"));
        }
        Ok(Self { quad, cube })
    }

    pub fn draw_quad<D: GpuDevice>(&self, ctx: &mut GpuContext<D>) {
        draw_mesh(ctx, &self.quad);
    }

    pub fn draw_cube<D: GpuDevice>(&self, ctx: &mut GpuContext<D>) {
        draw_mesh(ctx, &self.cube);
    }

    pub fn destroy<D: GpuDevice>(mut self, ctx: &mut GpuContext<D>) {
        self.quad.destroy(ctx);
        self.cube.destroy(ctx);
    }
}

fn draw_mesh<D: GpuDevice>(ctx: &mut GpuContext<D>, mesh: &MeshResource) {
    for submesh in &mesh.submeshes {
        if !submesh.vertex_array.is_null() {
            ctx.draw(submesh.vertex_array, 0, submesh.draw_count);
        }
    }
}
