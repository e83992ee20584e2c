use glam::UVec2;

use crate::error::RenderError;
use crate::gpu::{ClearFlags, GpuContext, GpuDevice, PixelFormat, TextureHandle, Viewport};
use crate::renderer::internal::{pipeline, BuiltinShaders, DepthAttachment, RenderTarget, ScreenGeometry};
use crate::renderer::uniforms;

pub const OUTPUT_FORMAT: PixelFormat = PixelFormat::RGBA8;

/// Gamma correction into a pair of output textures. Frame `n` writes
/// `outputs[n % 2]`, so the previous frame's result stays readable while the
/// current one is produced.
pub struct PostProcess {
    outputs: [RenderTarget; 2],
}

impl PostProcess {
    pub fn new<D: GpuDevice>(ctx: &mut GpuContext<D>, size: UVec2) -> Result<Self, RenderError> {
        let first = RenderTarget::new(ctx, "PostProcess 0", size, &[OUTPUT_FORMAT], DepthAttachment::None)?;
        let second = match RenderTarget::new(
            ctx,
            "PostProcess 1",
            size,
            &[OUTPUT_FORMAT],
            DepthAttachment::None,
        ) {
            Ok(target) => target,
            Err(err) => {
                first.destroy(ctx);
                return Err(err);
            }
        };
        Ok(Self {
            outputs: [first, second],
        })
    }

    pub fn resize<D: GpuDevice>(
        &mut self,
        ctx: &mut GpuContext<D>,
        size: UVec2,
    ) -> Result<(), RenderError> {
        let resized = Self::new(ctx, size)?;
        std::mem::replace(self, resized).destroy(ctx);
        Ok(())
    }

    /// Writes `pow(scene_color, 1 / gamma)` into the output for `parity` and
    /// returns that texture.
    pub(crate) fn render<D: GpuDevice>(
        &self,
        ctx: &mut GpuContext<D>,
        shaders: &BuiltinShaders,
        geometry: &ScreenGeometry,
        scene_color: TextureHandle,
        gamma: f32,
        parity: usize,
    ) -> TextureHandle {
        let target = &self.outputs[parity % 2];
        ctx.configure_pipeline_state(&pipeline::fullscreen());
        ctx.bind_framebuffer(Some(target.framebuffer));
        ctx.set_viewport(Viewport::from_size(target.size));
        ctx.device_mut().clear(ClearFlags::COLOR, [0.0; 4], 1.0);

        let shader = shaders.gamma;
        ctx.use_shader(shader);
        let device = ctx.device_mut();
        device.set_texture_uniform(shader, uniforms::SCENE_COLOR, scene_color);
        device.set_uniform(shader, uniforms::GAMMA, gamma.into());
        geometry.draw_quad(ctx);

        target.color(0)
    }

    pub fn result_texture(&self, parity: usize) -> TextureHandle {
        self.outputs[parity % 2].color(0)
    }

    pub fn size(&self) -> UVec2 {
        self.outputs[0].size
    }

    pub fn destroy<D: GpuDevice>(self, ctx: &mut GpuContext<D>) {
        let [first, second] = self.outputs;
        first.destroy(ctx);
        second.destroy(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{Command, HeadlessDevice, UniformValue};

    fn setup() -> (GpuContext<HeadlessDevice>, BuiltinShaders, ScreenGeometry, PostProcess) {
        let mut ctx = GpuContext::new(HeadlessDevice::new(), UVec2::new(8, 8));
        let shaders = BuiltinShaders::compile(&mut ctx).expect("shaders");
        let geometry = ScreenGeometry::new(&mut ctx).expect("geometry");
        let post = PostProcess::new(&mut ctx, UVec2::new(8, 8)).expect("post");
        (ctx, shaders, geometry, post)
    }

    #[test]
    fn parity_alternates_outputs() {
        let (mut ctx, shaders, geometry, post) = setup();
        let scene = post.result_texture(0);
        let even = post.render(&mut ctx, &shaders, &geometry, scene, 2.2, 0);
        let odd = post.render(&mut ctx, &shaders, &geometry, scene, 2.2, 1);
        assert_ne!(even, odd);
        assert_eq!(post.result_texture(2), even);
        assert_eq!(post.result_texture(3), odd);
    }

    #[test]
    fn gamma_pass_samples_scene_color() {
        let (mut ctx, shaders, geometry, post) = setup();
        let scene = ctx.device_mut().create_texture(
            &crate::gpu::TextureDescriptor::new_2d("Scene", UVec2::new(8, 8), PixelFormat::RGBA16F),
            None,
        );
        post.render(&mut ctx, &shaders, &geometry, scene, 2.2, 0);

        let device = ctx.device();
        assert_eq!(device.texture_uniform(shaders.gamma, uniforms::SCENE_COLOR), Some(scene));
        assert_eq!(
            device.uniform(shaders.gamma, uniforms::GAMMA),
            Some(UniformValue::Float(2.2))
        );
        let draws = device
            .commands()
            .iter()
            .filter(|cmd| matches!(cmd, Command::Draw { .. }))
            .count();
        assert_eq!(draws, 1);
    }
}
