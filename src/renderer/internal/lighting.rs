use glam::UVec2;

use crate::error::RenderError;
use crate::gpu::{
    ClearFlags, GpuContext, GpuDevice, PixelFormat, ShaderHandle, TextureHandle, UniformValue,
    Viewport,
};
use crate::renderer::batch::SceneBatcher;
use crate::renderer::lights::{setup_ambient_only, Light};
use crate::renderer::uniforms::{self, CameraUniforms};
use crate::scene::Skybox;
use crate::settings::RenderSettings;

use super::pipeline;
use super::shaders::BuiltinShaders;
use super::targets::{DepthAttachment, RenderTarget, ScreenGeometry};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct LightingPassStats {
    pub light_passes: u32,
    pub replace_draws: u32,
    pub accumulate_draws: u32,
    pub shader_setups: u32,
    pub skybox_drawn: bool,
}

impl LightingPassStats {
    pub fn draws(&self) -> u32 {
        self.replace_draws + self.accumulate_draws + u32::from(self.skybox_drawn)
    }
}

/// Per-frame inputs shared by every lit draw.
pub(crate) struct LightingInputs<'a> {
    pub camera: &'a CameraUniforms,
    pub ambient_occlusion: u64,
    pub settings: &'a RenderSettings,
}

/// Forward lighting: one pass over all batches per light, summed by blending
/// on top of the prepass depth.
pub(crate) struct LightingPass {
    target: RenderTarget,
}

impl LightingPass {
    pub fn new<D: GpuDevice>(
        ctx: &mut GpuContext<D>,
        size: UVec2,
        depth: TextureHandle,
    ) -> Result<Self, RenderError> {
        let target = RenderTarget::new(
            ctx,
            "Lighting",
            size,
            &[PixelFormat::RGBA16F],
            DepthAttachment::Shared(depth),
        )?;
        Ok(Self { target })
    }

    pub fn resize<D: GpuDevice>(
        &mut self,
        ctx: &mut GpuContext<D>,
        size: UVec2,
        depth: TextureHandle,
    ) -> Result<(), RenderError> {
        let resized = Self::new(ctx, size, depth)?;
        std::mem::replace(self, resized).destroy(ctx);
        Ok(())
    }

    pub fn color(&self) -> TextureHandle {
        self.target.color(0)
    }

    pub fn render<D: GpuDevice>(
        &self,
        ctx: &mut GpuContext<D>,
        shaders: &BuiltinShaders,
        geometry: &ScreenGeometry,
        batcher: &SceneBatcher,
        lights: &[Light],
        skybox: Option<&Skybox>,
        inputs: &LightingInputs<'_>,
    ) -> LightingPassStats {
        let mut stats = LightingPassStats::default();
        let batches = &batcher.frame().batches;

        ctx.bind_framebuffer(Some(self.target.framebuffer));
        ctx.set_viewport(Viewport::from_size(self.target.size));
        // Depth comes from the prepass.
        ctx.device_mut().clear(ClearFlags::COLOR, [0.0; 4], 1.0);

        let passes: Vec<Option<&Light>> = if lights.is_empty() {
            vec![None]
        } else {
            lights.iter().map(Some).collect()
        };

        for (index, light) in passes.into_iter().enumerate() {
            let first = index == 0;
            if first {
                ctx.configure_pipeline_state(&pipeline::lighting_replace());
            } else {
                ctx.configure_pipeline_state(&pipeline::lighting_accumulate());
            }
            stats.light_passes += 1;

            // Light uniforms live on each program, so every program used under
            // this light needs them again.
            let mut current: Option<ShaderHandle> = None;
            for batch in batches {
                let shader = batch.shader();
                if current != Some(shader) {
                    ctx.use_shader(shader);
                    setup_lit_shader(ctx, shader, inputs, first);
                    match light {
                        Some(light) => light.setup_shader(ctx, shader),
                        None => setup_ambient_only(ctx, shader),
                    }
                    current = Some(shader);
                    stats.shader_setups += 1;
                }

                ctx.device_mut().set_uniform(
                    shader,
                    uniforms::MESH_BATCH_OFFSET,
                    batch.batched_so_far.into(),
                );
                batcher.bind_materials(ctx, batch);
                ctx.draw_instanced(batch.vertex_array(), 0, batch.draw_count, batch.size());

                if first {
                    stats.replace_draws += 1;
                } else {
                    stats.accumulate_draws += 1;
                }
            }
        }

        if let Some(skybox) = skybox {
            self.render_skybox(ctx, shaders, geometry, skybox, inputs.camera);
            stats.skybox_drawn = true;
        }
        stats
    }

    fn render_skybox<D: GpuDevice>(
        &self,
        ctx: &mut GpuContext<D>,
        shaders: &BuiltinShaders,
        geometry: &ScreenGeometry,
        skybox: &Skybox,
        camera: &CameraUniforms,
    ) {
        ctx.configure_pipeline_state(&pipeline::skybox());
        let shader = shaders.skybox;
        ctx.use_shader(shader);
        let device = ctx.device_mut();
        device.set_uniform(shader, uniforms::VIEW, camera.rotation_only_view().into());
        device.set_uniform(shader, uniforms::PROJECTION, camera.projection.into());
        device.set_texture_uniform(shader, uniforms::SKYBOX, skybox.cubemap);
        geometry.draw_cube(ctx);
    }

    pub fn destroy<D: GpuDevice>(self, ctx: &mut GpuContext<D>) {
        self.target.destroy(ctx);
    }
}

fn setup_lit_shader<D: GpuDevice>(
    ctx: &mut GpuContext<D>,
    shader: ShaderHandle,
    inputs: &LightingInputs<'_>,
    add_ambient: bool,
) {
    inputs.camera.apply(ctx, shader);
    let settings = inputs.settings;
    let device = ctx.device_mut();
    device.set_uniform(shader, uniforms::AMBIENT_STRENGTH, settings.ambient_strength.into());
    device.set_uniform(
        shader,
        uniforms::AMBIENT_OCCLUSION,
        UniformValue::BindlessHandle(inputs.ambient_occlusion),
    );
    device.set_uniform(shader, uniforms::NUM_SAMPLES_PCF, (settings.pcf_samples as i32).into());
    device.set_uniform(
        shader,
        uniforms::PARALLAX_HEIGHT_SCALE,
        settings.parallax_height_scale.into(),
    );
    device.set_uniform(shader, uniforms::ADD_AMBIENT, add_ambient.into());
}
