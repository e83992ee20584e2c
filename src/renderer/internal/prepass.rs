use glam::{UVec2, Vec3};
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::error::RenderError;
use crate::gpu::{
    ClearFlags, GpuContext, GpuDevice, Key, PixelFormat, TextureDescriptor, TextureHandle,
    TextureWrap, UniformValue, Viewport,
};
use crate::renderer::batch::SceneBatcher;
use crate::renderer::uniforms::{self, CameraUniforms};
use crate::settings::SsaoSettings;

use super::pipeline;
use super::shaders::BuiltinShaders;
use super::targets::{DepthAttachment, RenderTarget, ScreenGeometry};

pub(crate) const NOISE_SIZE: u32 = 4;

/// Hemisphere kernel around +Z. Samples get denser towards the origin.
pub(crate) fn ssao_kernel(count: u32, rng: &mut SmallRng) -> Vec<Vec3> {
    (0..count)
        .map(|i| {
            let sample = Vec3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(0.0..1.0),
            )
            .normalize_or_zero()
                * rng.gen::<f32>();
            let t = i as f32 / count as f32;
            sample * lerp(0.1, 1.0, t * t)
        })
        .collect()
}

/// Random tangent-plane rotations, tiled across the screen. RG32F texels.
pub(crate) fn ssao_noise(rng: &mut SmallRng) -> Vec<[f32; 2]> {
    (0..NOISE_SIZE * NOISE_SIZE)
        .map(|_| [rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)])
        .collect()
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Screen-sized targets of the prepass and ambient occlusion.
struct Targets {
    prepass: RenderTarget,
    ssao: RenderTarget,
    blur: RenderTarget,
    ambient_occlusion: u64,
}

impl Targets {
    fn new<D: GpuDevice>(ctx: &mut GpuContext<D>, size: UVec2) -> Result<Self, RenderError> {
        let prepass = RenderTarget::new(
            ctx,
            "Prepass",
            size,
            &[PixelFormat::RGB16F, PixelFormat::RGB16F],
            DepthAttachment::Owned(PixelFormat::Depth24Stencil8),
        )?;
        let ssao = RenderTarget::new(ctx, "SSAO", size, &[PixelFormat::R16F], DepthAttachment::None)?;
        let blur = RenderTarget::new(
            ctx,
            "SSAOBlurred",
            size,
            &[PixelFormat::R16F],
            DepthAttachment::None,
        )?;

        let blurred = blur.color(0);
        let device = ctx.device_mut();
        let ambient_occlusion = device.bindless_handle(blurred);
        device.make_texture_resident(blurred);

        Ok(Self {
            prepass,
            ssao,
            blur,
            ambient_occlusion,
        })
    }

    fn destroy<D: GpuDevice>(self, ctx: &mut GpuContext<D>) {
        ctx.device_mut().make_texture_non_resident(self.blur.color(0));
        self.blur.destroy(ctx);
        self.ssao.destroy(ctx);
        self.prepass.destroy(ctx);
    }
}

/// Depth, view-space normals and positions, then SSAO and its blur.
pub(crate) struct PrepassAndAo {
    targets: Targets,
    noise: TextureHandle,
}

impl PrepassAndAo {
    pub fn new<D: GpuDevice>(
        ctx: &mut GpuContext<D>,
        shaders: &BuiltinShaders,
        size: UVec2,
        settings: &SsaoSettings,
    ) -> Result<Self, RenderError> {
        let mut rng = SmallRng::seed_from_u64(settings.seed);
        let kernel = ssao_kernel(SsaoSettings::MAX_SAMPLES, &mut rng);
        let noise_data = ssao_noise(&mut rng);

        let device = ctx.device_mut();
        for (i, sample) in kernel.iter().enumerate() {
            device.set_uniform(
                shaders.ssao,
                &uniforms::ssao_sample_name(i),
                UniformValue::Vec3(*sample),
            );
        }

        let noise = device.create_texture(
            &TextureDescriptor::new_2d("SSAONoise", UVec2::splat(NOISE_SIZE), PixelFormat::RG32F)
                .with_wrap(TextureWrap::Repeat),
            Some(bytemuck::cast_slice(&noise_data)),
        );
        if noise.is_null() {
            return Err(RenderError::missing("SSAO noise texture"));
        }

        Ok(Self {
            targets: Targets::new(ctx, size)?,
            noise,
        })
    }

    pub fn resize<D: GpuDevice>(
        &mut self,
        ctx: &mut GpuContext<D>,
        size: UVec2,
    ) -> Result<(), RenderError> {
        let targets = Targets::new(ctx, size)?;
        std::mem::replace(&mut self.targets, targets).destroy(ctx);
        Ok(())
    }

    /// Shared with the lighting target so lighting can test depth for
    /// equality.
    pub fn depth(&self) -> TextureHandle {
        self.targets.prepass.depth.unwrap_or_default()
    }

    pub fn normals(&self) -> TextureHandle {
        self.targets.prepass.color(0)
    }

    pub fn positions(&self) -> TextureHandle {
        self.targets.prepass.color(1)
    }

    pub fn ambient_occlusion(&self) -> TextureHandle {
        self.targets.blur.color(0)
    }

    pub fn ambient_occlusion_handle(&self) -> u64 {
        self.targets.ambient_occlusion
    }

    pub fn render_prepass<D: GpuDevice>(
        &self,
        ctx: &mut GpuContext<D>,
        shaders: &BuiltinShaders,
        batcher: &SceneBatcher,
        camera: &CameraUniforms,
        parallax_height_scale: f32,
    ) {
        let target = &self.targets.prepass;
        ctx.configure_pipeline_state(&pipeline::prepass());
        ctx.bind_framebuffer(Some(target.framebuffer));
        ctx.set_viewport(Viewport::from_size(target.size));
        ctx.device_mut()
            .clear(ClearFlags::COLOR | ClearFlags::DEPTH, [0.0; 4], 1.0);

        let shader = shaders.prepass;
        ctx.use_shader(shader);
        camera.apply(ctx, shader);
        ctx.device_mut().set_uniform(
            shader,
            uniforms::PARALLAX_HEIGHT_SCALE,
            parallax_height_scale.into(),
        );

        for batch in &batcher.frame().batches {
            let device = ctx.device_mut();
            device.set_uniform(shader, uniforms::MESH_BATCH_OFFSET, batch.batched_so_far.into());
            device.set_uniform(shader, uniforms::HAS_NORMAL_MAP, batch.prepass.has_normal_map.into());
            device.set_uniform(
                shader,
                uniforms::HAS_DISPLACEMENT_MAP,
                batch.prepass.has_displacement_map.into(),
            );
            // Normal and displacement maps are read from the batch's materials.
            batcher.bind_materials(ctx, batch);
            ctx.draw_instanced(batch.vertex_array(), 0, batch.draw_count, batch.size());
        }
    }

    pub fn render_ssao<D: GpuDevice>(
        &self,
        ctx: &mut GpuContext<D>,
        shaders: &BuiltinShaders,
        geometry: &ScreenGeometry,
        camera: &CameraUniforms,
        settings: &SsaoSettings,
    ) {
        let target = &self.targets.ssao;
        ctx.configure_pipeline_state(&pipeline::fullscreen());
        ctx.bind_framebuffer(Some(target.framebuffer));
        ctx.device_mut().clear(ClearFlags::COLOR, [1.0; 4], 1.0);

        let shader = shaders.ssao;
        ctx.use_shader(shader);
        let noise_scale = target.size.as_vec2() / NOISE_SIZE as f32;
        let device = ctx.device_mut();
        device.set_texture_uniform(shader, uniforms::POSITIONS_VS, self.positions());
        device.set_texture_uniform(shader, uniforms::NORMALS_VS, self.normals());
        device.set_texture_uniform(shader, uniforms::NOISE, self.noise);
        device.set_uniform(shader, uniforms::NOISE_SCALE, noise_scale.into());
        device.set_uniform(shader, uniforms::SAMPLE_COUNT, (settings.samples as i32).into());
        device.set_uniform(shader, uniforms::RADIUS, settings.radius.into());
        device.set_uniform(shader, uniforms::BIAS, settings.bias.into());
        device.set_uniform(shader, uniforms::PROJECTION, camera.projection.into());
        geometry.draw_quad(ctx);
    }

    pub fn render_blur<D: GpuDevice>(
        &self,
        ctx: &mut GpuContext<D>,
        shaders: &BuiltinShaders,
        geometry: &ScreenGeometry,
        settings: &SsaoSettings,
    ) {
        let target = &self.targets.blur;
        ctx.configure_pipeline_state(&pipeline::fullscreen());
        ctx.bind_framebuffer(Some(target.framebuffer));
        ctx.device_mut().clear(ClearFlags::COLOR, [1.0; 4], 1.0);

        let shader = shaders.blur;
        ctx.use_shader(shader);
        let device = ctx.device_mut();
        device.set_texture_uniform(shader, uniforms::TEXTURE_TO_BLUR, self.targets.ssao.color(0));
        device.set_uniform(shader, uniforms::OFFSET_X, settings.blur_offset.into());
        device.set_uniform(shader, uniforms::OFFSET_Y, settings.blur_offset.into());
        geometry.draw_quad(ctx);
    }

    /// Leaves the occlusion term at 1 when SSAO is off.
    pub fn clear_ambient_occlusion<D: GpuDevice>(&self, ctx: &mut GpuContext<D>) {
        ctx.bind_framebuffer(Some(self.targets.blur.framebuffer));
        ctx.device_mut().clear(ClearFlags::COLOR, [1.0; 4], 1.0);
    }

    pub fn destroy<D: GpuDevice>(self, ctx: &mut GpuContext<D>) {
        ctx.device_mut().destroy_texture(self.noise);
        self.targets.destroy(ctx);
    }
}
