use glam::UVec2;

use crate::error::RenderError;
use crate::gpu::{ClearFlags, FramebufferHandle, GpuContext, GpuDevice, ShaderHandle, Viewport};
use crate::renderer::batch::MeshBatch;
use crate::renderer::lights::Light;
use crate::renderer::uniforms;
use crate::settings::ShadowSettings;

use super::pipeline;
use super::shaders::BuiltinShaders;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ShadowPassStats {
    pub shadow_maps: u32,
    pub shader_switches: u32,
    pub viewport_changes: u32,
}

/// Depth-only rendering of every shadow-casting light, in scene order.
pub(crate) struct ShadowPass {
    framebuffer: FramebufferHandle,
}

impl ShadowPass {
    pub fn new<D: GpuDevice>(ctx: &mut GpuContext<D>) -> Self {
        let framebuffer = ctx.device_mut().create_framebuffer("Shadow");
        ctx.device_mut().disable_color_output(framebuffer);
        Self { framebuffer }
    }

    pub fn render<D: GpuDevice>(
        &self,
        ctx: &mut GpuContext<D>,
        shaders: &BuiltinShaders,
        lights: &mut [Light],
        batches: &[MeshBatch],
        settings: &ShadowSettings,
    ) -> Result<ShadowPassStats, RenderError> {
        let mut stats = ShadowPassStats::default();
        if !lights.iter().any(Light::casts_shadow) {
            return Ok(stats);
        }

        ctx.configure_pipeline_state(&pipeline::shadow());
        ctx.bind_framebuffer(Some(self.framebuffer));

        let mut current_shader: Option<ShaderHandle> = None;
        let mut current_quality: Option<u8> = None;

        for light in lights.iter_mut() {
            light.begin_frame();
            let Some(shadow_map) = light.shadow_map().copied() else {
                continue;
            };
            light.update_light_space_matrix(settings);

            let shader = if shadow_map.cube {
                shaders.shadow_cube
            } else {
                shaders.shadow
            };
            if current_shader != Some(shader) {
                ctx.use_shader(shader);
                current_shader = Some(shader);
                stats.shader_switches += 1;
            }
            light.setup_shadow_map_shader(ctx, shader);

            if current_quality != Some(shadow_map.quality) {
                let size = settings.tier(shadow_map.quality).map_size;
                ctx.set_viewport(Viewport::from_size(UVec2::splat(size)));
                current_quality = Some(shadow_map.quality);
                stats.viewport_changes += 1;
            }

            let device = ctx.device_mut();
            device.set_depth_attachment(self.framebuffer, Some(shadow_map.texture));
            let status = device.framebuffer_status(self.framebuffer);
            if !status.is_complete() {
                return Err(RenderError::FramebufferIncomplete {
                    framebuffer: format!("Shadow ({})", light.name),
                    status,
                });
            }
            device.clear(ClearFlags::DEPTH, [0.0; 4], 1.0);

            for batch in batches {
                ctx.device_mut().set_uniform(
                    shader,
                    uniforms::MESH_BATCH_OFFSET,
                    batch.batched_so_far.into(),
                );
                ctx.draw_instanced(batch.vertex_array(), 0, batch.draw_count, batch.size());
            }

            light.mark_shadow_rendered();
            stats.shadow_maps += 1;
        }

        ctx.device_mut().set_depth_attachment(self.framebuffer, None);
        Ok(stats)
    }

    pub fn destroy<D: GpuDevice>(&self, ctx: &mut GpuContext<D>) {
        ctx.device_mut().destroy_framebuffer(self.framebuffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{Command, HeadlessDevice, Key};
    use crate::renderer::lights::{ShadowMap, ShadowState};
    use glam::Vec3;

    struct Fixture {
        ctx: GpuContext<HeadlessDevice>,
        shaders: BuiltinShaders,
        pass: ShadowPass,
        settings: ShadowSettings,
    }

    fn fixture() -> Fixture {
        let mut ctx = GpuContext::new(HeadlessDevice::new(), UVec2::new(16, 16));
        let shaders = BuiltinShaders::compile(&mut ctx).expect("shaders compile");
        let pass = ShadowPass::new(&mut ctx);
        Fixture {
            ctx,
            shaders,
            pass,
            settings: ShadowSettings::default(),
        }
    }

    fn with_shadow(fx: &mut Fixture, light: Light, quality: u8) -> Light {
        let mut light = light;
        let map = ShadowMap::allocate(&mut fx.ctx, light.light_type(), quality, &fx.settings)
            .expect("shadow map");
        light.attach_shadow_map(map);
        light
    }

    #[test]
    fn only_shadow_casters_are_rendered() {
        let mut fx = fixture();
        let caster = with_shadow(&mut fx, Light::directional(-Vec3::Y), 1);
        let mut lights = vec![Light::point(), caster];

        let stats = fx
            .pass
            .render(&mut fx.ctx, &fx.shaders, &mut lights, &[], &fx.settings)
            .expect("shadow pass");

        assert_eq!(stats.shadow_maps, 1);
        assert_eq!(lights[0].shadow_state(), ShadowState::NoShadow);
        assert_eq!(lights[1].shadow_state(), ShadowState::Rendered);
    }

    #[test]
    fn shader_and_viewport_switch_only_on_change() {
        let mut fx = fixture();
        let a = with_shadow(&mut fx, Light::directional(-Vec3::Y), 1);
        let b = with_shadow(&mut fx, Light::spot(-Vec3::Y), 1);
        let c = with_shadow(&mut fx, Light::point(), 2);
        let mut lights = vec![a, b, c];

        let stats = fx
            .pass
            .render(&mut fx.ctx, &fx.shaders, &mut lights, &[], &fx.settings)
            .expect("shadow pass");

        assert_eq!(stats.shadow_maps, 3);
        assert_eq!(stats.shader_switches, 2);
        assert_eq!(stats.viewport_changes, 2);
    }

    #[test]
    fn each_map_is_cleared_as_sole_depth_attachment() {
        let mut fx = fixture();
        let light = with_shadow(&mut fx, Light::directional(-Vec3::Y), 0);
        let texture = light.shadow_map().map(|map| map.texture).expect("map");
        let mut lights = vec![light];

        fx.pass
            .render(&mut fx.ctx, &fx.shaders, &mut lights, &[], &fx.settings)
            .expect("shadow pass");

        let commands = fx.ctx.device().commands();
        let attach = commands
            .iter()
            .position(|cmd| {
                matches!(cmd, Command::SetDepthAttachment { texture: Some(t), .. } if *t == texture)
            })
            .expect("depth attachment");
        assert!(matches!(
            commands[attach + 1..].first(),
            Some(Command::Clear { flags, .. }) if *flags == ClearFlags::DEPTH
        ));
        assert!(!commands
            .iter()
            .any(|cmd| matches!(cmd, Command::SetColorAttachment { .. })));
    }

    #[test]
    fn incomplete_target_aborts_the_pass() {
        let mut fx = fixture();
        let mut light = Light::directional(-Vec3::Y);
        light.attach_shadow_map(ShadowMap {
            texture: Default::default(),
            quality: 1,
            cube: false,
        });
        assert!(light.shadow_map().is_some_and(|map| map.texture.is_null()));
        let mut lights = vec![light];

        let result = fx
            .pass
            .render(&mut fx.ctx, &fx.shaders, &mut lights, &[], &fx.settings);

        assert!(matches!(
            result,
            Err(RenderError::FramebufferIncomplete { .. })
        ));
    }
}
