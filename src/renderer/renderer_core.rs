// renderer/renderer_core.rs
use glam::{UVec2, Vec3};

use crate::asset::Assets;
use crate::error::RenderError;
use crate::gpu::{GpuContext, GpuDevice, TextureHandle};
use crate::renderer::batch::SceneBatcher;
use crate::renderer::internal::{
    BuiltinShaders, HitMapPass, LightingInputs, LightingPass, PrepassAndAo, ScreenGeometry,
    ShadowPass,
};
use crate::renderer::internal::hit_map::CachedHitMap;
use crate::renderer::lights::{Light, ShadowMap};
use crate::renderer::material::MaterialRegistry;
use crate::renderer::postprocess::PostProcess;
use crate::renderer::streaming::FrameRing;
use crate::renderer::uniforms::CameraUniforms;
use crate::scene::{RenderScene, RenderView};
use crate::settings::{RenderSettings, SHADOW_QUALITY_TIERS};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RendererStats {
    pub frame_number: u64,
    pub batch_count: u32,
    pub instance_count: u32,
    pub actor_count: u32,
    pub material_bytes: u64,
    pub skipped_meshes: u32,
    pub shadow_draw_calls: u32,
    pub prepass_draw_calls: u32,
    pub ssao_draw_calls: u32,
    pub lighting_draw_calls: u32,
    pub skybox_draw_calls: u32,
    pub postprocess_draw_calls: u32,
    pub hit_map_draw_calls: u32,
    /// Lighting draws that overwrite the target (first light or ambient).
    pub replace_draws: u32,
    /// Lighting draws blended on top of earlier lights.
    pub accumulate_draws: u32,
    pub shadow_maps_rendered: u32,
    pub elided_binds: u32,
    pub fence_timeouts: u32,
    pub aborted_passes: u32,
}

impl RendererStats {
    pub fn total_draw_calls(&self) -> u32 {
        self.shadow_draw_calls
            + self.prepass_draw_calls
            + self.ssao_draw_calls
            + self.lighting_draw_calls
            + self.skybox_draw_calls
            + self.postprocess_draw_calls
            + self.hit_map_draw_calls
    }
}

/// Runs the frame: shadows, depth/normal prepass, ambient occlusion,
/// per-light forward lighting and gamma correction.
pub struct Renderer {
    settings: RenderSettings,
    size: UVec2,
    shaders: BuiltinShaders,
    registry: MaterialRegistry,
    ring: FrameRing,
    batcher: SceneBatcher,
    shadow_pass: ShadowPass,
    prepass: PrepassAndAo,
    lighting: LightingPass,
    postprocess: PostProcess,
    geometry: ScreenGeometry,
    hit_map: Option<HitMapPass>,
    stats: RendererStats,
}

impl Renderer {
    pub fn new<D: GpuDevice>(
        ctx: &mut GpuContext<D>,
        settings: RenderSettings,
    ) -> Result<Self, RenderError> {
        let settings = settings.validate();
        let size = settings.framebuffer_size();
        ctx.resize(size);

        let shaders = BuiltinShaders::compile(ctx)?;
        let mut registry = MaterialRegistry::new();
        shaders.register(&mut registry);

        let ring = FrameRing::new(
            settings.streaming.frames_in_flight,
            settings.streaming.fence_timeout(),
        );
        let batcher = SceneBatcher::new(ctx, &settings.streaming, ring.len());
        let shadow_pass = ShadowPass::new(ctx);
        let geometry = ScreenGeometry::new(ctx)?;
        let prepass = PrepassAndAo::new(ctx, &shaders, size, &settings.ssao)?;
        let lighting = LightingPass::new(ctx, size, prepass.depth())?;
        let postprocess = PostProcess::new(ctx, size)?;
        let hit_map = if settings.hit_map {
            Some(HitMapPass::new(ctx, size)?)
        } else {
            None
        };

        log::info!(
            "Renderer initialized at {}x{} with {} frames in flight",
            size.x,
            size.y,
            ring.len()
        );

        Ok(Self {
            settings,
            size,
            shaders,
            registry,
            ring,
            batcher,
            shadow_pass,
            prepass,
            lighting,
            postprocess,
            geometry,
            hit_map,
            stats: RendererStats::default(),
        })
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn registry(&self) -> &MaterialRegistry {
        &self.registry
    }

    /// Overrides of per-type default shaders go here.
    pub fn registry_mut(&mut self) -> &mut MaterialRegistry {
        &mut self.registry
    }

    pub fn frame_counter(&self) -> u64 {
        self.ring.frame_counter()
    }

    pub fn render<D: GpuDevice>(
        &mut self,
        ctx: &mut GpuContext<D>,
        assets: &Assets,
        scene: &mut RenderScene,
        view: &RenderView,
    ) -> RendererStats {
        let frame = self.ring.begin_frame();
        let elided_before = ctx.elided_binds();
        let mut stats = RendererStats {
            frame_number: frame.frame_number(),
            ..RendererStats::default()
        };

        if let Some(hit_map) = self.hit_map.as_mut() {
            if hit_map.poll(ctx) {
                log::trace!("Hit map readback refreshed");
            }
        }

        let batch_stats = self
            .batcher
            .prepare(ctx, &mut self.ring, &frame, assets, scene, &self.registry)
            .stats;
        stats.batch_count = batch_stats.batches;
        stats.instance_count = batch_stats.instances;
        stats.actor_count = batch_stats.actors;
        stats.material_bytes = batch_stats.material_bytes;
        stats.skipped_meshes = batch_stats.skipped_meshes;

        let camera = CameraUniforms::from_view(view);
        let batches = &self.batcher.frame().batches;

        let mark = ctx.draw_calls();
        match self.shadow_pass.render(
            ctx,
            &self.shaders,
            &mut scene.lights,
            batches,
            &self.settings.shadows,
        ) {
            Ok(shadow_stats) => stats.shadow_maps_rendered = shadow_stats.shadow_maps,
            Err(err) => {
                log::error!("Shadow pass aborted: {}", err);
                stats.aborted_passes += 1;
            }
        }
        stats.shadow_draw_calls = ctx.draw_calls() - mark;

        let mark = ctx.draw_calls();
        self.prepass.render_prepass(
            ctx,
            &self.shaders,
            &self.batcher,
            &camera,
            self.settings.parallax_height_scale,
        );
        stats.prepass_draw_calls = ctx.draw_calls() - mark;

        let mark = ctx.draw_calls();
        if self.settings.ssao.enabled {
            self.prepass.render_ssao(
                ctx,
                &self.shaders,
                &self.geometry,
                &camera,
                &self.settings.ssao,
            );
            self.prepass
                .render_blur(ctx, &self.shaders, &self.geometry, &self.settings.ssao);
        } else {
            self.prepass.clear_ambient_occlusion(ctx);
        }
        stats.ssao_draw_calls = ctx.draw_calls() - mark;

        let mark = ctx.draw_calls();
        let lighting_stats = self.lighting.render(
            ctx,
            &self.shaders,
            &self.geometry,
            &self.batcher,
            &scene.lights,
            scene.skybox.as_ref(),
            &LightingInputs {
                camera: &camera,
                ambient_occlusion: self.prepass.ambient_occlusion_handle(),
                settings: &self.settings,
            },
        );
        stats.skybox_draw_calls = u32::from(lighting_stats.skybox_drawn);
        stats.lighting_draw_calls = ctx.draw_calls() - mark - stats.skybox_draw_calls;
        stats.replace_draws = lighting_stats.replace_draws;
        stats.accumulate_draws = lighting_stats.accumulate_draws;

        let mark = ctx.draw_calls();
        self.postprocess.render(
            ctx,
            &self.shaders,
            &self.geometry,
            self.lighting.color(),
            self.settings.gamma,
            frame.parity(),
        );
        stats.postprocess_draw_calls = ctx.draw_calls() - mark;

        if let Some(hit_map) = self.hit_map.as_mut() {
            let mark = ctx.draw_calls();
            hit_map.render(ctx, &self.shaders, &self.batcher.frame().batches, &camera);
            stats.hit_map_draw_calls = ctx.draw_calls() - mark;
        }

        stats.fence_timeouts = self.ring.take_timeouts();
        self.ring.end_frame(ctx, frame);
        stats.elided_binds = ctx.elided_binds() - elided_before;

        log::trace!(
            "Frame {}: {} draw calls, {} batches",
            stats.frame_number,
            stats.total_draw_calls(),
            stats.batch_count
        );
        self.stats = stats;
        stats
    }

    pub fn last_frame_stats(&self) -> &RendererStats {
        &self.stats
    }

    fn last_parity(&self) -> usize {
        (self.ring.frame_counter().saturating_sub(1) % 2) as usize
    }

    /// Output of the most recently rendered frame.
    pub fn result_texture(&self) -> TextureHandle {
        self.postprocess.result_texture(self.last_parity())
    }

    /// Output of the frame before the most recent one.
    pub fn previous_result_texture(&self) -> TextureHandle {
        self.postprocess.result_texture(self.last_parity() + 1)
    }

    /// Lighting output before gamma correction.
    pub fn scene_color_texture(&self) -> TextureHandle {
        self.lighting.color()
    }

    pub fn ambient_occlusion_texture(&self) -> TextureHandle {
        self.prepass.ambient_occlusion()
    }

    /// Latest completed hit map readback. Lags the rendered frames by the
    /// GPU latency.
    pub fn hit_map(&self) -> Option<&CachedHitMap> {
        self.hit_map.as_ref().and_then(HitMapPass::cached)
    }

    pub fn create_directional_light<D: GpuDevice>(
        &self,
        ctx: &mut GpuContext<D>,
        direction: Vec3,
        casts_shadow: bool,
    ) -> Light {
        self.with_shadow(ctx, Light::directional(direction), casts_shadow)
    }

    pub fn create_spot_light<D: GpuDevice>(
        &self,
        ctx: &mut GpuContext<D>,
        position: Vec3,
        direction: Vec3,
        casts_shadow: bool,
    ) -> Light {
        self.with_shadow(
            ctx,
            Light::spot(direction).with_position(position),
            casts_shadow,
        )
    }

    pub fn create_point_light<D: GpuDevice>(
        &self,
        ctx: &mut GpuContext<D>,
        position: Vec3,
        casts_shadow: bool,
    ) -> Light {
        self.with_shadow(ctx, Light::point().with_position(position), casts_shadow)
    }

    fn with_shadow<D: GpuDevice>(
        &self,
        ctx: &mut GpuContext<D>,
        mut light: Light,
        casts_shadow: bool,
    ) -> Light {
        let quality = self.settings.shadows.default_quality;
        light.quality = quality;
        if casts_shadow {
            self.allocate_shadow_map(ctx, &mut light, quality);
        }
        light
    }

    fn allocate_shadow_map<D: GpuDevice>(
        &self,
        ctx: &mut GpuContext<D>,
        light: &mut Light,
        quality: u8,
    ) {
        match ShadowMap::allocate(ctx, light.light_type(), quality, &self.settings.shadows) {
            Some(shadow_map) => light.attach_shadow_map(shadow_map),
            None => log::warn!("Light '{}' will not cast shadows", light.name),
        }
    }

    pub fn remove_shadow_map<D: GpuDevice>(&self, ctx: &mut GpuContext<D>, light: &mut Light) {
        if let Some(shadow_map) = light.take_shadow_map() {
            shadow_map.destroy(ctx);
        }
    }

    /// Moves a light to another quality tier, reallocating its shadow map at
    /// the tier's resolution.
    pub fn set_shadow_quality<D: GpuDevice>(
        &self,
        ctx: &mut GpuContext<D>,
        light: &mut Light,
        quality: u8,
    ) {
        let quality = quality.min(SHADOW_QUALITY_TIERS as u8 - 1);
        light.quality = quality;
        if light.shadow_map().map(|map| map.quality) == Some(quality) {
            return;
        }
        if let Some(shadow_map) = light.take_shadow_map() {
            shadow_map.destroy(ctx);
            self.allocate_shadow_map(ctx, light, quality);
        }
    }

    /// Recreates every size-dependent target. Zero sizes are ignored.
    pub fn resize<D: GpuDevice>(
        &mut self,
        ctx: &mut GpuContext<D>,
        size: UVec2,
    ) -> Result<(), RenderError> {
        if size.x == 0 || size.y == 0 || size == self.size {
            return Ok(());
        }

        // Lighting shares the prepass depth, so it follows the prepass.
        self.prepass.resize(ctx, size)?;
        self.lighting.resize(ctx, size, self.prepass.depth())?;
        self.postprocess.resize(ctx, size)?;
        if let Some(hit_map) = self.hit_map.as_mut() {
            let resized = HitMapPass::new(ctx, size)?;
            std::mem::replace(hit_map, resized).destroy(ctx);
        }

        ctx.resize(size);
        ctx.invalidate();
        self.size = size;
        log::info!("Renderer resized to {}x{}", size.x, size.y);
        Ok(())
    }

    pub fn wait_for_frame_end<D: GpuDevice>(&self, ctx: &mut GpuContext<D>) {
        ctx.device_mut().finish();
    }

    /// Releases every GPU object the renderer owns. Light shadow maps belong
    /// to the lights and are released with [`Renderer::remove_shadow_map`].
    pub fn cleanup<D: GpuDevice>(mut self, ctx: &mut GpuContext<D>) {
        self.ring.destroy(ctx);
        self.batcher.destroy(ctx);
        self.shadow_pass.destroy(ctx);
        self.lighting.destroy(ctx);
        self.prepass.destroy(ctx);
        self.postprocess.destroy(ctx);
        self.geometry.destroy(ctx);
        if let Some(hit_map) = self.hit_map.take() {
            hit_map.destroy(ctx);
        }
        self.shaders.destroy(ctx);
        ctx.invalidate();
        log::info!("Renderer cleaned up");
    }
}
