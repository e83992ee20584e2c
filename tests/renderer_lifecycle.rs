mod common;

use common::{harness, settings, SIZE};
use forward_renderer::gpu::{GpuDevice, ObjectCounts};
use forward_renderer::renderer::{Light, ShadowState};
use forward_renderer::scene::RenderScene;
use forward_renderer::settings::StreamingSettings;
use glam::{UVec2, Vec3};

fn lit_scene(h: &mut common::Harness) -> RenderScene {
    let mut scene = RenderScene::new();
    for id in 1..=3 {
        scene.add_mesh(h.mesh(id, id as f32));
    }
    let sun = h
        .renderer
        .create_directional_light(&mut h.ctx, Vec3::new(0.0, -1.0, -1.0), true)
        .with_position(Vec3::new(0.0, 10.0, 10.0));
    scene.add_light(sun);
    scene.add_light(Light::point().with_position(Vec3::new(1.0, 2.0, 0.0)));
    scene
}

#[test]
fn identical_frames_record_identical_commands() {
    let mut logs = Vec::new();
    for _ in 0..2 {
        let mut h = harness(settings());
        let mut scene = lit_scene(&mut h);
        for _ in 0..2 {
            h.renderer.render(&mut h.ctx, &h.assets, &mut scene, &h.view);
        }
        logs.push(h.ctx.device_mut().take_commands());
    }
    assert!(!logs[0].is_empty());
    assert_eq!(logs[0], logs[1]);
}

#[test]
fn stalled_gpu_counts_fence_timeouts() {
    let mut s = settings();
    s.streaming = StreamingSettings {
        frames_in_flight: 1,
        ..StreamingSettings::default()
    };
    let mut h = harness(s);
    h.ctx.device_mut().set_stalled(true);
    let mut scene = RenderScene::new();
    scene.add_mesh(h.mesh(1, 0.0));

    let first = h.renderer.render(&mut h.ctx, &h.assets, &mut scene, &h.view);
    let second = h.renderer.render(&mut h.ctx, &h.assets, &mut scene, &h.view);

    assert_eq!(first.fence_timeouts, 0);
    assert_eq!(second.fence_timeouts, 1);
    assert_eq!(second.lighting_draw_calls, 1);
    assert_eq!(h.renderer.frame_counter(), 2);
}

#[test]
fn point_light_shadow_renders_into_a_cubemap() {
    let mut h = harness(settings());
    let mut scene = RenderScene::new();
    scene.add_mesh(h.mesh(1, 0.0));
    let lamp = h
        .renderer
        .create_point_light(&mut h.ctx, Vec3::new(0.0, 3.0, 0.0), true);
    let index = scene.add_light(lamp);

    let stats = h.renderer.render(&mut h.ctx, &h.assets, &mut scene, &h.view);

    assert_eq!(stats.shadow_maps_rendered, 1);
    assert_eq!(stats.shadow_draw_calls, 1);
    let light = &scene.lights[index];
    assert_eq!(light.shadow_state(), ShadowState::Rendered);
    assert!(light.shadow_map().expect("shadow map").cube);
}

#[test]
fn shadow_quality_reallocates_the_map() {
    let mut h = harness(settings());
    let mut light =
        h.renderer
            .create_spot_light(&mut h.ctx, Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y, true);
    let default_quality = h.renderer.settings().shadows.default_quality;
    assert_eq!(light.shadow_map().map(|map| map.quality), Some(default_quality));

    h.renderer.set_shadow_quality(&mut h.ctx, &mut light, 9);
    let map = light.shadow_map().copied().expect("shadow map");
    assert_eq!(map.quality, 2);
    assert_eq!(
        h.ctx.device().texture_size(map.texture),
        Some(UVec2::splat(2048))
    );

    h.renderer.remove_shadow_map(&mut h.ctx, &mut light);
    assert!(!light.casts_shadow());
    assert_eq!(light.shadow_state(), ShadowState::NoShadow);
    assert_eq!(h.ctx.device().texture_size(map.texture), None);
}

#[test]
fn hit_map_arrives_after_the_gpu_catches_up() {
    let mut s = settings();
    s.hit_map = true;
    let mut h = harness(s);
    let mut scene = RenderScene::new();
    scene.add_mesh(h.mesh(5, 0.0));
    scene.add_mesh(h.mesh(6, 1.0));

    let stats = h.renderer.render(&mut h.ctx, &h.assets, &mut scene, &h.view);
    assert_eq!(stats.hit_map_draw_calls, 1);
    assert!(h.renderer.hit_map().is_none());

    h.renderer.wait_for_frame_end(&mut h.ctx);
    h.renderer.render(&mut h.ctx, &h.assets, &mut scene, &h.view);

    let hit_map = h.renderer.hit_map().expect("readback completed");
    assert_eq!(hit_map.size(), SIZE);
    // Nothing rasterizes on the headless device, so every texel is background.
    assert_eq!(hit_map.actor_at(0, 0), None);
}

#[test]
fn resize_recreates_targets_and_ignores_zero() {
    let mut h = harness(settings());
    let mut scene = RenderScene::new();
    scene.add_mesh(h.mesh(1, 0.0));

    h.renderer
        .resize(&mut h.ctx, UVec2::new(0, 10))
        .expect("zero size is ignored");
    assert_eq!(h.renderer.size(), SIZE);

    let size = UVec2::new(128, 64);
    h.renderer.resize(&mut h.ctx, size).expect("resize");
    let stats = h.renderer.render(&mut h.ctx, &h.assets, &mut scene, &h.view);

    assert_eq!(stats.aborted_passes, 0);
    assert_eq!(stats.lighting_draw_calls, 1);
    let device = h.ctx.device();
    assert_eq!(device.texture_size(h.renderer.result_texture()), Some(size));
    assert_eq!(device.texture_size(h.renderer.ambient_occlusion_texture()), Some(size));
}

#[test]
fn cleanup_releases_every_gpu_object() {
    let mut s = settings();
    s.hit_map = true;
    let mut h = harness(s);
    let mut scene = lit_scene(&mut h);
    for _ in 0..3 {
        h.renderer.render(&mut h.ctx, &h.assets, &mut scene, &h.view);
    }

    for light in &mut scene.lights {
        h.renderer.remove_shadow_map(&mut h.ctx, light);
    }
    for (_, mesh) in h.assets.meshes.iter_mut() {
        mesh.destroy(&mut h.ctx);
    }
    let common::Harness {
        mut ctx, renderer, ..
    } = h;
    renderer.cleanup(&mut ctx);

    assert_eq!(ctx.device().object_counts(), ObjectCounts::default());
}
