pub mod asset;
pub mod error;
pub mod gpu;
pub mod renderer;
pub mod scene;
pub mod settings;

use glam::{UVec2, Vec3, Vec4};

use asset::Assets;
use error::RenderError;
use gpu::{GpuContext, HeadlessDevice};
use renderer::{cube_mesh, sphere_mesh, upload_mesh, Material, Renderer};
use scene::{Camera, RenderScene, RenderView, StaticMesh, Transform};
use settings::RenderSettings;

const DEMO_FRAMES: u64 = 4;

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

fn build_demo_scene<D: gpu::GpuDevice>(
    ctx: &mut GpuContext<D>,
    renderer: &Renderer,
    assets: &mut Assets,
) -> RenderScene {
    let (vertices, indices) = sphere_mesh(32, 16);
    let sphere = assets
        .meshes
        .insert(upload_mesh(ctx, "Sphere", &vertices, &indices));
    let (vertices, indices) = cube_mesh();
    let cube = assets
        .meshes
        .insert(upload_mesh(ctx, "Cube", &vertices, &indices));

    let floor_material = assets
        .materials
        .insert(Material::flat(Vec4::new(0.6, 0.6, 0.6, 1.0)).with_name("Floor"));
    let shiny = assets.materials.insert(
        Material::blinn_phong(Vec3::new(0.8, 0.2, 0.2), Vec3::ONE, 32.0).with_name("Shiny"),
    );
    let metal = assets
        .materials
        .insert(Material::pbr(Vec3::new(0.9, 0.8, 0.5), 1.0, 0.3).with_name("Metal"));

    let mut scene = RenderScene::new();
    scene.add_mesh(
        StaticMesh::new(1, cube, floor_material).with_transform(
            Transform::from_translation(Vec3::new(0.0, -1.0, 0.0))
                .with_scale(Vec3::new(10.0, 0.1, 10.0)),
        ),
    );
    let mut actor_id = 2;
    for x in -2..=2 {
        for z in -2..=2 {
            let material = if (x + z) % 2 == 0 { shiny } else { metal };
            scene.add_mesh(
                StaticMesh::new(actor_id, sphere, material).with_transform(
                    Transform::from_translation(Vec3::new(x as f32 * 1.5, 0.0, z as f32 * 1.5))
                        .with_scale(Vec3::splat(0.5)),
                ),
            );
            actor_id += 1;
        }
    }

    let sun = renderer
        .create_directional_light(ctx, Vec3::new(-0.5, -1.0, -0.3), true)
        .with_position(Vec3::new(5.0, 10.0, 3.0))
        .with_name("Sun");
    scene.add_light(sun);
    let lamp = renderer
        .create_point_light(ctx, Vec3::new(0.0, 3.0, 0.0), true)
        .with_color(Vec3::new(1.0, 0.9, 0.7))
        .with_name("Lamp");
    scene.add_light(lamp);
    scene
}

/// Renders a few frames of a small scene on the headless device and logs the
/// per-frame statistics.
pub fn run() -> Result<(), RenderError> {
    init_logging();
    log::info!("Starting headless forward renderer");

    let settings = RenderSettings::load();
    let size = settings.framebuffer_size();
    let mut ctx = GpuContext::new(HeadlessDevice::new(), size);
    let mut renderer = Renderer::new(&mut ctx, settings)?;

    let mut assets = Assets::new();
    let mut scene = build_demo_scene(&mut ctx, &renderer, &mut assets);
    let view = RenderView::new(
        Camera::look_at(Vec3::new(0.0, 4.0, 9.0), Vec3::ZERO),
        UVec2::new(size.x, size.y),
    );

    for _ in 0..DEMO_FRAMES {
        let stats = renderer.render(&mut ctx, &assets, &mut scene, &view);
        log::info!(
            "Frame {}: {} batches, {} instances, {} draw calls ({} elided binds)",
            stats.frame_number,
            stats.batch_count,
            stats.instance_count,
            stats.total_draw_calls(),
            stats.elided_binds
        );
    }
    renderer.wait_for_frame_end(&mut ctx);

    for light in &mut scene.lights {
        renderer.remove_shadow_map(&mut ctx, light);
    }
    for (_, mesh) in assets.meshes.iter_mut() {
        mesh.destroy(&mut ctx);
    }
    renderer.cleanup(&mut ctx);

    log::info!("Headless renderer shutdown complete");
    Ok(())
}
