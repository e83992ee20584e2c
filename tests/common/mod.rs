#![allow(dead_code)]

use forward_renderer::asset::{Assets, Handle, MeshResource};
use forward_renderer::gpu::{
    BlendFactor, Command, FramebufferHandle, GpuContext, HeadlessDevice, PipelineState,
};
use forward_renderer::renderer::{cube_mesh, upload_mesh, Material, Renderer};
use forward_renderer::scene::{Camera, RenderView, StaticMesh, Transform};
use forward_renderer::settings::{RenderSettings, Resolution};
use glam::{UVec2, Vec3, Vec4};

pub const SIZE: UVec2 = UVec2::new(64, 32);

pub struct Harness {
    pub ctx: GpuContext<HeadlessDevice>,
    pub renderer: Renderer,
    pub assets: Assets,
    pub cube: Handle<MeshResource>,
    pub material: Handle<Material>,
    pub view: RenderView,
}

pub fn settings() -> RenderSettings {
    RenderSettings {
        resolution: Resolution {
            width: SIZE.x,
            height: SIZE.y,
        },
        ..RenderSettings::default()
    }
}

pub fn harness(settings: RenderSettings) -> Harness {
    let mut ctx = GpuContext::new(HeadlessDevice::new(), SIZE);
    let renderer = Renderer::new(&mut ctx, settings).expect("renderer setup");

    let mut assets = Assets::new();
    let (vertices, indices) = cube_mesh();
    let cube = assets
        .meshes
        .insert(upload_mesh(&mut ctx, "Cube", &vertices, &indices));
    let material = assets
        .materials
        .insert(Material::flat(Vec4::new(0.5, 0.5, 0.5, 1.0)));

    let view = RenderView::new(Camera::look_at(Vec3::new(0.0, 2.0, 6.0), Vec3::ZERO), SIZE);
    Harness {
        ctx,
        renderer,
        assets,
        cube,
        material,
        view,
    }
}

impl Harness {
    pub fn mesh(&self, actor_id: u32, x: f32) -> StaticMesh {
        StaticMesh::new(actor_id, self.cube, self.material)
            .with_transform(Transform::from_translation(Vec3::new(x, 0.0, 0.0)))
    }
}

/// Kind of work an instanced draw belongs to, recovered from the command log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawKind {
    Shadow,
    Prepass,
    Replace,
    Accumulate,
    HitMap,
    Other,
}

/// Classifies every instanced draw by the framebuffer it went to and, for
/// lighting, the blend mode in effect.
pub fn instanced_draws(device: &HeadlessDevice) -> Vec<DrawKind> {
    let mut framebuffer: Option<FramebufferHandle> = None;
    let mut state = PipelineState::default();
    let mut draws = Vec::new();

    for command in device.commands() {
        match command {
            Command::BindFramebuffer(bound) => framebuffer = *bound,
            Command::ConfigurePipelineState(next) => state = *next,
            Command::DrawInstanced { .. } => {
                let label = framebuffer.and_then(|fb| device.framebuffer_label(fb));
                let kind = match label {
                    Some("Shadow") => DrawKind::Shadow,
                    Some("Prepass") => DrawKind::Prepass,
                    Some("HitMap") => DrawKind::HitMap,
                    Some("Lighting") => match state.blend {
                        Some(blend) if blend.dst_color == BlendFactor::Zero => DrawKind::Replace,
                        Some(blend) if blend.dst_color == BlendFactor::One => DrawKind::Accumulate,
                        _ => DrawKind::Other,
                    },
                    _ => DrawKind::Other,
                };
                draws.push(kind);
            }
            _ => {}
        }
    }
    draws
}

/// Pipeline state in effect at each lighting draw, instanced or not.
pub fn lighting_draw_states(device: &HeadlessDevice) -> Vec<PipelineState> {
    let mut framebuffer: Option<FramebufferHandle> = None;
    let mut state = PipelineState::default();
    let mut states = Vec::new();

    for command in device.commands() {
        match command {
            Command::BindFramebuffer(bound) => framebuffer = *bound,
            Command::ConfigurePipelineState(next) => state = *next,
            Command::Draw { .. } | Command::DrawInstanced { .. } => {
                if framebuffer.and_then(|fb| device.framebuffer_label(fb)) == Some("Lighting") {
                    states.push(state);
                }
            }
            _ => {}
        }
    }
    states
}
