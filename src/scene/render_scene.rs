// scene/render_scene.rs
use glam::UVec2;

use super::{Camera, Transform};
use crate::asset::{Handle, MeshResource};
use crate::gpu::{TextureHandle, Viewport};
use crate::renderer::{Light, Material};

/// Identifies an actor across frames. Also the value written to the hit map,
/// so 0 is never handed out.
pub type ActorId = u32;

/// One placed instance of a mesh. A mesh with several submeshes contributes
/// one draw instance per submesh.
#[derive(Debug, Clone)]
pub struct StaticMesh {
    pub actor_id: ActorId,
    pub transform: Transform,
    pub mesh: Option<Handle<MeshResource>>,
    /// Indexed by `SubMesh::material_slot`.
    pub materials: Vec<Option<Handle<Material>>>,
    pub reverse_normals: bool,
}

impl StaticMesh {
    pub fn new(actor_id: ActorId, mesh: Handle<MeshResource>, material: Handle<Material>) -> Self {
        Self {
            actor_id,
            transform: Transform::default(),
            mesh: Some(mesh),
            materials: vec![Some(material)],
            reverse_normals: false,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.reverse_normals = transform.is_mirrored();
        self.transform = transform;
        self
    }

    pub fn with_materials(mut self, materials: Vec<Option<Handle<Material>>>) -> Self {
        self.materials = materials;
        self
    }

    pub fn material(&self, slot: usize) -> Option<Handle<Material>> {
        self.materials.get(slot).copied().flatten()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Skybox {
    pub cubemap: TextureHandle,
}

/// Everything the renderer draws in one frame. Mesh order is draw order.
#[derive(Debug, Default)]
pub struct RenderScene {
    pub static_meshes: Vec<StaticMesh>,
    pub lights: Vec<Light>,
    pub skybox: Option<Skybox>,
}

impl RenderScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&mut self, mesh: StaticMesh) -> &mut Self {
        self.static_meshes.push(mesh);
        self
    }

    pub fn add_light(&mut self, light: Light) -> usize {
        self.lights.push(light);
        self.lights.len() - 1
    }

    pub fn shadow_casters(&self) -> usize {
        self.lights.iter().filter(|light| light.casts_shadow()).count()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderView {
    pub camera: Camera,
    pub viewport: Viewport,
}

impl RenderView {
    pub fn new(camera: Camera, size: UVec2) -> Self {
        Self {
            camera,
            viewport: Viewport::from_size(size),
        }
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.viewport.height == 0 {
            return 1.0;
        }
        self.viewport.width as f32 / self.viewport.height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn mirrored_transform_reverses_normals() {
        let mesh = StaticMesh::new(7, Handle::new(0), Handle::new(0))
            .with_transform(Transform::default().with_scale(Vec3::new(1.0, -1.0, 1.0)));
        assert!(mesh.reverse_normals);
        assert_eq!(mesh.material(0), Some(Handle::new(0)));
        assert_eq!(mesh.material(3), None);
    }

    #[test]
    fn aspect_ratio_tolerates_empty_viewport() {
        let view = RenderView::new(Camera::default(), UVec2::new(200, 100));
        assert_eq!(view.aspect_ratio(), 2.0);
        let empty = RenderView::new(Camera::default(), UVec2::new(200, 0));
        assert_eq!(empty.aspect_ratio(), 1.0);
    }
}
