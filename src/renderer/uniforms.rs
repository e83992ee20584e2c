// renderer/uniforms.rs
use glam::{Mat4, Vec2, Vec3};

use crate::gpu::{GpuContext, GpuDevice, ShaderHandle};
use crate::scene::RenderView;

// Shader storage binding slots of the per-frame streams.
pub const ACTOR_DATA_BINDING: u32 = 0;
pub const INSTANCE_DATA_BINDING: u32 = 1;
pub const MATERIAL_DATA_BINDING: u32 = 2;

pub const VIEW: &str = "uView";
pub const PROJECTION: &str = "uProjection";
pub const VIEW_POS: &str = "uViewPos";
pub const VIEWPORT_SIZE: &str = "uViewportSize";
pub const MESH_BATCH_OFFSET: &str = "uMeshBatchOffset";
pub const AMBIENT_STRENGTH: &str = "uAmbientStrength";
pub const AMBIENT_OCCLUSION: &str = "uAmbientOcclusion";
pub const NUM_SAMPLES_PCF: &str = "uNumSamplesPCF";
pub const PARALLAX_HEIGHT_SCALE: &str = "uParallaxHeightScale";
pub const ADD_AMBIENT: &str = "uAddAmbient";

pub const LIGHT_TYPE: &str = "uLight.Type";
pub const LIGHT_POSITION: &str = "uLight.Position";
pub const LIGHT_DIRECTION: &str = "uLight.Direction";
pub const LIGHT_COLOR: &str = "uLight.Color";
pub const LIGHT_CONSTANT: &str = "uLight.Constant";
pub const LIGHT_LINEAR: &str = "uLight.Linear";
pub const LIGHT_QUADRATIC: &str = "uLight.Quadratic";
pub const LIGHT_INNER_CUTOFF_COS: &str = "uLight.InnerCutOffCos";
pub const LIGHT_OUTER_CUTOFF_COS: &str = "uLight.OuterCutOffCos";
pub const LIGHT_MATRIX: &str = "uLight.LightSpaceMatrix";
pub const LIGHT_NEAR_PLANE: &str = "uLight.NearPlane";
pub const LIGHT_FAR_PLANE: &str = "uLight.FarPlane";
pub const LIGHT_CASTS_SHADOWS: &str = "uLight.CastsShadows";
pub const LIGHT_SHADOW_MAP: &str = "uLightShadowMap";
pub const LIGHT_SHADOW_CUBE: &str = "uLightShadowCube";

pub const SHADOW_LIGHT_MATRIX: &str = "uLightMatrix";
pub const SHADOW_LIGHT_MATRICES: [&str; 6] = [
    "uLightMatrices[0]",
    "uLightMatrices[1]",
    "uLightMatrices[2]",
    "uLightMatrices[3]",
    "uLightMatrices[4]",
    "uLightMatrices[5]",
];
pub const SHADOW_LIGHT_POSITION: &str = "uLightPosition";
pub const SHADOW_FAR_PLANE: &str = "uFarPlane";

pub const HAS_NORMAL_MAP: &str = "uHasNormalMap";
pub const HAS_DISPLACEMENT_MAP: &str = "uHasDisplacementMap";

pub const POSITIONS_VS: &str = "uPositionsVS";
pub const NORMALS_VS: &str = "uNormalsVS";
pub const NOISE: &str = "uNoise";
pub const NOISE_SCALE: &str = "uNoiseScale";
pub const RADIUS: &str = "uRadius";
pub const BIAS: &str = "uBias";
pub const SAMPLE_COUNT: &str = "uSampleCount";
pub const OFFSET_X: &str = "uOffsetX";
pub const OFFSET_Y: &str = "uOffsetY";
pub const TEXTURE_TO_BLUR: &str = "uTextureToBlur";

pub const SKYBOX: &str = "uSkybox";
pub const SCENE_COLOR: &str = "uSceneColor";
pub const GAMMA: &str = "uGamma";

/// `uSamples[i]`, formatted once at setup.
pub fn ssao_sample_name(index: usize) -> String {
    format!("uSamples[{index}]")
}

/// Per-view values every lit or prepass shader receives when it is bound.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraUniforms {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_pos: Vec3,
    pub viewport_size: Vec2,
}

impl CameraUniforms {
    pub fn from_view(view: &RenderView) -> Self {
        let size = view.viewport.size();
        Self {
            view: view.camera.view(),
            projection: view.camera.proj(view.aspect_ratio()),
            view_pos: view.camera.position(),
            viewport_size: Vec2::new(size.x as f32, size.y as f32),
        }
    }

    /// View matrix with the translation dropped, for the skybox.
    pub fn rotation_only_view(&self) -> Mat4 {
        let mut view = self.view;
        view.w_axis = glam::Vec4::W;
        view
    }

    pub fn apply<D: GpuDevice>(&self, ctx: &mut GpuContext<D>, shader: ShaderHandle) {
        let device = ctx.device_mut();
        device.set_uniform(shader, VIEW, self.view.into());
        device.set_uniform(shader, PROJECTION, self.projection.into());
        device.set_uniform(shader, VIEW_POS, self.view_pos.into());
        device.set_uniform(shader, VIEWPORT_SIZE, self.viewport_size.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Camera;

    #[test]
    fn rotation_only_view_keeps_directions() {
        let camera = Camera {
            eye: Vec3::new(3.0, 2.0, 5.0),
            ..Camera::default()
        };
        let uniforms = CameraUniforms {
            view: camera.view(),
            projection: Mat4::IDENTITY,
            view_pos: camera.eye,
            viewport_size: Vec2::ONE,
        };

        let stripped = uniforms.rotation_only_view();
        assert!(stripped.transform_point3(Vec3::ZERO).abs_diff_eq(Vec3::ZERO, 1e-6));
        let dir = Vec3::new(0.3, -0.2, 0.9).normalize();
        assert!(stripped
            .transform_vector3(dir)
            .abs_diff_eq(uniforms.view.transform_vector3(dir), 1e-6));
    }

    #[test]
    fn sample_names_index_the_array() {
        assert_eq!(ssao_sample_name(0), "uSamples[0]");
        assert_eq!(ssao_sample_name(63), "uSamples[63]");
    }
}
