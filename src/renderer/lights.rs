use glam::{Mat4, Vec3};

use super::uniforms;
use crate::gpu::{
    GpuContext, GpuDevice, Key, PixelFormat, ShaderHandle, TextureDescriptor, TextureFilter,
    TextureHandle, TextureWrap,
};
use crate::scene::Transform;
use crate::settings::{ShadowSettings, ShadowTier};

/// Light type ids as the lighting shaders see them.
pub const NO_LIGHT: i32 = 0;
pub const DIRECTIONAL_LIGHT: i32 = 1;
pub const POINT_LIGHT: i32 = 2;
pub const SPOT_LIGHT: i32 = 3;

pub const CUBE_FACE_COUNT: usize = 6;

/// Forward direction and up vector of each cube face, in +X, -X, +Y, -Y, +Z,
/// -Z order.
const CUBE_FACES: [(Vec3, Vec3); CUBE_FACE_COUNT] = [
    (Vec3::X, Vec3::NEG_Y),
    (Vec3::NEG_X, Vec3::NEG_Y),
    (Vec3::Y, Vec3::Z),
    (Vec3::NEG_Y, Vec3::NEG_Z),
    (Vec3::Z, Vec3::NEG_Y),
    (Vec3::NEG_Z, Vec3::NEG_Y),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    Directional,
    Point,
    Spot,
}

impl LightType {
    pub fn shader_id(self) -> i32 {
        match self {
            LightType::Directional => DIRECTIONAL_LIGHT,
            LightType::Point => POINT_LIGHT,
            LightType::Spot => SPOT_LIGHT,
        }
    }

    pub fn uses_cube_shadow_map(self) -> bool {
        self == LightType::Point
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attenuation {
    pub constant: f32,
    pub linear: f32,
    pub quadratic: f32,
}

impl Attenuation {
    pub const SPOT: Self = Self {
        constant: 0.2,
        linear: 0.1,
        quadratic: 1.0 / 6.0,
    };
    pub const POINT: Self = Self {
        constant: 0.2,
        linear: 0.1,
        quadratic: 0.015,
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Directional {
        direction: Vec3,
        light_up: Vec3,
    },
    Spot {
        direction: Vec3,
        light_up: Vec3,
        attenuation: Attenuation,
        /// Half-angles in radians.
        inner_cutoff: f32,
        outer_cutoff: f32,
    },
    Point {
        attenuation: Attenuation,
        near: f32,
        far: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowMap {
    pub texture: TextureHandle,
    pub quality: u8,
    pub cube: bool,
}

impl ShadowMap {
    /// Depth target for a light: a cubemap for point lights, a 2D map
    /// otherwise. `None` when the device could not create the texture.
    pub fn allocate<D: GpuDevice>(
        ctx: &mut GpuContext<D>,
        light_type: LightType,
        quality: u8,
        shadows: &ShadowSettings,
    ) -> Option<Self> {
        let size = glam::UVec2::splat(shadows.tier(quality).map_size);
        let cube = light_type.uses_cube_shadow_map();
        let desc = if cube {
            TextureDescriptor::new_cubemap("ShadowCube", size, PixelFormat::Depth32F)
        } else {
            TextureDescriptor::new_2d("ShadowMap", size, PixelFormat::Depth32F)
        }
        .with_filter(TextureFilter::Nearest)
        .with_wrap(TextureWrap::ClampToEdge);

        let texture = ctx.device_mut().create_texture(&desc, None);
        if texture.is_null() {
            log::error!("Failed to allocate {}x{} shadow map", size.x, size.y);
            return None;
        }
        Some(Self {
            texture,
            quality,
            cube,
        })
    }

    pub fn destroy<D: GpuDevice>(self, ctx: &mut GpuContext<D>) {
        ctx.device_mut().destroy_texture(self.texture);
    }
}

/// Where a light is in the shadow pipeline for the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowState {
    NoShadow,
    ShadowMapAllocated,
    MatrixUpdatedThisFrame,
    Rendered,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightSpace {
    Single(Mat4),
    Cube([Mat4; CUBE_FACE_COUNT]),
}

#[derive(Debug, Clone)]
pub struct Light {
    pub name: String,
    pub transform: Transform,
    pub color: Vec3,
    pub quality: u8,
    pub kind: LightKind,
    shadow_map: Option<ShadowMap>,
    light_space: LightSpace,
    shadow_state: ShadowState,
}

impl Light {
    pub fn new(name: impl Into<String>, kind: LightKind) -> Self {
        let light_space = match kind {
            LightKind::Point { .. } => LightSpace::Cube([Mat4::IDENTITY; CUBE_FACE_COUNT]),
            _ => LightSpace::Single(Mat4::IDENTITY),
        };
        Self {
            name: name.into(),
            transform: Transform::default(),
            color: Vec3::ONE,
            quality: 1,
            kind,
            shadow_map: None,
            light_space,
            shadow_state: ShadowState::NoShadow,
        }
    }

    pub fn directional(direction: Vec3) -> Self {
        Self::new(
            "DirectionalLight",
            LightKind::Directional {
                direction: direction.normalize_or_zero(),
                light_up: Vec3::Y,
            },
        )
    }

    pub fn spot(direction: Vec3) -> Self {
        Self::new(
            "SpotLight",
            LightKind::Spot {
                direction: direction.normalize_or_zero(),
                light_up: Vec3::Y,
                attenuation: Attenuation::SPOT,
                inner_cutoff: 30f32.to_radians(),
                outer_cutoff: 45f32.to_radians(),
            },
        )
    }

    pub fn point() -> Self {
        Self::new(
            "PointLight",
            LightKind::Point {
                attenuation: Attenuation::POINT,
                near: 1.0,
                far: 25.0,
            },
        )
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.transform.translation = position;
        self
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn light_type(&self) -> LightType {
        match self.kind {
            LightKind::Directional { .. } => LightType::Directional,
            LightKind::Spot { .. } => LightType::Spot,
            LightKind::Point { .. } => LightType::Point,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.transform.translation
    }

    pub fn shadow_map(&self) -> Option<&ShadowMap> {
        self.shadow_map.as_ref()
    }

    pub fn casts_shadow(&self) -> bool {
        self.shadow_map.is_some()
    }

    /// Quality tier the light-space frustum is built for. An attached map
    /// wins over `quality` so the frustum always matches the map's size.
    pub fn shadow_quality(&self) -> u8 {
        self.shadow_map.map_or(self.quality, |map| map.quality)
    }

    pub fn shadow_state(&self) -> ShadowState {
        self.shadow_state
    }

    pub fn light_space(&self) -> &LightSpace {
        &self.light_space
    }

    pub fn attach_shadow_map(&mut self, shadow_map: ShadowMap) {
        self.quality = shadow_map.quality;
        self.shadow_map = Some(shadow_map);
        self.shadow_state = ShadowState::ShadowMapAllocated;
    }

    pub fn take_shadow_map(&mut self) -> Option<ShadowMap> {
        self.shadow_state = ShadowState::NoShadow;
        self.shadow_map.take()
    }

    /// Resets the per-frame part of the shadow state.
    pub fn begin_frame(&mut self) {
        self.shadow_state = if self.shadow_map.is_some() {
            ShadowState::ShadowMapAllocated
        } else {
            ShadowState::NoShadow
        };
    }

    pub fn mark_shadow_rendered(&mut self) {
        if self.shadow_state == ShadowState::MatrixUpdatedThisFrame {
            self.shadow_state = ShadowState::Rendered;
        }
    }

    pub fn update_light_space_matrix(&mut self, shadows: &ShadowSettings) {
        let position = self.position();
        let tier = shadows.tier(self.shadow_quality());
        self.light_space = match self.kind {
            LightKind::Directional {
                direction,
                light_up,
            } => LightSpace::Single(directional_light_matrix(position, direction, light_up, tier)),
            LightKind::Spot {
                direction,
                light_up,
                outer_cutoff,
                ..
            } => LightSpace::Single(spot_light_matrix(
                position,
                direction,
                light_up,
                outer_cutoff,
                tier,
            )),
            LightKind::Point { near, far, .. } => {
                LightSpace::Cube(point_light_matrices(position, near, far))
            }
        };
        if self.shadow_map.is_some() {
            self.shadow_state = ShadowState::MatrixUpdatedThisFrame;
        }
    }

    /// Writes this light's parameters into a lit shader.
    pub fn setup_shader<D: GpuDevice>(&self, ctx: &mut GpuContext<D>, shader: ShaderHandle) {
        let device = ctx.device_mut();
        device.set_uniform(shader, uniforms::LIGHT_TYPE, self.light_type().shader_id().into());
        device.set_uniform(shader, uniforms::LIGHT_POSITION, self.position().into());
        device.set_uniform(shader, uniforms::LIGHT_COLOR, self.color.into());
        device.set_uniform(
            shader,
            uniforms::LIGHT_CASTS_SHADOWS,
            self.casts_shadow().into(),
        );

        match self.kind {
            LightKind::Directional { direction, .. } => {
                device.set_uniform(shader, uniforms::LIGHT_DIRECTION, direction.into());
            }
            LightKind::Spot {
                direction,
                attenuation,
                inner_cutoff,
                outer_cutoff,
                ..
            } => {
                device.set_uniform(shader, uniforms::LIGHT_DIRECTION, direction.into());
                set_attenuation(device, shader, attenuation);
                device.set_uniform(
                    shader,
                    uniforms::LIGHT_INNER_CUTOFF_COS,
                    inner_cutoff.cos().into(),
                );
                device.set_uniform(
                    shader,
                    uniforms::LIGHT_OUTER_CUTOFF_COS,
                    outer_cutoff.cos().into(),
                );
            }
            LightKind::Point {
                attenuation,
                near,
                far,
            } => {
                set_attenuation(device, shader, attenuation);
                device.set_uniform(shader, uniforms::LIGHT_NEAR_PLANE, near.into());
                device.set_uniform(shader, uniforms::LIGHT_FAR_PLANE, far.into());
            }
        }

        if let LightSpace::Single(matrix) = self.light_space {
            device.set_uniform(shader, uniforms::LIGHT_MATRIX, matrix.into());
        }

        if let Some(shadow_map) = &self.shadow_map {
            let name = if shadow_map.cube {
                uniforms::LIGHT_SHADOW_CUBE
            } else {
                uniforms::LIGHT_SHADOW_MAP
            };
            device.set_texture_uniform(shader, name, shadow_map.texture);
        }
    }

    /// Writes the light-space transform(s) into a depth-only shader.
    pub fn setup_shadow_map_shader<D: GpuDevice>(
        &self,
        ctx: &mut GpuContext<D>,
        shader: ShaderHandle,
    ) {
        let device = ctx.device_mut();
        match &self.light_space {
            LightSpace::Single(matrix) => {
                device.set_uniform(shader, uniforms::SHADOW_LIGHT_MATRIX, (*matrix).into());
            }
            LightSpace::Cube(matrices) => {
                for (name, matrix) in uniforms::SHADOW_LIGHT_MATRICES.iter().zip(matrices) {
                    device.set_uniform(shader, name, (*matrix).into());
                }
                device.set_uniform(shader, uniforms::SHADOW_LIGHT_POSITION, self.position().into());
                if let LightKind::Point { far, .. } = self.kind {
                    device.set_uniform(shader, uniforms::SHADOW_FAR_PLANE, far.into());
                }
            }
        }
    }
}

/// Marks a lit shader as running the ambient-only pass.
pub fn setup_ambient_only<D: GpuDevice>(ctx: &mut GpuContext<D>, shader: ShaderHandle) {
    ctx.device_mut()
        .set_uniform(shader, uniforms::LIGHT_TYPE, NO_LIGHT.into());
}

fn set_attenuation<D: GpuDevice>(device: &mut D, shader: ShaderHandle, attenuation: Attenuation) {
    device.set_uniform(shader, uniforms::LIGHT_CONSTANT, attenuation.constant.into());
    device.set_uniform(shader, uniforms::LIGHT_LINEAR, attenuation.linear.into());
    device.set_uniform(shader, uniforms::LIGHT_QUADRATIC, attenuation.quadratic.into());
}

/// `look_at` breaks down when the view direction is parallel to `up`.
fn stable_up(direction: Vec3, up: Vec3) -> Vec3 {
    if direction.normalize_or_zero().dot(up.normalize_or_zero()).abs() > 0.999 {
        if up.dot(Vec3::Z).abs() > 0.9 {
            Vec3::X
        } else {
            Vec3::Z
        }
    } else {
        up
    }
}

fn light_view(position: Vec3, direction: Vec3, up: Vec3) -> Mat4 {
    Mat4::look_at_rh(position, position + direction, stable_up(direction, up))
}

pub fn directional_light_matrix(
    position: Vec3,
    direction: Vec3,
    light_up: Vec3,
    tier: &ShadowTier,
) -> Mat4 {
    let projection = Mat4::orthographic_rh_gl(
        tier.left, tier.right, tier.bottom, tier.top, tier.near, tier.far,
    );
    projection * light_view(position, direction, light_up)
}

pub fn spot_light_matrix(
    position: Vec3,
    direction: Vec3,
    light_up: Vec3,
    outer_cutoff: f32,
    tier: &ShadowTier,
) -> Mat4 {
    let fov = (outer_cutoff * 2.0).clamp(1f32.to_radians(), 179f32.to_radians());
    let projection = Mat4::perspective_rh_gl(fov, 1.0, tier.near, tier.far);
    projection * light_view(position, direction, light_up)
}

pub fn point_light_matrices(position: Vec3, near: f32, far: f32) -> [Mat4; CUBE_FACE_COUNT] {
    let projection = Mat4::perspective_rh_gl(90f32.to_radians(), 1.0, near, far);
    CUBE_FACES.map(|(forward, up)| projection * Mat4::look_at_rh(position, position + forward, up))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4Swizzles;

    fn project(matrix: Mat4, point: Vec3) -> Vec3 {
        let clip = matrix * point.extend(1.0);
        clip.xyz() / clip.w
    }

    #[test]
    fn state_machine_follows_frame_progress() {
        let settings = ShadowSettings::default();
        let mut light = Light::directional(Vec3::new(0.0, -1.0, -1.0));
        assert_eq!(light.shadow_state(), ShadowState::NoShadow);

        light.update_light_space_matrix(&settings);
        assert_eq!(light.shadow_state(), ShadowState::NoShadow);

        light.attach_shadow_map(ShadowMap {
            texture: TextureHandle::default(),
            quality: 2,
            cube: false,
        });
        assert_eq!(light.shadow_state(), ShadowState::ShadowMapAllocated);
        assert_eq!(light.quality, 2);

        light.update_light_space_matrix(&settings);
        assert_eq!(light.shadow_state(), ShadowState::MatrixUpdatedThisFrame);
        light.mark_shadow_rendered();
        assert_eq!(light.shadow_state(), ShadowState::Rendered);

        light.begin_frame();
        assert_eq!(light.shadow_state(), ShadowState::ShadowMapAllocated);

        assert!(light.take_shadow_map().is_some());
        assert_eq!(light.shadow_state(), ShadowState::NoShadow);
    }

    #[test]
    fn frustum_tier_follows_the_attached_map() {
        let settings = ShadowSettings::default();
        let direction = Vec3::new(0.0, -1.0, -1.0).normalize();
        let mut light = Light::directional(direction).with_position(Vec3::new(0.0, 10.0, 10.0));
        light.attach_shadow_map(ShadowMap {
            texture: TextureHandle::default(),
            quality: 2,
            cube: false,
        });
        light = light.with_quality(0);
        assert_eq!(light.shadow_quality(), 2);

        light.update_light_space_matrix(&settings);

        let expected =
            directional_light_matrix(light.position(), direction, Vec3::Y, settings.tier(2));
        match light.light_space() {
            LightSpace::Single(matrix) => assert_eq!(*matrix, expected),
            LightSpace::Cube(_) => panic!("directional light has a single matrix"),
        }
        assert_eq!(Light::point().with_quality(0).shadow_quality(), 0);
    }

    #[test]
    fn directional_matrix_centres_light_target() {
        let tier = ShadowSettings::default().tiers[1];
        let position = Vec3::new(0.0, 10.0, 0.0);
        let matrix = directional_light_matrix(position, Vec3::NEG_Y, Vec3::Z, &tier);

        let ndc = project(matrix, Vec3::new(0.0, 0.0, 0.0));
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!(ndc.z > -1.0 && ndc.z < 1.0);
    }

    #[test]
    fn vertical_direction_with_vertical_up_stays_finite() {
        let tier = ShadowSettings::default().tiers[0];
        let matrix = directional_light_matrix(Vec3::Y * 5.0, Vec3::NEG_Y, Vec3::Y, &tier);
        assert!(matrix.is_finite());
    }

    #[test]
    fn spot_matrix_keeps_cone_axis_centred() {
        let tier = ShadowSettings::default().tiers[1];
        let position = Vec3::new(2.0, 3.0, 4.0);
        let direction = Vec3::new(0.0, -1.0, -1.0).normalize();
        let matrix = spot_light_matrix(position, direction, Vec3::Y, 45f32.to_radians(), &tier);

        let on_axis = project(matrix, position + direction * 5.0);
        assert!(on_axis.x.abs() < 1e-4 && on_axis.y.abs() < 1e-4);

        // 45 degree half angle: a point on the cone edge lands on the frustum edge.
        let right = direction.cross(Vec3::Y).normalize();
        let edge = project(matrix, position + direction * 5.0 + right * 5.0);
        assert!((edge.x.abs() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn point_light_faces_look_down_each_axis() {
        let position = Vec3::new(1.0, 1.0, 1.0);
        let matrices = point_light_matrices(position, 1.0, 25.0);

        for (matrix, (forward, _)) in matrices.iter().zip(CUBE_FACES) {
            let ndc = project(*matrix, position + forward * 5.0);
            assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
            assert!(ndc.z > -1.0 && ndc.z < 1.0);
        }
    }

    #[test]
    fn point_light_uses_cube_light_space() {
        let mut light = Light::point().with_position(Vec3::ONE);
        light.update_light_space_matrix(&ShadowSettings::default());
        assert!(matches!(light.light_space(), LightSpace::Cube(_)));
        assert!(light.light_type().uses_cube_shadow_map());
    }
}
