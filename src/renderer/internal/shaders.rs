use crate::error::RenderError;
use crate::gpu::{GpuContext, GpuDevice, Key, ShaderHandle, ShaderSource};
use crate::renderer::material::{MaterialRegistry, MaterialType};

const HEADER: &str = include_str!("../../shader/header.glsl");
const MESH_DATA: &str = include_str!("../../shader/mesh_data.glsl");
const LIGHTING: &str = include_str!("../../shader/lighting.glsl");
const FULLSCREEN_VS: &str = include_str!("../../shader/fullscreen.vert");

fn plain(body: &str) -> String {
    format!("{}\n{}", HEADER, body)
}

fn with_mesh_data(body: &str) -> String {
    format!("{}\n{}\n{}", HEADER, MESH_DATA, body)
}

fn lit(body: &str) -> String {
    format!("{}\n{}\n{}", HEADER, LIGHTING, body)
}

/// Every program the passes draw with. Lit programs are also registered as
/// the default shaders of their material types.
#[derive(Debug, Clone)]
pub(crate) struct BuiltinShaders {
    pub shadow: ShaderHandle,
    pub shadow_cube: ShaderHandle,
    pub prepass: ShaderHandle,
    pub ssao: ShaderHandle,
    pub blur: ShaderHandle,
    pub skybox: ShaderHandle,
    pub gamma: ShaderHandle,
    pub hit_map: ShaderHandle,
    pub lit: Vec<(MaterialType, ShaderHandle)>,
}

impl BuiltinShaders {
    pub fn compile<D: GpuDevice>(ctx: &mut GpuContext<D>) -> Result<Self, RenderError> {
        let mesh_vs = with_mesh_data(include_str!("../../shader/mesh.vert"));

        let mut lit_shaders = Vec::with_capacity(MaterialType::ALL.len());
        for ty in MaterialType::ALL {
            let fragment = match ty {
                MaterialType::Flat => include_str!("../../shader/flat.frag"),
                MaterialType::BlinnPhong => include_str!("../../shader/blinn_phong.frag"),
                MaterialType::BlinnPhongMaps => include_str!("../../shader/blinn_phong_maps.frag"),
                MaterialType::Pbr => include_str!("../../shader/pbr.frag"),
            };
            let shader = compile(ctx, ty.name(), &mesh_vs, &lit(fragment), None)?;
            lit_shaders.push((ty, shader));
        }

        Ok(Self {
            shadow: compile(
                ctx,
                "ShadowMap",
                &with_mesh_data(include_str!("../../shader/shadow_map.vert")),
                &plain(include_str!("../../shader/shadow_map.frag")),
                None,
            )?,
            shadow_cube: compile(
                ctx,
                "ShadowCube",
                &with_mesh_data(include_str!("../../shader/shadow_cube.vert")),
                &plain(include_str!("../../shader/shadow_cube.frag")),
                Some(&plain(include_str!("../../shader/shadow_cube.geom"))),
            )?,
            prepass: compile(
                ctx,
                "Prepass",
                &with_mesh_data(include_str!("../../shader/prepass.vert")),
                &plain(include_str!("../../shader/prepass.frag")),
                None,
            )?,
            ssao: compile(
                ctx,
                "SSAO",
                &plain(FULLSCREEN_VS),
                &plain(include_str!("../../shader/ssao.frag")),
                None,
            )?,
            blur: compile(
                ctx,
                "SSAOBlur",
                &plain(FULLSCREEN_VS),
                &plain(include_str!("../../shader/blur.frag")),
                None,
            )?,
            skybox: compile(
                ctx,
                "Skybox",
                &plain(include_str!("../../shader/skybox.vert")),
                &plain(include_str!("../../shader/skybox.frag")),
                None,
            )?,
            gamma: compile(
                ctx,
                "Gamma",
                &plain(FULLSCREEN_VS),
                &plain(include_str!("../../shader/gamma.frag")),
                None,
            )?,
            hit_map: compile(
                ctx,
                "HitMap",
                &with_mesh_data(include_str!("../../shader/hit_map.vert")),
                &plain(include_str!("../../shader/hit_map.frag")),
                None,
            )?,
            lit: lit_shaders,
        })
    }

    pub fn register(&self, registry: &mut MaterialRegistry) {
        for &(ty, shader) in &self.lit {
            registry.register(ty, shader);
        }
    }

    fn all(&self) -> impl Iterator<Item = ShaderHandle> + '_ {
        [
            self.shadow,
            self.shadow_cube,
            self.prepass,
            self.ssao,
            self.blur,
            self.skybox,
            self.gamma,
            self.hit_map,
        ]
        .into_iter()
        .chain(self.lit.iter().map(|&(_, shader)| shader))
    }

    pub fn destroy<D: GpuDevice>(&self, ctx: &mut GpuContext<D>) {
        for shader in self.all() {
            ctx.device_mut().destroy_shader(shader);
        }
        ctx.invalidate();
    }
}

fn compile<D: GpuDevice>(
    ctx: &mut GpuContext<D>,
    label: &str,
    vertex: &str,
    fragment: &str,
    geometry: Option<&str>,
) -> Result<ShaderHandle, RenderError> {
    let shader = ctx.device_mut().compile_shader(&ShaderSource {
        label,
        vertex,
        fragment,
        geometry,
    });
    if shader.is_null() {
        return Err(RenderError::ShaderCompilation {
            label: label.to_string(),
        });
    }
    log::debug!("Compiled shader '{}'", label);
    Ok(shader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{HeadlessDevice, UniformValue};
    use crate::renderer::uniforms;
    use glam::UVec2;

    #[test]
    fn builtin_shaders_compile_and_register() {
        let mut ctx = GpuContext::new(HeadlessDevice::new(), UVec2::new(4, 4));
        let shaders = BuiltinShaders::compile(&mut ctx).expect("shaders compile");
        let mut registry = MaterialRegistry::new();
        shaders.register(&mut registry);

        for ty in MaterialType::ALL {
            assert!(!registry.default_shader(ty).is_null());
        }
        assert_eq!(shaders.all().count(), 8 + MaterialType::ALL.len());
    }

    #[test]
    fn lit_shaders_declare_the_light_uniforms() {
        let mut ctx = GpuContext::new(HeadlessDevice::new(), UVec2::new(4, 4));
        let shaders = BuiltinShaders::compile(&mut ctx).expect("shaders compile");
        let (_, pbr) = shaders.lit[3];

        let device = ctx.device_mut();
        device.set_uniform(pbr, uniforms::LIGHT_TYPE, UniformValue::Int(2));
        device.set_uniform(pbr, uniforms::MESH_BATCH_OFFSET, UniformValue::UInt(64));
        assert_eq!(device.uniform(pbr, uniforms::LIGHT_TYPE), Some(UniformValue::Int(2)));
        assert_eq!(
            device.uniform(pbr, uniforms::MESH_BATCH_OFFSET),
            Some(UniformValue::UInt(64))
        );
    }
}
