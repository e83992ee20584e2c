// renderer/material.rs
use std::collections::BTreeMap;
use std::mem;

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use crate::gpu::{GpuContext, GpuDevice, Key, ShaderHandle, TextureHandle};

/// Start offsets of per-batch material regions are rounded up to this so a
/// region can be bound as a storage buffer range.
pub const MATERIAL_DATA_ALIGNMENT: u64 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MaterialType {
    Flat,
    BlinnPhong,
    BlinnPhongMaps,
    Pbr,
}

impl MaterialType {
    pub const ALL: [MaterialType; 4] = [
        MaterialType::Flat,
        MaterialType::BlinnPhong,
        MaterialType::BlinnPhongMaps,
        MaterialType::Pbr,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MaterialType::Flat => "Flat",
            MaterialType::BlinnPhong => "BlinnPhong",
            MaterialType::BlinnPhongMaps => "BlinnPhongMaps",
            MaterialType::Pbr => "PBR",
        }
    }

    /// Size of the GPU block one material of this type serializes to.
    pub fn data_size(self) -> usize {
        match self {
            MaterialType::Flat => mem::size_of::<FlatMaterialData>(),
            MaterialType::BlinnPhong => mem::size_of::<BlinnPhongMaterialData>(),
            MaterialType::BlinnPhongMaps => mem::size_of::<BlinnPhongMapsMaterialData>(),
            MaterialType::Pbr => mem::size_of::<PbrMaterialData>(),
        }
    }
}

/// A texture referenced from shader data by its resident bindless handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindlessTexture {
    pub texture: TextureHandle,
    pub handle: u64,
}

impl BindlessTexture {
    pub fn new<D: GpuDevice>(ctx: &mut GpuContext<D>, texture: TextureHandle) -> Self {
        let device = ctx.device_mut();
        let handle = device.bindless_handle(texture);
        device.make_texture_resident(texture);
        Self { texture, handle }
    }

    pub fn release<D: GpuDevice>(&self, ctx: &mut GpuContext<D>) {
        ctx.device_mut().make_texture_non_resident(self.texture);
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MapFlags: u32 {
        const SPECULAR_MAP = 1 << 0;
        const NORMAL_MAP = 1 << 1;
        const DISPLACEMENT_MAP = 1 << 2;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MaterialKind {
    Flat {
        color: Vec4,
    },
    BlinnPhong {
        diffuse: Vec3,
        specular: Vec3,
        shininess: f32,
    },
    BlinnPhongMaps {
        diffuse_map: BindlessTexture,
        specular_map: Option<BindlessTexture>,
        normal_map: Option<BindlessTexture>,
        displacement_map: Option<BindlessTexture>,
        shininess: f32,
    },
    Pbr {
        albedo: Vec3,
        metallic: f32,
        roughness: f32,
    },
}

/// What the depth/normal prepass needs to know about a material.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrepassDescriptor {
    pub has_normal_map: bool,
    pub has_displacement_map: bool,
}

impl PrepassDescriptor {
    pub fn merge(self, other: Self) -> Self {
        Self {
            has_normal_map: self.has_normal_map || other.has_normal_map,
            has_displacement_map: self.has_displacement_map || other.has_displacement_map,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    /// Null selects the default shader registered for the material type.
    pub shader: ShaderHandle,
    pub kind: MaterialKind,
}

impl Material {
    pub fn new(name: impl Into<String>, kind: MaterialKind) -> Self {
        Self {
            name: name.into(),
            shader: ShaderHandle::default(),
            kind,
        }
    }

    pub fn flat(color: Vec4) -> Self {
        Self::new("Flat", MaterialKind::Flat { color })
    }

    pub fn blinn_phong(diffuse: Vec3, specular: Vec3, shininess: f32) -> Self {
        Self::new(
            "BlinnPhong",
            MaterialKind::BlinnPhong {
                diffuse,
                specular,
                shininess,
            },
        )
    }

    pub fn pbr(albedo: Vec3, metallic: f32, roughness: f32) -> Self {
        Self::new(
            "PBR",
            MaterialKind::Pbr {
                albedo,
                metallic: metallic.clamp(0.0, 1.0),
                roughness: roughness.clamp(0.0, 1.0),
            },
        )
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_shader(mut self, shader: ShaderHandle) -> Self {
        self.shader = shader;
        self
    }

    pub fn material_type(&self) -> MaterialType {
        match self.kind {
            MaterialKind::Flat { .. } => MaterialType::Flat,
            MaterialKind::BlinnPhong { .. } => MaterialType::BlinnPhong,
            MaterialKind::BlinnPhongMaps { .. } => MaterialType::BlinnPhongMaps,
            MaterialKind::Pbr { .. } => MaterialType::Pbr,
        }
    }

    /// Appends this material's GPU block to `out` and returns the number of
    /// bytes written.
    pub fn serialize_shader_params(&self, out: &mut Vec<u8>) -> usize {
        let start = out.len();
        match &self.kind {
            MaterialKind::Flat { color } => {
                out.extend_from_slice(bytemuck::bytes_of(&FlatMaterialData {
                    color: color.to_array(),
                }));
            }
            MaterialKind::BlinnPhong {
                diffuse,
                specular,
                shininess,
            } => {
                out.extend_from_slice(bytemuck::bytes_of(&BlinnPhongMaterialData {
                    diffuse: diffuse.to_array(),
                    shininess: *shininess,
                    specular: specular.to_array(),
                    _padding: 0.0,
                }));
            }
            MaterialKind::BlinnPhongMaps {
                diffuse_map,
                specular_map,
                normal_map,
                displacement_map,
                shininess,
            } => {
                let mut flags = MapFlags::empty();
                flags.set(MapFlags::SPECULAR_MAP, specular_map.is_some());
                flags.set(MapFlags::NORMAL_MAP, normal_map.is_some());
                flags.set(MapFlags::DISPLACEMENT_MAP, displacement_map.is_some());
                let handle = |map: &Option<BindlessTexture>| map.map(|m| m.handle).unwrap_or(0);

                out.extend_from_slice(bytemuck::bytes_of(&BlinnPhongMapsMaterialData {
                    diffuse_map: diffuse_map.handle,
                    specular_map: handle(specular_map),
                    normal_map: handle(normal_map),
                    displacement_map: handle(displacement_map),
                    shininess: *shininess,
                    flags: flags.bits(),
                    _padding: [0; 2],
                }));
            }
            MaterialKind::Pbr {
                albedo,
                metallic,
                roughness,
            } => {
                out.extend_from_slice(bytemuck::bytes_of(&PbrMaterialData {
                    albedo: albedo.to_array(),
                    metallic: *metallic,
                    roughness: *roughness,
                    _padding: [0.0; 3],
                }));
            }
        }
        out.len() - start
    }

    pub fn prepass_descriptor(&self) -> PrepassDescriptor {
        match &self.kind {
            MaterialKind::BlinnPhongMaps {
                normal_map,
                displacement_map,
                ..
            } => PrepassDescriptor {
                has_normal_map: normal_map.is_some(),
                has_displacement_map: displacement_map.is_some(),
            },
            _ => PrepassDescriptor::default(),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct FlatMaterialData {
    pub color: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct BlinnPhongMaterialData {
    pub diffuse: [f32; 3],
    pub shininess: f32,
    pub specular: [f32; 3],
    pub _padding: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct BlinnPhongMapsMaterialData {
    pub diffuse_map: u64,
    pub specular_map: u64,
    pub normal_map: u64,
    pub displacement_map: u64,
    pub shininess: f32,
    pub flags: u32,
    pub _padding: [u32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct PbrMaterialData {
    pub albedo: [f32; 3],
    pub metallic: f32,
    pub roughness: f32,
    pub _padding: [f32; 3],
}

#[derive(Debug, Clone, Copy)]
pub struct MaterialTypeInfo {
    pub name: &'static str,
    pub data_size: usize,
    pub shader: ShaderHandle,
}

/// Per-type table of default shaders. The renderer registers its built-in
/// shaders here; callers may override any entry.
#[derive(Debug, Clone)]
pub struct MaterialRegistry {
    types: BTreeMap<MaterialType, MaterialTypeInfo>,
}

impl MaterialRegistry {
    pub fn new() -> Self {
        let types = MaterialType::ALL
            .into_iter()
            .map(|ty| {
                (
                    ty,
                    MaterialTypeInfo {
                        name: ty.name(),
                        data_size: ty.data_size(),
                        shader: ShaderHandle::default(),
                    },
                )
            })
            .collect();
        Self { types }
    }

    pub fn register(&mut self, ty: MaterialType, shader: ShaderHandle) {
        if let Some(info) = self.types.get_mut(&ty) {
            info.shader = shader;
        }
    }

    pub fn info(&self, ty: MaterialType) -> Option<&MaterialTypeInfo> {
        self.types.get(&ty)
    }

    pub fn default_shader(&self, ty: MaterialType) -> ShaderHandle {
        self.info(ty).map(|info| info.shader).unwrap_or_default()
    }

    /// Shader a material is drawn with; null when neither the material nor
    /// its type provides one.
    pub fn resolve_shader(&self, material: &Material) -> ShaderHandle {
        if material.shader.is_null() {
            self.default_shader(material.material_type())
        } else {
            material.shader
        }
    }

    pub fn shaders(&self) -> impl Iterator<Item = ShaderHandle> + '_ {
        self.types.values().map(|info| info.shader)
    }
}

impl Default for MaterialRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn bindless(id: u64) -> BindlessTexture {
        BindlessTexture {
            texture: TextureHandle::from(KeyData::from_ffi(id)),
            handle: 0x1000 + id,
        }
    }

    #[test]
    fn material_data_sizes_are_std430_friendly() {
        for ty in MaterialType::ALL {
            assert_eq!(ty.data_size() % 16, 0, "{} block is not 16-byte aligned", ty.name());
        }
        assert_eq!(MaterialType::BlinnPhongMaps.data_size(), 48);
    }

    #[test]
    fn serialized_size_matches_registered_size() {
        let registry = MaterialRegistry::new();
        let materials = [
            Material::flat(Vec4::ONE),
            Material::blinn_phong(Vec3::ONE, Vec3::splat(0.5), 32.0),
            Material::new(
                "Maps",
                MaterialKind::BlinnPhongMaps {
                    diffuse_map: bindless(1),
                    specular_map: None,
                    normal_map: Some(bindless(2)),
                    displacement_map: None,
                    shininess: 8.0,
                },
            ),
            Material::pbr(Vec3::ONE, 0.25, 0.75),
        ];

        let mut buffer = Vec::new();
        for material in &materials {
            let written = material.serialize_shader_params(&mut buffer);
            let info = registry.info(material.material_type()).expect("registered");
            assert_eq!(written, info.data_size);
        }
        assert_eq!(
            buffer.len(),
            materials
                .iter()
                .map(|m| m.material_type().data_size())
                .sum::<usize>()
        );
    }

    #[test]
    fn pbr_factors_are_written_in_order() {
        let mut buffer = Vec::new();
        Material::pbr(Vec3::new(0.1, 0.2, 0.3), 0.75, 0.25).serialize_shader_params(&mut buffer);
        let data: PbrMaterialData = bytemuck::pod_read_unaligned(&buffer);

        assert_eq!(data.albedo, [0.1, 0.2, 0.3]);
        assert!((data.metallic - 0.75).abs() < 1e-6);
        assert!((data.roughness - 0.25).abs() < 1e-6);
    }

    #[test]
    fn prepass_descriptor_reflects_maps() {
        let maps = Material::new(
            "Maps",
            MaterialKind::BlinnPhongMaps {
                diffuse_map: bindless(1),
                specular_map: None,
                normal_map: Some(bindless(2)),
                displacement_map: Some(bindless(3)),
                shininess: 8.0,
            },
        );
        let descriptor = maps.prepass_descriptor();
        assert!(descriptor.has_normal_map);
        assert!(descriptor.has_displacement_map);
        assert_eq!(
            Material::flat(Vec4::ONE).prepass_descriptor(),
            PrepassDescriptor::default()
        );

        let mut buffer = Vec::new();
        maps.serialize_shader_params(&mut buffer);
        let data: BlinnPhongMapsMaterialData = bytemuck::pod_read_unaligned(&buffer);
        assert_eq!(
            MapFlags::from_bits_truncate(data.flags),
            MapFlags::NORMAL_MAP | MapFlags::DISPLACEMENT_MAP
        );
        assert_eq!(data.specular_map, 0);
    }

    #[test]
    fn material_shader_overrides_registry_default() {
        let mut registry = MaterialRegistry::new();
        let default_shader = ShaderHandle::from(KeyData::from_ffi(1));
        let custom = ShaderHandle::from(KeyData::from_ffi(2));
        registry.register(MaterialType::Flat, default_shader);

        let plain = Material::flat(Vec4::ONE);
        assert_eq!(registry.resolve_shader(&plain), default_shader);
        assert_eq!(registry.resolve_shader(&plain.with_shader(custom)), custom);
        assert!(registry
            .resolve_shader(&Material::pbr(Vec3::ONE, 0.0, 1.0))
            .is_null());
    }
}
