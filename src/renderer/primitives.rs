use std::f32::consts::PI;

use glam::Vec3;

use super::vertex::{v, Vertex};
use crate::asset::{MeshResource, SubMesh};
use crate::gpu::{
    BufferBindPoint, BufferDescriptor, BufferUsage, DrawMode, GpuContext, GpuDevice, Key,
    VertexArrayDescriptor,
};

pub fn sphere_mesh(segments: u32, rings: u32) -> (Vec<Vertex>, Vec<u32>) {
    let mut vertices = Vec::with_capacity(((rings + 1) * (segments + 1)) as usize);
    let mut indices = Vec::with_capacity((rings * segments * 6) as usize);

    for ring in 0..=rings {
        let phi = PI * ring as f32 / rings as f32;
        for segment in 0..=segments {
            let theta = 2.0 * PI * segment as f32 / segments as f32;
            let p = [phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin()];
            let uv = [segment as f32 / segments as f32, ring as f32 / rings as f32];
            vertices.push(v(p, p, uv, [-theta.sin(), 0.0, theta.cos(), 1.0]));
        }
    }

    for ring in 0..rings {
        for segment in 0..segments {
            let current = ring * (segments + 1) + segment;
            let next = current + segments + 1;
            indices.extend_from_slice(&[current, next, current + 1, current + 1, next, next + 1]);
        }
    }

    (vertices, indices)
}

/// Unit cube centred on the origin, one quad per face so every face gets its
/// own normal and tangent.
pub fn cube_mesh() -> (Vec<Vertex>, Vec<u32>) {
    // (normal, tangent) per face; bitangent = normal x tangent.
    const FACES: [([f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0]),
        ([0.0, 0.0, 1.0], [-1.0, 0.0, 0.0]),
        ([0.0, 0.0, -1.0], [1.0, 0.0, 0.0]),
    ];
    const CORNERS: [[f32; 2]; 4] = [[-1.0, -1.0], [-1.0, 1.0], [1.0, 1.0], [1.0, -1.0]];

    let mut vertices = Vec::with_capacity(24);
    for (normal, tangent) in FACES {
        let n = Vec3::from(normal);
        let t = Vec3::from(tangent);
        let b = n.cross(t);
        for [cu, cv] in CORNERS {
            let pos = (n + t * cu + b * cv) * 0.5;
            let uv = [(cu + 1.0) * 0.5, 1.0 - (cv + 1.0) * 0.5];
            vertices.push(v(pos.into(), normal, uv, [t.x, t.y, t.z, 1.0]));
        }
    }

    let indices = (0..6u32)
        .flat_map(|face| {
            let o = face * 4;
            [o, o + 2, o + 1, o, o + 3, o + 2]
        })
        .collect();

    (vertices, indices)
}

/// Two triangles covering clip space, uv in [0, 1].
pub fn fullscreen_quad() -> (Vec<Vertex>, Vec<u32>) {
    let normal = [0.0, 0.0, 1.0];
    let tangent = [1.0, 0.0, 0.0, 1.0];
    let vertices = vec![
        v([-1.0, -1.0, 0.0], normal, [0.0, 0.0], tangent),
        v([1.0, -1.0, 0.0], normal, [1.0, 0.0], tangent),
        v([1.0, 1.0, 0.0], normal, [1.0, 1.0], tangent),
        v([-1.0, 1.0, 0.0], normal, [0.0, 1.0], tangent),
    ];
    (vertices, vec![0, 1, 2, 0, 2, 3])
}

/// Uploads geometry and wraps it in a single-submesh [`MeshResource`]. The
/// result has no submeshes when the device failed to create the vertex array.
pub fn upload_mesh<D: GpuDevice>(
    ctx: &mut GpuContext<D>,
    name: &str,
    vertices: &[Vertex],
    indices: &[u32],
) -> MeshResource {
    let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
    let index_bytes: &[u8] = bytemuck::cast_slice(indices);

    let device = ctx.device_mut();
    let vertex_buffer = device.create_buffer(&BufferDescriptor {
        label: name,
        size: vertex_bytes.len() as u64,
        usage: BufferUsage::STATIC,
    });
    device.upload_buffer(vertex_buffer, 0, vertex_bytes);
    let element_buffer = device.create_buffer(&BufferDescriptor {
        label: name,
        size: index_bytes.len() as u64,
        usage: BufferUsage::STATIC,
    });
    device.bind_buffer(element_buffer, BufferBindPoint::Element);
    device.upload_buffer(element_buffer, 0, index_bytes);

    let vertex_array = device.create_vertex_array(&VertexArrayDescriptor {
        label: name,
        attributes: &Vertex::ATTRIBUTES,
        vertex_buffer,
        element_buffer: Some(element_buffer),
        draw_mode: DrawMode::Triangles,
        vertex_count: vertices.len() as u32,
        element_count: indices.len() as u32,
    });

    let mut mesh = MeshResource::new(name);
    mesh.buffers = vec![vertex_buffer, element_buffer];
    if vertex_array.is_null() {
        log::error!("Failed to create vertex array for mesh '{}'", name);
        return mesh;
    }
    mesh.with_submesh(SubMesh {
        vertex_array,
        draw_count: indices.len() as u32,
        material_slot: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_counts_look_right() {
        let (v, i) = cube_mesh();
        assert_eq!(v.len(), 24);
        assert_eq!(i.len(), 36);
    }

    #[test]
    fn cube_faces_wind_outward() {
        let (vertices, indices) = cube_mesh();
        for tri in indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vec3::from(vertices[i as usize].pos));
            let face_normal = (b - a).cross(c - a);
            let normal = Vec3::from(vertices[tri[0] as usize].normal);
            assert!(face_normal.dot(normal) > 0.0);
        }
    }

    #[test]
    fn cube_corners_sit_on_half_extent() {
        let (vertices, _) = cube_mesh();
        for vertex in vertices {
            assert!(vertex.pos.iter().all(|c| (c.abs() - 0.5).abs() < 1e-6));
        }
    }

    #[test]
    fn sphere_vertices_are_unit_length() {
        let (vertices, indices) = sphere_mesh(8, 4);
        assert_eq!(indices.len(), 8 * 4 * 6);
        for vertex in vertices {
            assert!((Vec3::from(vertex.pos).length() - 1.0).abs() < 1e-5);
        }
    }
}
