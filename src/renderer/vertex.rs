use bytemuck::{Pod, Zeroable};
use std::mem;

use crate::gpu::{AttributeKind, VertexAttribute};

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub tangent: [f32; 4],
}

const STRIDE: u32 = mem::size_of::<Vertex>() as u32;

impl Vertex {
    pub const ATTRIBUTES: [VertexAttribute; 4] = [
        attribute(0, 3, 0),
        attribute(1, 3, 12),
        attribute(2, 2, 24),
        attribute(3, 4, 32),
    ];
}

const fn attribute(location: u32, components: u8, offset: u32) -> VertexAttribute {
    VertexAttribute {
        location,
        components,
        kind: AttributeKind::Float,
        offset,
        stride: STRIDE,
    }
}

#[inline]
pub fn v(pos: [f32; 3], normal: [f32; 3], uv: [f32; 2], tangent: [f32; 4]) -> Vertex {
    Vertex {
        pos,
        normal,
        uv,
        tangent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_cover_the_whole_vertex() {
        assert_eq!(STRIDE, 48);
        let last = Vertex::ATTRIBUTES[3];
        assert_eq!(last.offset + last.components as u32 * 4, STRIDE);
    }
}
