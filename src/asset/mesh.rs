use crate::gpu::{BufferHandle, GpuContext, GpuDevice, Key, VertexArrayHandle};

/// One draw range of a mesh, shaded by the material in `material_slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubMesh {
    pub vertex_array: VertexArrayHandle,
    pub draw_count: u32,
    pub material_slot: usize,
}

/// GPU-resident geometry. The buffers are owned here and released by
/// [`MeshResource::destroy`].
#[derive(Debug, Clone, Default)]
pub struct MeshResource {
    pub name: String,
    pub submeshes: Vec<SubMesh>,
    pub buffers: Vec<BufferHandle>,
}

impl MeshResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_submesh(mut self, submesh: SubMesh) -> Self {
        self.submeshes.push(submesh);
        self
    }

    pub fn is_resident(&self) -> bool {
        !self.submeshes.is_empty()
            && self
                .submeshes
                .iter()
                .all(|submesh| !submesh.vertex_array.is_null())
    }

    pub fn destroy<D: GpuDevice>(&mut self, ctx: &mut GpuContext<D>) {
        for submesh in self.submeshes.drain(..) {
            ctx.device_mut().destroy_vertex_array(submesh.vertex_array);
        }
        for buffer in self.buffers.drain(..) {
            ctx.device_mut().destroy_buffer(buffer);
        }
        ctx.invalidate();
    }
}
