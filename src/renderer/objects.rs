// renderer/objects.rs
use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::scene::ActorId;

/// Per-actor block of the actor stream, indexed through [`InstanceData`].
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct ActorData {
    pub model: [[f32; 4]; 4], // 64 bytes
    pub normal_multiplier: f32,
    pub actor_id: u32,
    pub _padding: [u32; 2], // keeps the std430 stride at 80 bytes
}

impl ActorData {
    pub fn new(model: Mat4, reverse_normals: bool, actor_id: ActorId) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            normal_multiplier: normal_multiplier(reverse_normals),
            actor_id,
            _padding: [0; 2],
        }
    }

    pub fn model(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model)
    }
}

/// One entry per batched mesh, in batch order. A batch's instances occupy
/// `batched_so_far..batched_so_far + size` of the instance stream.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq, Eq)]
pub struct InstanceData {
    pub actor_index: u32,
}

pub fn normal_multiplier(reverse_normals: bool) -> f32 {
    if reverse_normals {
        -1.0
    } else {
        1.0
    }
}
