// renderer/batch.rs
use std::collections::HashMap;
use std::ops::Range;

use crate::asset::{Assets, Handle};
use crate::error::RenderError;
use crate::gpu::{BufferBindPoint, GpuContext, GpuDevice, Key, ShaderHandle, VertexArrayHandle};
use crate::scene::{ActorId, RenderScene};
use crate::settings::StreamingSettings;

use super::material::{
    Material, MaterialRegistry, MaterialType, PrepassDescriptor, MATERIAL_DATA_ALIGNMENT,
};
use super::objects::{normal_multiplier, ActorData, InstanceData};
use super::streaming::{ActiveFrame, FrameDataStreamer, FrameRing};
use super::uniforms;

/// Instances drawn by one instanced call.
pub const MAX_BATCH_SIZE: usize = 64;

/// What a batch is keyed by. Meshes only share a batch when they share
/// geometry, material layout and shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub vertex_array: VertexArrayHandle,
    pub material_type: MaterialType,
    pub shader: ShaderHandle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchedMesh {
    pub material: Handle<Material>,
    pub normal_multiplier: f32,
    pub actor_index: u32,
}

#[derive(Debug, Clone)]
pub struct MeshBatch {
    pub key: BatchKey,
    /// Vertices or elements per instance.
    pub draw_count: u32,
    pub meshes: Vec<BatchedMesh>,
    /// First entry of this batch in the instance stream.
    pub batched_so_far: u32,
    /// Relative to the start of the frame's material region.
    pub material_data_offset: u64,
    pub material_data_size: u64,
    pub prepass: PrepassDescriptor,
}

impl MeshBatch {
    fn new(key: BatchKey, draw_count: u32) -> Self {
        Self {
            key,
            draw_count,
            meshes: Vec::with_capacity(MAX_BATCH_SIZE),
            batched_so_far: 0,
            material_data_offset: 0,
            material_data_size: 0,
            prepass: PrepassDescriptor::default(),
        }
    }

    pub fn size(&self) -> u32 {
        self.meshes.len() as u32
    }

    pub fn is_full(&self) -> bool {
        self.meshes.len() >= MAX_BATCH_SIZE
    }

    pub fn instance_range(&self) -> Range<u32> {
        self.batched_so_far..self.batched_so_far + self.size()
    }

    pub fn shader(&self) -> ShaderHandle {
        self.key.shader
    }

    pub fn vertex_array(&self) -> VertexArrayHandle {
        self.key.vertex_array
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub meshes: u32,
    pub skipped_meshes: u32,
    pub skipped_submeshes: u32,
    pub actors: u32,
    pub batches: u32,
    pub instances: u32,
    pub material_bytes: u64,
}

/// CPU side of one frame's batching: the draw list plus the three blocks
/// streamed to the GPU.
#[derive(Debug, Clone, Default)]
pub struct FrameBatches {
    pub batches: Vec<MeshBatch>,
    pub actors: Vec<ActorData>,
    pub instances: Vec<InstanceData>,
    pub material_data: Vec<u8>,
    pub stats: BatchStats,
}

impl FrameBatches {
    pub fn build(scene: &RenderScene, assets: &Assets, registry: &MaterialRegistry) -> Self {
        let mut frame = Self::default();
        let mut actor_lookup: HashMap<ActorId, u32> = HashMap::new();
        let mut open_batches: HashMap<BatchKey, usize> = HashMap::new();

        for static_mesh in &scene.static_meshes {
            frame.stats.meshes += 1;

            let Some(mesh) = static_mesh.mesh.and_then(|handle| assets.meshes.get(handle)) else {
                log::warn!(
                    "Skipping actor {}: {}",
                    static_mesh.actor_id,
                    RenderError::missing("mesh")
                );
                frame.stats.skipped_meshes += 1;
                continue;
            };
            if !mesh.is_resident() {
                log::warn!(
                    "Skipping actor {}: {}",
                    static_mesh.actor_id,
                    RenderError::missing(format!("vertex array of mesh '{}'", mesh.name))
                );
                frame.stats.skipped_meshes += 1;
                continue;
            }

            for submesh in &mesh.submeshes {
                let resolved = static_mesh.material(submesh.material_slot).and_then(|handle| {
                    assets
                        .materials
                        .get(handle)
                        .map(|material| (handle, material))
                });
                let Some((material_handle, material)) = resolved else {
                    log::warn!(
                        "Skipping submesh of '{}' on actor {}: {}",
                        mesh.name,
                        static_mesh.actor_id,
                        RenderError::missing(format!("material slot {}", submesh.material_slot))
                    );
                    frame.stats.skipped_submeshes += 1;
                    continue;
                };

                let shader = registry.resolve_shader(material);
                if shader.is_null() {
                    log::warn!(
                        "Skipping submesh of '{}': {}",
                        mesh.name,
                        RenderError::missing(format!(
                            "shader for {} material '{}'",
                            material.material_type().name(),
                            material.name
                        ))
                    );
                    frame.stats.skipped_submeshes += 1;
                    continue;
                }

                let actor_index = *actor_lookup.entry(static_mesh.actor_id).or_insert_with(|| {
                    frame.actors.push(ActorData::new(
                        static_mesh.transform.matrix(),
                        static_mesh.reverse_normals,
                        static_mesh.actor_id,
                    ));
                    frame.actors.len() as u32 - 1
                });

                let key = BatchKey {
                    vertex_array: submesh.vertex_array,
                    material_type: material.material_type(),
                    shader,
                };
                let batch_index = match open_batches.get(&key) {
                    Some(&index) if !frame.batches[index].is_full() => index,
                    _ => {
                        frame.batches.push(MeshBatch::new(key, submesh.draw_count));
                        let index = frame.batches.len() - 1;
                        open_batches.insert(key, index);
                        index
                    }
                };

                let batch = &mut frame.batches[batch_index];
                batch.prepass = batch.prepass.merge(material.prepass_descriptor());
                batch.meshes.push(BatchedMesh {
                    material: material_handle,
                    normal_multiplier: normal_multiplier(static_mesh.reverse_normals),
                    actor_index,
                });
            }
        }

        frame.write_instances_and_materials(assets);
        frame
    }

    /// Lays the batches out back to back in the instance stream and gives
    /// each one an aligned region of serialized materials.
    fn write_instances_and_materials(&mut self, assets: &Assets) {
        let mut batched_so_far = 0u32;
        for batch in &mut self.batches {
            batch.batched_so_far = batched_so_far;
            batched_so_far += batch.size();

            let aligned = align_to(self.material_data.len() as u64, MATERIAL_DATA_ALIGNMENT);
            self.material_data.resize(aligned as usize, 0);
            batch.material_data_offset = aligned;

            let mut written = 0usize;
            for batched in &batch.meshes {
                self.instances.push(InstanceData {
                    actor_index: batched.actor_index,
                });
                if let Some(material) = assets.materials.get(batched.material) {
                    written += material.serialize_shader_params(&mut self.material_data);
                }
            }
            batch.material_data_size = written as u64;
        }

        self.stats.actors = self.actors.len() as u32;
        self.stats.batches = self.batches.len() as u32;
        self.stats.instances = self.instances.len() as u32;
        self.stats.material_bytes = self.material_data.len() as u64;
    }

    pub fn instance_count(&self) -> u32 {
        self.batches.iter().map(MeshBatch::size).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

fn align_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// Byte offsets of this frame's regions in the three streams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamOffsets {
    pub actors: u64,
    pub instances: u64,
    pub materials: u64,
}

/// Builds the frame's batches and streams their data to the GPU.
pub struct SceneBatcher {
    actor_stream: FrameDataStreamer,
    instance_stream: FrameDataStreamer,
    material_stream: FrameDataStreamer,
    frame: FrameBatches,
    offsets: StreamOffsets,
}

impl SceneBatcher {
    pub fn new<D: GpuDevice>(
        ctx: &mut GpuContext<D>,
        settings: &StreamingSettings,
        slots: usize,
    ) -> Self {
        let actor_bytes = settings.max_actors as u64 * std::mem::size_of::<ActorData>() as u64;
        let instance_bytes =
            settings.max_instances as u64 * std::mem::size_of::<InstanceData>() as u64;
        // Keeps every slot start a valid storage range offset.
        let material_bytes = align_to(settings.material_bytes, MATERIAL_DATA_ALIGNMENT);

        Self {
            actor_stream: FrameDataStreamer::new(
                ctx,
                "Actor Data",
                align_to(actor_bytes, MATERIAL_DATA_ALIGNMENT),
                slots,
            ),
            instance_stream: FrameDataStreamer::new(
                ctx,
                "Instance Data",
                align_to(instance_bytes, MATERIAL_DATA_ALIGNMENT),
                slots,
            ),
            material_stream: FrameDataStreamer::new(ctx, "Material Data", material_bytes, slots),
            frame: FrameBatches::default(),
            offsets: StreamOffsets::default(),
        }
    }

    /// Rebuilds the batches from `scene`, uploads them into `frame`'s ring
    /// slot and binds the actor and instance regions for the frame.
    pub fn prepare<D: GpuDevice>(
        &mut self,
        ctx: &mut GpuContext<D>,
        ring: &mut FrameRing,
        frame: &ActiveFrame,
        assets: &Assets,
        scene: &RenderScene,
        registry: &MaterialRegistry,
    ) -> &FrameBatches {
        self.frame = FrameBatches::build(scene, assets, registry);

        let batches = &self.frame;
        self.offsets = StreamOffsets {
            actors: self.actor_stream.upload(
                ctx,
                ring,
                frame,
                bytemuck::cast_slice(&batches.actors),
            ),
            instances: self.instance_stream.upload(
                ctx,
                ring,
                frame,
                bytemuck::cast_slice(&batches.instances),
            ),
            materials: self
                .material_stream
                .upload(ctx, ring, frame, &batches.material_data),
        };

        if !batches.is_empty() {
            let device = ctx.device_mut();
            device.bind_buffer_range(
                self.actor_stream.buffer(),
                BufferBindPoint::ShaderStorage,
                uniforms::ACTOR_DATA_BINDING,
                self.offsets.actors,
                std::mem::size_of_val(batches.actors.as_slice()) as u64,
            );
            device.bind_buffer_range(
                self.instance_stream.buffer(),
                BufferBindPoint::ShaderStorage,
                uniforms::INSTANCE_DATA_BINDING,
                self.offsets.instances,
                std::mem::size_of_val(batches.instances.as_slice()) as u64,
            );
        }

        log::trace!(
            "Batched {} meshes into {} batches ({} instances, {} actors)",
            batches.stats.meshes,
            batches.stats.batches,
            batches.stats.instances,
            batches.stats.actors
        );
        &self.frame
    }

    /// Binds the material region of `batch` for the current frame.
    pub fn bind_materials<D: GpuDevice>(&self, ctx: &mut GpuContext<D>, batch: &MeshBatch) {
        if batch.material_data_size == 0 {
            return;
        }
        ctx.device_mut().bind_buffer_range(
            self.material_stream.buffer(),
            BufferBindPoint::ShaderStorage,
            uniforms::MATERIAL_DATA_BINDING,
            self.offsets.materials + batch.material_data_offset,
            batch.material_data_size,
        );
    }

    pub fn frame(&self) -> &FrameBatches {
        &self.frame
    }

    pub fn offsets(&self) -> StreamOffsets {
        self.offsets
    }

    pub fn destroy<D: GpuDevice>(self, ctx: &mut GpuContext<D>) {
        self.actor_stream.destroy(ctx);
        self.instance_stream.destroy(ctx);
        self.material_stream.destroy(ctx);
    }
}
