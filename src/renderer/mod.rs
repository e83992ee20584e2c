pub mod batch;
pub(crate) mod internal;
pub mod lights;
pub mod material;
pub mod objects;
pub mod postprocess;
pub mod primitives;
pub mod renderer_core;
pub mod streaming;
pub mod uniforms;
pub mod vertex;

pub use batch::{FrameBatches, MeshBatch, SceneBatcher, MAX_BATCH_SIZE};
pub use internal::hit_map::CachedHitMap;
pub use lights::{Light, LightKind, LightType, ShadowMap, ShadowState};
pub use material::{Material, MaterialKind, MaterialRegistry, MaterialType};
pub use objects::{ActorData, InstanceData};
pub use postprocess::PostProcess;
pub use primitives::{cube_mesh, fullscreen_quad, sphere_mesh, upload_mesh};
pub use renderer_core::{Renderer, RendererStats};
pub use streaming::{ActiveFrame, FrameDataStreamer, FrameRing};
pub use vertex::Vertex;
