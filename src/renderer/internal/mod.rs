pub mod hit_map;
pub mod lighting;
pub mod pipeline;
pub mod prepass;
pub mod shaders;
pub mod shadows;
pub mod targets;

pub(crate) use hit_map::HitMapPass;
pub(crate) use lighting::{LightingInputs, LightingPass};
pub(crate) use prepass::PrepassAndAo;
pub(crate) use shaders::BuiltinShaders;
pub(crate) use shadows::ShadowPass;
pub(crate) use targets::{DepthAttachment, RenderTarget, ScreenGeometry};
