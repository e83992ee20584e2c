// scene/mod.rs

pub mod camera;
pub mod render_scene;
pub mod transform;

pub use camera::Camera;
pub use render_scene::{ActorId, RenderScene, RenderView, Skybox, StaticMesh};
pub use transform::Transform;
