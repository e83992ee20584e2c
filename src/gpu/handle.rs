//! Generational handles for GPU objects.
//!
//! The device owns one arena per object kind. Destroying an object releases
//! its slot, and any handle still pointing at it stops resolving instead of
//! aliasing whatever reuses the slot.

use slotmap::new_key_type;

pub use slotmap::Key;

new_key_type! {
    pub struct BufferHandle;
    pub struct TextureHandle;
    pub struct FramebufferHandle;
    pub struct ShaderHandle;
    pub struct VertexArrayHandle;
    pub struct FenceHandle;
}
