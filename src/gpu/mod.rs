//! Graphics device abstraction consumed by the render core.
//!
//! Creation failures never panic: the device logs them and hands back a null
//! handle, which the render core treats as a missing resource.

pub mod context;
pub mod handle;
pub mod headless;
pub mod types;

use std::time::Duration;

use glam::UVec2;

pub use context::GpuContext;
pub use handle::{
    BufferHandle, FenceHandle, FramebufferHandle, Key, ShaderHandle, TextureHandle,
    VertexArrayHandle,
};
pub use headless::{Command, HeadlessDevice, ObjectCounts};
pub use types::*;

pub trait GpuDevice {
    // Buffers
    fn create_buffer(&mut self, desc: &BufferDescriptor<'_>) -> BufferHandle;
    fn bind_buffer(&mut self, buffer: BufferHandle, bind_point: BufferBindPoint);
    fn bind_buffer_range(
        &mut self,
        buffer: BufferHandle,
        bind_point: BufferBindPoint,
        slot: u32,
        offset: u64,
        size: u64,
    );
    /// Maps `size` bytes starting at `offset`. `None` when the range is out
    /// of bounds or the buffer is already mapped.
    fn map_buffer_range(
        &mut self,
        buffer: BufferHandle,
        access: MapAccess,
        offset: u64,
        size: u64,
    ) -> Option<&mut [u8]>;
    fn unmap_buffer(&mut self, buffer: BufferHandle);
    fn upload_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);
    fn copy_buffer(
        &mut self,
        src: BufferHandle,
        dst: BufferHandle,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    );
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    // Textures
    fn create_texture(&mut self, desc: &TextureDescriptor<'_>, data: Option<&[u8]>)
        -> TextureHandle;
    fn bind_texture(&mut self, texture: TextureHandle, unit: u32);
    fn set_texture_filter(&mut self, texture: TextureHandle, filter: TextureFilter);
    fn set_texture_wrap(&mut self, texture: TextureHandle, wrap: TextureWrap);
    fn texture_size(&self, texture: TextureHandle) -> Option<UVec2>;
    fn bindless_handle(&mut self, texture: TextureHandle) -> u64;
    fn make_texture_resident(&mut self, texture: TextureHandle);
    fn make_texture_non_resident(&mut self, texture: TextureHandle);
    fn destroy_texture(&mut self, texture: TextureHandle);

    // Framebuffers. `None` addresses the default framebuffer.
    fn create_framebuffer(&mut self, label: &str) -> FramebufferHandle;
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>, mode: FramebufferBindMode);
    fn set_color_attachment(
        &mut self,
        framebuffer: FramebufferHandle,
        index: u32,
        texture: Option<TextureHandle>,
    );
    fn set_depth_attachment(&mut self, framebuffer: FramebufferHandle, texture: Option<TextureHandle>);
    fn setup_draw_buffers(&mut self, framebuffer: FramebufferHandle);
    fn disable_color_output(&mut self, framebuffer: FramebufferHandle);
    fn framebuffer_status(&self, framebuffer: FramebufferHandle) -> FramebufferStatus;
    fn clear(&mut self, flags: ClearFlags, color: [f32; 4], depth: f32);
    fn read_pixels(
        &mut self,
        framebuffer: FramebufferHandle,
        attachment: u32,
        rect: Viewport,
    ) -> Vec<u8>;
    fn read_pixels_into_buffer(
        &mut self,
        framebuffer: FramebufferHandle,
        attachment: u32,
        rect: Viewport,
        buffer: BufferHandle,
    );
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);

    // Shaders
    fn compile_shader(&mut self, source: &ShaderSource<'_>) -> ShaderHandle;
    fn use_shader(&mut self, shader: ShaderHandle);
    /// Unknown uniform names are logged and ignored.
    fn set_uniform(&mut self, shader: ShaderHandle, name: &str, value: UniformValue);
    fn set_texture_uniform(&mut self, shader: ShaderHandle, name: &str, texture: TextureHandle);
    fn destroy_shader(&mut self, shader: ShaderHandle);

    // Vertex arrays
    fn create_vertex_array(&mut self, desc: &VertexArrayDescriptor<'_>) -> VertexArrayHandle;
    fn bind_vertex_array(&mut self, vertex_array: VertexArrayHandle);
    fn draw(&mut self, vertex_array: VertexArrayHandle, first: u32, count: u32);
    fn draw_instanced(
        &mut self,
        vertex_array: VertexArrayHandle,
        first: u32,
        count: u32,
        instance_count: u32,
    );
    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayHandle);

    // Synchronisation
    fn create_fence(&mut self) -> FenceHandle;
    /// Returns whether the fence signaled before `timeout` elapsed.
    fn wait_fence(&mut self, fence: FenceHandle, timeout: Duration) -> bool;
    fn free_fence(&mut self, fence: FenceHandle);
    fn flush(&mut self);
    fn finish(&mut self);

    // Fixed-function state
    fn set_viewport(&mut self, viewport: Viewport);
    fn configure_pipeline_state(&mut self, state: &PipelineState);
}
