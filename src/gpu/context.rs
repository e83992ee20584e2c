use glam::UVec2;

use super::{
    FramebufferBindMode, FramebufferHandle, GpuDevice, PipelineState, ShaderHandle,
    VertexArrayHandle, Viewport,
};

/// Owns the device and mirrors the state bound on it, so callers can ask for
/// a bind without checking whether it is already in place.
pub struct GpuContext<D: GpuDevice> {
    device: D,
    size: UVec2,
    bound_shader: Option<ShaderHandle>,
    bound_vertex_array: Option<VertexArrayHandle>,
    bound_framebuffer: Option<Option<FramebufferHandle>>,
    pipeline_state: Option<PipelineState>,
    viewport: Option<Viewport>,
    draw_calls: u32,
    elided_binds: u32,
}

impl<D: GpuDevice> GpuContext<D> {
    pub fn new(device: D, size: UVec2) -> Self {
        Self {
            device,
            size,
            bound_shader: None,
            bound_vertex_array: None,
            bound_framebuffer: None,
            pipeline_state: None,
            viewport: None,
            draw_calls: 0,
            elided_binds: 0,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Raw access for calls that have no cached state.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn resize(&mut self, size: UVec2) {
        if size.x == 0 || size.y == 0 {
            return;
        }
        self.size = size;
    }

    /// Binds `shader` unless it is already current. Returns `true` when a bind
    /// was issued.
    pub fn use_shader(&mut self, shader: ShaderHandle) -> bool {
        if self.bound_shader == Some(shader) {
            self.elided_binds += 1;
            return false;
        }
        self.device.use_shader(shader);
        self.bound_shader = Some(shader);
        true
    }

    pub fn bound_shader(&self) -> Option<ShaderHandle> {
        self.bound_shader
    }

    pub fn bind_vertex_array(&mut self, vertex_array: VertexArrayHandle) -> bool {
        if self.bound_vertex_array == Some(vertex_array) {
            self.elided_binds += 1;
            return false;
        }
        self.device.bind_vertex_array(vertex_array);
        self.bound_vertex_array = Some(vertex_array);
        true
    }

    pub fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) -> bool {
        if self.bound_framebuffer == Some(framebuffer) {
            self.elided_binds += 1;
            return false;
        }
        self.device
            .bind_framebuffer(framebuffer, FramebufferBindMode::ReadWrite);
        self.bound_framebuffer = Some(framebuffer);
        true
    }

    pub fn configure_pipeline_state(&mut self, state: &PipelineState) -> bool {
        if self.pipeline_state.as_ref() == Some(state) {
            self.elided_binds += 1;
            return false;
        }
        self.device.configure_pipeline_state(state);
        self.pipeline_state = Some(*state);
        if let Some(viewport) = state.viewport {
            self.viewport = Some(viewport);
        }
        true
    }

    pub fn set_viewport(&mut self, viewport: Viewport) -> bool {
        if self.viewport == Some(viewport) {
            self.elided_binds += 1;
            return false;
        }
        self.device.set_viewport(viewport);
        self.viewport = Some(viewport);
        true
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    pub fn draw(&mut self, vertex_array: VertexArrayHandle, first: u32, count: u32) {
        self.bind_vertex_array(vertex_array);
        self.device.draw(vertex_array, first, count);
        self.draw_calls += 1;
    }

    pub fn draw_instanced(
        &mut self,
        vertex_array: VertexArrayHandle,
        first: u32,
        count: u32,
        instance_count: u32,
    ) {
        self.bind_vertex_array(vertex_array);
        self.device
            .draw_instanced(vertex_array, first, count, instance_count);
        self.draw_calls += 1;
    }

    pub fn draw_calls(&self) -> u32 {
        self.draw_calls
    }

    pub fn elided_binds(&self) -> u32 {
        self.elided_binds
    }

    /// Forgets what is bound. Needed after anything outside this context
    /// touched the device, and after an object that may be cached was
    /// destroyed.
    pub fn invalidate(&mut self) {
        self.bound_shader = None;
        self.bound_vertex_array = None;
        self.bound_framebuffer = None;
        self.pipeline_state = None;
        self.viewport = None;
    }
}
