//! In-memory device that records every call instead of talking to a driver.
//!
//! Object storage is real (buffers hold bytes, framebuffers validate their
//! attachments, shaders know which uniforms they declare), fences follow a
//! simple submission model and every call lands in an inspectable command
//! log. It backs the test suite and the headless demo.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use glam::UVec2;
use slotmap::SlotMap;

use super::handle::{
    BufferHandle, FenceHandle, FramebufferHandle, ShaderHandle, TextureHandle, VertexArrayHandle,
};
use super::types::*;
use super::GpuDevice;

const BINDLESS_HANDLE_BASE: u64 = 0x1000_0000;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BindBuffer {
        buffer: BufferHandle,
        bind_point: BufferBindPoint,
    },
    BindBufferRange {
        buffer: BufferHandle,
        bind_point: BufferBindPoint,
        slot: u32,
        offset: u64,
        size: u64,
    },
    MapBuffer {
        buffer: BufferHandle,
        access: MapAccess,
        offset: u64,
        size: u64,
    },
    UnmapBuffer(BufferHandle),
    UploadBuffer {
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    },
    CopyBuffer {
        src: BufferHandle,
        dst: BufferHandle,
        size: u64,
    },
    BindTexture {
        texture: TextureHandle,
        unit: u32,
    },
    MakeResident(TextureHandle),
    MakeNonResident(TextureHandle),
    BindFramebuffer(Option<FramebufferHandle>),
    SetColorAttachment {
        framebuffer: FramebufferHandle,
        index: u32,
        texture: Option<TextureHandle>,
    },
    SetDepthAttachment {
        framebuffer: FramebufferHandle,
        texture: Option<TextureHandle>,
    },
    SetupDrawBuffers(FramebufferHandle),
    DisableColorOutput(FramebufferHandle),
    Clear {
        flags: ClearFlags,
        color: [f32; 4],
        depth: f32,
    },
    ReadPixels {
        framebuffer: FramebufferHandle,
        attachment: u32,
        rect: Viewport,
    },
    ReadPixelsIntoBuffer {
        framebuffer: FramebufferHandle,
        attachment: u32,
        buffer: BufferHandle,
    },
    UseShader(ShaderHandle),
    SetUniform {
        shader: ShaderHandle,
        name: String,
        value: UniformValue,
    },
    SetTextureUniform {
        shader: ShaderHandle,
        name: String,
        texture: TextureHandle,
    },
    BindVertexArray(VertexArrayHandle),
    Draw {
        vertex_array: VertexArrayHandle,
        first: u32,
        count: u32,
    },
    DrawInstanced {
        vertex_array: VertexArrayHandle,
        first: u32,
        count: u32,
        instance_count: u32,
    },
    CreateFence(FenceHandle),
    WaitFence {
        fence: FenceHandle,
        timeout: Duration,
        signaled: bool,
    },
    FreeFence(FenceHandle),
    Flush,
    Finish,
    SetViewport(Viewport),
    ConfigurePipelineState(PipelineState),
}

/// Live object counts, used to check that teardown released everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectCounts {
    pub buffers: usize,
    pub textures: usize,
    pub framebuffers: usize,
    pub shaders: usize,
    pub vertex_arrays: usize,
    pub fences: usize,
}

struct BufferEntry {
    label: String,
    data: Vec<u8>,
    mapped: bool,
}

struct TextureEntry {
    label: String,
    kind: TextureKind,
    size: UVec2,
    format: PixelFormat,
    filter: TextureFilter,
    wrap: TextureWrap,
    data: Option<Vec<u8>>,
    bindless: Option<u64>,
    resident: bool,
}

impl TextureEntry {
    fn byte_size(&self) -> usize {
        TextureDescriptor {
            label: &self.label,
            kind: self.kind,
            size: self.size,
            format: self.format,
            filter: self.filter,
            wrap: self.wrap,
        }
        .byte_size()
    }
}

struct FramebufferEntry {
    label: String,
    colors: BTreeMap<u32, TextureHandle>,
    depth: Option<TextureHandle>,
    color_output: bool,
}

struct ShaderEntry {
    label: String,
    declared: HashSet<String>,
    values: HashMap<String, UniformValue>,
    textures: HashMap<String, TextureHandle>,
}

struct VertexArrayEntry {
    label: String,
    draw_count: u32,
}

struct FenceEntry {
    submission: u64,
}

pub struct HeadlessDevice {
    buffers: SlotMap<BufferHandle, BufferEntry>,
    textures: SlotMap<TextureHandle, TextureEntry>,
    framebuffers: SlotMap<FramebufferHandle, FramebufferEntry>,
    shaders: SlotMap<ShaderHandle, ShaderEntry>,
    vertex_arrays: SlotMap<VertexArrayHandle, VertexArrayEntry>,
    fences: SlotMap<FenceHandle, FenceEntry>,
    commands: Vec<Command>,
    next_bindless: u64,
    submitted: u64,
    completed: u64,
    gpu_latency: u64,
    stalled: bool,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self {
            buffers: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            framebuffers: SlotMap::with_key(),
            shaders: SlotMap::with_key(),
            vertex_arrays: SlotMap::with_key(),
            fences: SlotMap::with_key(),
            commands: Vec::new(),
            next_bindless: BINDLESS_HANDLE_BASE,
            submitted: 0,
            completed: 0,
            gpu_latency: 1,
            stalled: false,
        }
    }

    /// Number of submissions the simulated GPU trails behind the CPU.
    pub fn set_gpu_latency(&mut self, submissions: u64) {
        self.gpu_latency = submissions;
    }

    /// A stalled GPU never completes work, so blocking fence waits time out.
    pub fn set_stalled(&mut self, stalled: bool) {
        self.stalled = stalled;
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn object_counts(&self) -> ObjectCounts {
        ObjectCounts {
            buffers: self.buffers.len(),
            textures: self.textures.len(),
            framebuffers: self.framebuffers.len(),
            shaders: self.shaders.len(),
            vertex_arrays: self.vertex_arrays.len(),
            fences: self.fences.len(),
        }
    }

    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(buffer).map(|entry| entry.data.as_slice())
    }

    pub fn texture_data(&self, texture: TextureHandle) -> Option<&[u8]> {
        self.textures
            .get(texture)
            .and_then(|entry| entry.data.as_deref())
    }

    /// Overwrites texel storage, standing in for what a draw would have
    /// produced.
    pub fn write_texture(&mut self, texture: TextureHandle, data: &[u8]) {
        let Some(entry) = self.textures.get_mut(texture) else {
            log::warn!("write_texture on unknown texture");
            return;
        };
        let mut storage = vec![0u8; entry.byte_size()];
        let len = storage.len().min(data.len());
        storage[..len].copy_from_slice(&data[..len]);
        entry.data = Some(storage);
    }

    pub fn texture_format(&self, texture: TextureHandle) -> Option<PixelFormat> {
        self.textures.get(texture).map(|entry| entry.format)
    }

    pub fn texture_kind(&self, texture: TextureHandle) -> Option<TextureKind> {
        self.textures.get(texture).map(|entry| entry.kind)
    }

    pub fn is_resident(&self, texture: TextureHandle) -> bool {
        self.textures
            .get(texture)
            .map(|entry| entry.resident)
            .unwrap_or(false)
    }

    pub fn uniform(&self, shader: ShaderHandle, name: &str) -> Option<UniformValue> {
        self.shaders
            .get(shader)
            .and_then(|entry| entry.values.get(name).copied())
    }

    pub fn texture_uniform(&self, shader: ShaderHandle, name: &str) -> Option<TextureHandle> {
        self.shaders
            .get(shader)
            .and_then(|entry| entry.textures.get(name).copied())
    }

    pub fn shader_label(&self, shader: ShaderHandle) -> Option<&str> {
        self.shaders.get(shader).map(|entry| entry.label.as_str())
    }

    pub fn vertex_array_label(&self, vertex_array: VertexArrayHandle) -> Option<&str> {
        self.vertex_arrays
            .get(vertex_array)
            .map(|entry| entry.label.as_str())
    }

    pub fn framebuffer_label(&self, framebuffer: FramebufferHandle) -> Option<&str> {
        self.framebuffers
            .get(framebuffer)
            .map(|entry| entry.label.as_str())
    }

    pub fn framebuffer_depth_attachment(&self, framebuffer: FramebufferHandle) -> Option<TextureHandle> {
        self.framebuffers
            .get(framebuffer)
            .and_then(|entry| entry.depth)
    }

    pub fn fence_signaled(&self, fence: FenceHandle) -> bool {
        self.fences
            .get(fence)
            .map(|entry| self.completed >= entry.submission)
            .unwrap_or(false)
    }

    fn record(&mut self, command: Command) {
        self.commands.push(command);
    }

    fn submit(&mut self) {
        self.submitted += 1;
        if !self.stalled {
            self.completed = self
                .completed
                .max(self.submitted.saturating_sub(self.gpu_latency));
        }
    }

    fn attachment_size(&self, texture: TextureHandle) -> Option<(UVec2, PixelFormat)> {
        self.textures
            .get(texture)
            .map(|entry| (entry.size, entry.format))
    }

    fn attachment_texture(
        &self,
        framebuffer: FramebufferHandle,
        attachment: u32,
    ) -> Option<TextureHandle> {
        self.framebuffers
            .get(framebuffer)
            .and_then(|entry| entry.colors.get(&attachment).copied())
    }

    fn read_region(&self, texture: Option<TextureHandle>, rect: Viewport) -> Vec<u8> {
        let Some(entry) = texture.and_then(|handle| self.textures.get(handle)) else {
            return Vec::new();
        };
        let bpp = entry.format.bytes_per_pixel() as usize;
        let row_bytes = rect.width as usize * bpp;
        let mut out = vec![0u8; row_bytes * rect.height as usize];
        let Some(data) = entry.data.as_deref() else {
            return out;
        };

        let width = entry.size.x as usize;
        for row in 0..rect.height as usize {
            let src_y = rect.y.max(0) as usize + row;
            let src_x = rect.x.max(0) as usize;
            if src_y >= entry.size.y as usize || src_x >= width {
                continue;
            }
            let copy = (width - src_x).min(rect.width as usize) * bpp;
            let src = (src_y * width + src_x) * bpp;
            out[row * row_bytes..row * row_bytes + copy].copy_from_slice(&data[src..src + copy]);
        }
        out
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for HeadlessDevice {
    fn create_buffer(&mut self, desc: &BufferDescriptor<'_>) -> BufferHandle {
        log::debug!("Creating buffer '{}' ({} bytes)", desc.label, desc.size);
        self.buffers.insert(BufferEntry {
            label: desc.label.to_string(),
            data: vec![0; desc.size as usize],
            mapped: false,
        })
    }

    fn bind_buffer(&mut self, buffer: BufferHandle, bind_point: BufferBindPoint) {
        self.record(Command::BindBuffer { buffer, bind_point });
    }

    fn bind_buffer_range(
        &mut self,
        buffer: BufferHandle,
        bind_point: BufferBindPoint,
        slot: u32,
        offset: u64,
        size: u64,
    ) {
        match self.buffers.get(buffer) {
            Some(entry) if offset + size <= entry.data.len() as u64 => {}
            Some(entry) => {
                log::warn!(
                    "Range {}..{} exceeds buffer '{}'",
                    offset,
                    offset + size,
                    entry.label
                );
                return;
            }
            None => {
                log::warn!("bind_buffer_range on unknown buffer");
                return;
            }
        }
        self.record(Command::BindBufferRange {
            buffer,
            bind_point,
            slot,
            offset,
            size,
        });
    }

    fn map_buffer_range(
        &mut self,
        buffer: BufferHandle,
        access: MapAccess,
        offset: u64,
        size: u64,
    ) -> Option<&mut [u8]> {
        self.commands.push(Command::MapBuffer {
            buffer,
            access,
            offset,
            size,
        });
        let entry = self.buffers.get_mut(buffer)?;
        if entry.mapped {
            log::warn!("Buffer '{}' is already mapped", entry.label);
            return None;
        }
        let start = offset as usize;
        let end = start.checked_add(size as usize)?;
        if end > entry.data.len() {
            log::warn!(
                "Map range {}..{} exceeds buffer '{}' ({} bytes)",
                start,
                end,
                entry.label,
                entry.data.len()
            );
            return None;
        }
        entry.mapped = true;
        Some(&mut entry.data[start..end])
    }

    fn unmap_buffer(&mut self, buffer: BufferHandle) {
        if let Some(entry) = self.buffers.get_mut(buffer) {
            entry.mapped = false;
        }
        self.record(Command::UnmapBuffer(buffer));
    }

    fn upload_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let Some(entry) = self.buffers.get_mut(buffer) else {
            log::warn!("upload_buffer on unknown buffer");
            return;
        };
        let start = offset as usize;
        let end = start + data.len();
        if end > entry.data.len() {
            log::warn!("Upload of {} bytes overflows buffer '{}'", data.len(), entry.label);
            return;
        }
        entry.data[start..end].copy_from_slice(data);
        self.record(Command::UploadBuffer {
            buffer,
            offset,
            size: data.len() as u64,
        });
    }

    fn copy_buffer(
        &mut self,
        src: BufferHandle,
        dst: BufferHandle,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) {
        let Some(bytes) = self.buffers.get(src).and_then(|entry| {
            entry
                .data
                .get(src_offset as usize..(src_offset + size) as usize)
                .map(|slice| slice.to_vec())
        }) else {
            log::warn!("copy_buffer source range is invalid");
            return;
        };
        self.upload_buffer(dst, dst_offset, &bytes);
        self.record(Command::CopyBuffer { src, dst, size });
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(buffer);
    }

    fn create_texture(
        &mut self,
        desc: &TextureDescriptor<'_>,
        data: Option<&[u8]>,
    ) -> TextureHandle {
        if desc.size.x == 0 || desc.size.y == 0 {
            log::error!("Texture '{}' has zero size", desc.label);
            return TextureHandle::default();
        }
        let data = data.map(|bytes| {
            let mut storage = vec![0u8; desc.byte_size()];
            let len = storage.len().min(bytes.len());
            storage[..len].copy_from_slice(&bytes[..len]);
            storage
        });
        self.textures.insert(TextureEntry {
            label: desc.label.to_string(),
            kind: desc.kind,
            size: desc.size,
            format: desc.format,
            filter: desc.filter,
            wrap: desc.wrap,
            data,
            bindless: None,
            resident: false,
        })
    }

    fn bind_texture(&mut self, texture: TextureHandle, unit: u32) {
        self.record(Command::BindTexture { texture, unit });
    }

    fn set_texture_filter(&mut self, texture: TextureHandle, filter: TextureFilter) {
        if let Some(entry) = self.textures.get_mut(texture) {
            entry.filter = filter;
        }
    }

    fn set_texture_wrap(&mut self, texture: TextureHandle, wrap: TextureWrap) {
        if let Some(entry) = self.textures.get_mut(texture) {
            entry.wrap = wrap;
        }
    }

    fn texture_size(&self, texture: TextureHandle) -> Option<UVec2> {
        self.textures.get(texture).map(|entry| entry.size)
    }

    fn bindless_handle(&mut self, texture: TextureHandle) -> u64 {
        let Some(entry) = self.textures.get_mut(texture) else {
            log::warn!("bindless_handle requested for unknown texture");
            return 0;
        };
        if let Some(handle) = entry.bindless {
            return handle;
        }
        let handle = self.next_bindless;
        self.next_bindless += 1;
        entry.bindless = Some(handle);
        handle
    }

    fn make_texture_resident(&mut self, texture: TextureHandle) {
        if let Some(entry) = self.textures.get_mut(texture) {
            entry.resident = true;
        }
        self.record(Command::MakeResident(texture));
    }

    fn make_texture_non_resident(&mut self, texture: TextureHandle) {
        if let Some(entry) = self.textures.get_mut(texture) {
            entry.resident = false;
        }
        self.record(Command::MakeNonResident(texture));
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(entry) = self.textures.remove(texture) {
            if entry.resident {
                log::warn!("Texture '{}' destroyed while resident", entry.label);
            }
        }
    }

    fn create_framebuffer(&mut self, label: &str) -> FramebufferHandle {
        self.framebuffers.insert(FramebufferEntry {
            label: label.to_string(),
            colors: BTreeMap::new(),
            depth: None,
            color_output: true,
        })
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>, _mode: FramebufferBindMode) {
        self.record(Command::BindFramebuffer(framebuffer));
    }

    fn set_color_attachment(
        &mut self,
        framebuffer: FramebufferHandle,
        index: u32,
        texture: Option<TextureHandle>,
    ) {
        let Some(entry) = self.framebuffers.get_mut(framebuffer) else {
            log::warn!("set_color_attachment on unknown framebuffer");
            return;
        };
        match texture {
            Some(texture) => entry.colors.insert(index, texture),
            None => entry.colors.remove(&index),
        };
        self.record(Command::SetColorAttachment {
            framebuffer,
            index,
            texture,
        });
    }

    fn set_depth_attachment(&mut self, framebuffer: FramebufferHandle, texture: Option<TextureHandle>) {
        let Some(entry) = self.framebuffers.get_mut(framebuffer) else {
            log::warn!("set_depth_attachment on unknown framebuffer");
            return;
        };
        entry.depth = texture;
        self.record(Command::SetDepthAttachment {
            framebuffer,
            texture,
        });
    }

    fn setup_draw_buffers(&mut self, framebuffer: FramebufferHandle) {
        if let Some(entry) = self.framebuffers.get_mut(framebuffer) {
            entry.color_output = true;
        }
        self.record(Command::SetupDrawBuffers(framebuffer));
    }

    fn disable_color_output(&mut self, framebuffer: FramebufferHandle) {
        if let Some(entry) = self.framebuffers.get_mut(framebuffer) {
            entry.color_output = false;
        }
        self.record(Command::DisableColorOutput(framebuffer));
    }

    fn framebuffer_status(&self, framebuffer: FramebufferHandle) -> FramebufferStatus {
        let Some(entry) = self.framebuffers.get(framebuffer) else {
            return FramebufferStatus::Undefined;
        };
        if entry.colors.is_empty() && entry.depth.is_none() {
            return FramebufferStatus::MissingAttachment;
        }
        if entry.color_output && entry.colors.is_empty() {
            return FramebufferStatus::IncompleteDrawBuffer;
        }

        let mut size = None;
        for &texture in entry.colors.values() {
            let Some((tex_size, format)) = self.attachment_size(texture) else {
                return FramebufferStatus::IncompleteAttachment;
            };
            if format.is_depth() {
                return FramebufferStatus::IncompleteAttachment;
            }
            if *size.get_or_insert(tex_size) != tex_size {
                return FramebufferStatus::MismatchedDimensions;
            }
        }
        if let Some(depth) = entry.depth {
            let Some((tex_size, format)) = self.attachment_size(depth) else {
                return FramebufferStatus::IncompleteAttachment;
            };
            if !format.is_depth() {
                return FramebufferStatus::IncompleteAttachment;
            }
            if *size.get_or_insert(tex_size) != tex_size {
                return FramebufferStatus::MismatchedDimensions;
            }
        }
        FramebufferStatus::Complete
    }

    fn clear(&mut self, flags: ClearFlags, color: [f32; 4], depth: f32) {
        self.record(Command::Clear {
            flags,
            color,
            depth,
        });
    }

    fn read_pixels(
        &mut self,
        framebuffer: FramebufferHandle,
        attachment: u32,
        rect: Viewport,
    ) -> Vec<u8> {
        self.record(Command::ReadPixels {
            framebuffer,
            attachment,
            rect,
        });
        let texture = self.attachment_texture(framebuffer, attachment);
        self.read_region(texture, rect)
    }

    fn read_pixels_into_buffer(
        &mut self,
        framebuffer: FramebufferHandle,
        attachment: u32,
        rect: Viewport,
        buffer: BufferHandle,
    ) {
        self.record(Command::ReadPixelsIntoBuffer {
            framebuffer,
            attachment,
            buffer,
        });
        let texture = self.attachment_texture(framebuffer, attachment);
        let pixels = self.read_region(texture, rect);
        if let Some(entry) = self.buffers.get_mut(buffer) {
            let len = entry.data.len().min(pixels.len());
            entry.data[..len].copy_from_slice(&pixels[..len]);
        }
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(framebuffer);
    }

    fn compile_shader(&mut self, source: &ShaderSource<'_>) -> ShaderHandle {
        let stages = [Some(source.vertex), Some(source.fragment), source.geometry];
        if stages
            .iter()
            .flatten()
            .any(|stage| !stage.contains("void main"))
        {
            log::error!("Failed to compile shader '{}': missing entry point", source.label);
            return ShaderHandle::default();
        }

        let declared = stages
            .iter()
            .flatten()
            .flat_map(|stage| declared_uniforms(stage))
            .collect();

        self.shaders.insert(ShaderEntry {
            label: source.label.to_string(),
            declared,
            values: HashMap::new(),
            textures: HashMap::new(),
        })
    }

    fn use_shader(&mut self, shader: ShaderHandle) {
        self.record(Command::UseShader(shader));
    }

    fn set_uniform(&mut self, shader: ShaderHandle, name: &str, value: UniformValue) {
        let Some(entry) = self.shaders.get_mut(shader) else {
            log::warn!("set_uniform '{}' on unknown shader", name);
            return;
        };
        if !entry.declared.contains(uniform_root(name)) {
            log::warn!("Uniform '{}' not found in shader '{}'", name, entry.label);
            return;
        }
        entry.values.insert(name.to_string(), value);
        self.record(Command::SetUniform {
            shader,
            name: name.to_string(),
            value,
        });
    }

    fn set_texture_uniform(&mut self, shader: ShaderHandle, name: &str, texture: TextureHandle) {
        let Some(entry) = self.shaders.get_mut(shader) else {
            log::warn!("set_texture_uniform '{}' on unknown shader", name);
            return;
        };
        if !entry.declared.contains(uniform_root(name)) {
            log::warn!("Sampler '{}' not found in shader '{}'", name, entry.label);
            return;
        }
        entry.textures.insert(name.to_string(), texture);
        self.record(Command::SetTextureUniform {
            shader,
            name: name.to_string(),
            texture,
        });
    }

    fn destroy_shader(&mut self, shader: ShaderHandle) {
        self.shaders.remove(shader);
    }

    fn create_vertex_array(&mut self, desc: &VertexArrayDescriptor<'_>) -> VertexArrayHandle {
        if !self.buffers.contains_key(desc.vertex_buffer) {
            log::error!("Vertex array '{}' references a missing vertex buffer", desc.label);
            return VertexArrayHandle::default();
        }
        self.vertex_arrays.insert(VertexArrayEntry {
            label: desc.label.to_string(),
            draw_count: desc.draw_count(),
        })
    }

    fn bind_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        self.record(Command::BindVertexArray(vertex_array));
    }

    fn draw(&mut self, vertex_array: VertexArrayHandle, first: u32, count: u32) {
        if let Some(entry) = self.vertex_arrays.get(vertex_array) {
            if first + count > entry.draw_count {
                log::warn!("Draw range exceeds vertex array '{}'", entry.label);
            }
        }
        self.record(Command::Draw {
            vertex_array,
            first,
            count,
        });
    }

    fn draw_instanced(
        &mut self,
        vertex_array: VertexArrayHandle,
        first: u32,
        count: u32,
        instance_count: u32,
    ) {
        self.record(Command::DrawInstanced {
            vertex_array,
            first,
            count,
            instance_count,
        });
    }

    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        self.vertex_arrays.remove(vertex_array);
    }

    fn create_fence(&mut self) -> FenceHandle {
        let fence = self.fences.insert(FenceEntry {
            submission: self.submitted + 1,
        });
        self.record(Command::CreateFence(fence));
        fence
    }

    fn wait_fence(&mut self, fence: FenceHandle, timeout: Duration) -> bool {
        let Some(submission) = self.fences.get(fence).map(|entry| entry.submission) else {
            log::warn!("wait_fence on unknown fence");
            return false;
        };

        let signaled = if self.completed >= submission {
            true
        } else if timeout.is_zero() || self.stalled {
            false
        } else {
            // A blocking wait implicitly flushes and lets the GPU catch up.
            self.submitted = self.submitted.max(submission);
            self.completed = submission;
            true
        };

        self.record(Command::WaitFence {
            fence,
            timeout,
            signaled,
        });
        signaled
    }

    fn free_fence(&mut self, fence: FenceHandle) {
        self.fences.remove(fence);
        self.record(Command::FreeFence(fence));
    }

    fn flush(&mut self) {
        self.submit();
        self.record(Command::Flush);
    }

    fn finish(&mut self) {
        self.submit();
        if !self.stalled {
            self.completed = self.submitted;
        }
        self.record(Command::Finish);
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.record(Command::SetViewport(viewport));
    }

    fn configure_pipeline_state(&mut self, state: &PipelineState) {
        self.record(Command::ConfigurePipelineState(*state));
    }
}

/// `uLight.Color` and `uSamples[3]` resolve to `uLight` and `uSamples`.
fn uniform_root(name: &str) -> &str {
    let end = name
        .find(|c: char| c == '.' || c == '[')
        .unwrap_or(name.len());
    &name[..end]
}

fn declared_uniforms(source: &str) -> Vec<String> {
    source
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.starts_with("//") {
                return None;
            }
            let start = line.find("uniform ")?;
            let mut tokens = line[start + "uniform ".len()..].split_whitespace();
            let _ty = tokens.next()?;
            let name = tokens.next()?.trim_end_matches(';');
            Some(uniform_root(name).to_string())
        })
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(device: &mut HeadlessDevice, size: u64) -> BufferHandle {
        device.create_buffer(&BufferDescriptor {
            label: "Test",
            size,
            usage: BufferUsage::DYNAMIC | BufferUsage::MAP_WRITE,
        })
    }

    #[test]
    fn declared_uniforms_strip_arrays_and_qualifiers() {
        let names = declared_uniforms(
            "uniform vec3 uSamples[64];\nlayout(bindless_sampler) uniform sampler2D uAmbientOcclusion;\n// uniform float uIgnored;\n",
        );
        assert_eq!(names, vec!["uSamples".to_string(), "uAmbientOcclusion".to_string()]);
    }

    #[test]
    fn unknown_uniform_is_ignored() {
        let mut device = HeadlessDevice::new();
        let shader = device.compile_shader(&ShaderSource {
            label: "Uniforms",
            vertex: "uniform mat4 uModel;\nvoid main() {}",
            fragment: "uniform Light uLight;\nvoid main() {}",
            geometry: None,
        });

        device.set_uniform(shader, "uMissing", UniformValue::Float(1.0));
        device.set_uniform(shader, "uLight.Type", UniformValue::Int(1));

        assert!(device.uniform(shader, "uMissing").is_none());
        assert_eq!(device.uniform(shader, "uLight.Type"), Some(UniformValue::Int(1)));
    }

    #[test]
    fn shader_without_entry_point_yields_null_handle() {
        let mut device = HeadlessDevice::new();
        let shader = device.compile_shader(&ShaderSource {
            label: "Broken",
            vertex: "",
            fragment: "void main() {}",
            geometry: None,
        });
        assert!(slotmap::Key::is_null(&shader));
    }

    #[test]
    fn mapping_out_of_bounds_fails() {
        let mut device = HeadlessDevice::new();
        let buf = buffer(&mut device, 16);
        assert!(device.map_buffer_range(buf, MapAccess::WRITE, 8, 16).is_none());
        assert!(device.map_buffer_range(buf, MapAccess::WRITE, 0, 16).is_some());
        assert!(device.map_buffer_range(buf, MapAccess::WRITE, 0, 4).is_none());
        device.unmap_buffer(buf);
        assert!(device.map_buffer_range(buf, MapAccess::WRITE, 0, 4).is_some());
    }

    #[test]
    fn fence_signals_after_latency() {
        let mut device = HeadlessDevice::new();
        device.set_gpu_latency(2);
        let fence = device.create_fence();
        device.flush();
        assert!(!device.fence_signaled(fence));
        device.flush();
        assert!(!device.fence_signaled(fence));
        device.flush();
        assert!(device.fence_signaled(fence));
    }

    #[test]
    fn zero_timeout_wait_polls_without_blocking() {
        let mut device = HeadlessDevice::new();
        device.set_gpu_latency(5);
        let fence = device.create_fence();
        device.flush();
        assert!(!device.wait_fence(fence, Duration::ZERO));
        assert!(device.wait_fence(fence, Duration::from_millis(10)));
        assert!(device.fence_signaled(fence));
    }

    #[test]
    fn stalled_gpu_times_out() {
        let mut device = HeadlessDevice::new();
        device.set_stalled(true);
        let fence = device.create_fence();
        device.flush();
        assert!(!device.wait_fence(fence, Duration::from_millis(10)));
    }

    #[test]
    fn incomplete_framebuffer_reports_category() {
        let mut device = HeadlessDevice::new();
        let fb = device.create_framebuffer("Empty");
        assert_eq!(device.framebuffer_status(fb), FramebufferStatus::MissingAttachment);

        let color = device.create_texture(
            &TextureDescriptor::new_2d("Color", UVec2::new(4, 4), PixelFormat::RGBA8),
            None,
        );
        let depth = device.create_texture(
            &TextureDescriptor::new_2d("Depth", UVec2::new(8, 8), PixelFormat::Depth24Stencil8),
            None,
        );
        device.set_color_attachment(fb, 0, Some(color));
        device.set_depth_attachment(fb, Some(depth));
        assert_eq!(
            device.framebuffer_status(fb),
            FramebufferStatus::MismatchedDimensions
        );
    }

    #[test]
    fn read_pixels_returns_written_texels() {
        let mut device = HeadlessDevice::new();
        let texture = device.create_texture(
            &TextureDescriptor::new_2d("Ids", UVec2::new(2, 2), PixelFormat::R32UI),
            None,
        );
        let fb = device.create_framebuffer("Ids");
        device.set_color_attachment(fb, 0, Some(texture));
        let ids: [u32; 4] = [1, 2, 3, 4];
        device.write_texture(texture, bytemuck::cast_slice(&ids));

        let bytes = device.read_pixels(
            fb,
            0,
            Viewport {
                x: 1,
                y: 1,
                width: 1,
                height: 1,
            },
        );
        assert_eq!(bytes.len(), 4);
        assert_eq!(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 4);
    }
}
