use bitflags::bitflags;
use glam::{Mat4, UVec2, Vec2, Vec3, Vec4};

use super::handle::BufferHandle;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const STATIC = 1 << 0;
        const DYNAMIC = 1 << 1;
        const STREAM = 1 << 2;
        const MAP_READ = 1 << 3;
        const MAP_WRITE = 1 << 4;
        const PERSISTENT = 1 << 5;
        const COHERENT = 1 << 6;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MapAccess: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const PERSISTENT = 1 << 2;
        const COHERENT = 1 << 3;
        const INVALIDATE_RANGE = 1 << 4;
        const INVALIDATE_BUFFER = 1 << 5;
        const UNSYNCHRONIZED = 1 << 6;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u8 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferBindPoint {
    Vertex,
    Element,
    Uniform,
    ShaderStorage,
    PixelPack,
    CopyRead,
    CopyWrite,
}

#[derive(Debug, Clone, Copy)]
pub struct BufferDescriptor<'a> {
    pub label: &'a str,
    pub size: u64,
    pub usage: BufferUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Texture2D,
    Cubemap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    R8,
    R16F,
    R32F,
    RG32F,
    RGB16F,
    RGBA8,
    RGBA16F,
    R32UI,
    Depth24,
    Depth24Stencil8,
    Depth32F,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::R8 => 1,
            PixelFormat::R16F => 2,
            PixelFormat::R32F | PixelFormat::R32UI => 4,
            PixelFormat::Depth24 | PixelFormat::Depth24Stencil8 | PixelFormat::Depth32F => 4,
            PixelFormat::RG32F => 8,
            PixelFormat::RGB16F => 6,
            PixelFormat::RGBA8 => 4,
            PixelFormat::RGBA16F => 8,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(
            self,
            PixelFormat::Depth24 | PixelFormat::Depth24Stencil8 | PixelFormat::Depth32F
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, PixelFormat::Depth24Stencil8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureWrap {
    Repeat,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Debug, Clone, Copy)]
pub struct TextureDescriptor<'a> {
    pub label: &'a str,
    pub kind: TextureKind,
    pub size: UVec2,
    pub format: PixelFormat,
    pub filter: TextureFilter,
    pub wrap: TextureWrap,
}

impl<'a> TextureDescriptor<'a> {
    pub fn new_2d(label: &'a str, size: UVec2, format: PixelFormat) -> Self {
        Self {
            label,
            kind: TextureKind::Texture2D,
            size,
            format,
            filter: TextureFilter::Nearest,
            wrap: TextureWrap::ClampToEdge,
        }
    }

    pub fn new_cubemap(label: &'a str, size: UVec2, format: PixelFormat) -> Self {
        Self {
            kind: TextureKind::Cubemap,
            ..Self::new_2d(label, size, format)
        }
    }

    pub fn with_filter(mut self, filter: TextureFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_wrap(mut self, wrap: TextureWrap) -> Self {
        self.wrap = wrap;
        self
    }

    /// Bytes for the full texture, all cube faces included.
    pub fn byte_size(&self) -> usize {
        let faces = match self.kind {
            TextureKind::Texture2D => 1,
            TextureKind::Cubemap => 6,
        };
        self.size.x as usize * self.size.y as usize * self.format.bytes_per_pixel() as usize * faces
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramebufferBindMode {
    ReadWrite,
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramebufferStatus {
    Complete,
    Undefined,
    MissingAttachment,
    IncompleteAttachment,
    IncompleteDrawBuffer,
    MismatchedDimensions,
    Unsupported,
}

impl FramebufferStatus {
    pub fn is_complete(self) -> bool {
        self == FramebufferStatus::Complete
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ShaderSource<'a> {
    pub label: &'a str,
    pub vertex: &'a str,
    pub fragment: &'a str,
    pub geometry: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Float,
    UnsignedInt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub components: u8,
    pub kind: AttributeKind,
    pub offset: u32,
    pub stride: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawMode {
    Triangles,
    TriangleStrip,
    Lines,
}

#[derive(Debug, Clone, Copy)]
pub struct VertexArrayDescriptor<'a> {
    pub label: &'a str,
    pub attributes: &'a [VertexAttribute],
    pub vertex_buffer: BufferHandle,
    pub element_buffer: Option<BufferHandle>,
    pub draw_mode: DrawMode,
    pub vertex_count: u32,
    pub element_count: u32,
}

impl VertexArrayDescriptor<'_> {
    /// Number of vertices or indices a full draw consumes.
    pub fn draw_count(&self) -> u32 {
        if self.element_buffer.is_some() {
            self.element_count
        } else {
            self.vertex_count
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
}

impl BlendState {
    pub const fn uniform(src: BlendFactor, dst: BlendFactor) -> Self {
        Self {
            src_color: src,
            dst_color: dst,
            src_alpha: src,
            dst_alpha: dst,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn from_size(size: UVec2) -> Self {
        Self {
            x: 0,
            y: 0,
            width: size.x,
            height: size.y,
        }
    }

    pub fn size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineState {
    pub depth_test: bool,
    pub depth_function: DepthFunction,
    pub depth_write: bool,
    pub blend: Option<BlendState>,
    pub cull_mode: CullMode,
    pub srgb: bool,
    pub line_width: f32,
    pub viewport: Option<Viewport>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_function: DepthFunction::Less,
            depth_write: true,
            blend: None,
            cull_mode: CullMode::Back,
            srgb: false,
            line_width: 1.0,
            viewport: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    UInt(u32),
    Float(f32),
    Bool(bool),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    BindlessHandle(u64),
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for UniformValue {
    fn from(value: u32) -> Self {
        Self::UInt(value)
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for UniformValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec2> for UniformValue {
    fn from(value: Vec2) -> Self {
        Self::Vec2(value)
    }
}

impl From<Vec3> for UniformValue {
    fn from(value: Vec3) -> Self {
        Self::Vec3(value)
    }
}

impl From<Vec4> for UniformValue {
    fn from(value: Vec4) -> Self {
        Self::Vec4(value)
    }
}

impl From<Mat4> for UniformValue {
    fn from(value: Mat4) -> Self {
        Self::Mat4(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cubemap_byte_size_counts_all_faces() {
        let desc = TextureDescriptor::new_cubemap("Cube", UVec2::splat(4), PixelFormat::Depth32F);
        assert_eq!(desc.byte_size(), 4 * 4 * 4 * 6);
    }

    #[test]
    fn uniform_blend_mirrors_alpha() {
        let blend = BlendState::uniform(BlendFactor::One, BlendFactor::One);
        assert_eq!(blend.src_alpha, BlendFactor::One);
        assert_eq!(blend.dst_alpha, BlendFactor::One);
    }
}
