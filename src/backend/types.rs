//! Common types shared by every graphics device implementation

use serde::Deserialize;

use super::traits::{BufferHandle, FramebufferHandle, TextureHandle};

/// Graphics API a device drives.
///
/// Selects the shader sub-tree of pipeline descriptors and the NDC correction
/// applied to projection matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphicsApi {
    #[default]
    OpenGl,
    Vulkan,
    DirectX,
}

impl GraphicsApi {
    /// Key used for this API inside pipeline descriptors.
    pub fn key(&self) -> &'static str {
        match self {
            GraphicsApi::OpenGl => "opengl",
            GraphicsApi::Vulkan => "vulkan",
            GraphicsApi::DirectX => "directx",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "opengl" => Some(GraphicsApi::OpenGl),
            "vulkan" => Some(GraphicsApi::Vulkan),
            "directx" => Some(GraphicsApi::DirectX),
            _ => None,
        }
    }

    /// File extension of compiled engine shaders for this API.
    pub fn shader_extension(&self) -> &'static str {
        match self {
            GraphicsApi::OpenGl => "glsl",
            GraphicsApi::Vulkan => "spv",
            GraphicsApi::DirectX => "fxc",
        }
    }
}

impl std::fmt::Display for GraphicsApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R8Unorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    R16Float,
    Rgba16Float,
    Rgba32Float,
    Depth32Float,
    Depth24PlusStencil8,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth32Float | TextureFormat::Depth24PlusStencil8
        )
    }
}

/// Texture usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureUsage(u32);

impl TextureUsage {
    pub const COPY_SRC: Self = Self(1 << 0);
    pub const COPY_DST: Self = Self(1 << 1);
    pub const TEXTURE_BINDING: Self = Self(1 << 2);
    pub const RENDER_ATTACHMENT: Self = Self(1 << 4);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for TextureUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Buffer usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferUsage(u32);

impl BufferUsage {
    pub const COPY_DST: Self = Self(1 << 3);
    pub const INDEX: Self = Self(1 << 4);
    pub const VERTEX: Self = Self(1 << 5);
    pub const UNIFORM: Self = Self(1 << 6);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for BufferUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Shape of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureKind {
    #[default]
    D2,
    Cube,
}

/// Texture descriptor
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub kind: TextureKind,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Texture that can be rendered into and sampled afterwards.
    pub fn render_target(label: &str, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: Some(label.to_string()),
            width,
            height,
            kind: TextureKind::D2,
            format,
            usage: TextureUsage::RENDER_ATTACHMENT
                | TextureUsage::TEXTURE_BINDING
                | TextureUsage::COPY_SRC,
        }
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            kind: TextureKind::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        }
    }
}

/// Buffer descriptor
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    pub fn uniform(label: &str, size: u64) -> Self {
        Self {
            label: Some(label.to_string()),
            size,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        }
    }
}

/// Framebuffer descriptor: a set of attachments rendered together
#[derive(Debug, Clone)]
pub struct FramebufferDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<TextureHandle>,
    pub depth_attachment: Option<TextureHandle>,
    pub width: u32,
    pub height: u32,
}

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
    Sint32,
}

impl VertexFormat {
    pub fn size(&self) -> u64 {
        match self {
            VertexFormat::Float32 | VertexFormat::Uint32 | VertexFormat::Sint32 => 4,
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

/// Vertex attribute description
#[derive(Debug, Clone, PartialEq)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexStepMode {
    Vertex,
    Instance,
}

/// Vertex buffer layout
#[derive(Debug, Clone, PartialEq)]
pub struct VertexBufferLayout {
    pub array_stride: u64,
    pub step_mode: VertexStepMode,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexBufferLayout {
    /// Tightly packed attributes at consecutive locations.
    pub fn packed(formats: &[VertexFormat]) -> Self {
        let mut offset = 0;
        let attributes = formats
            .iter()
            .enumerate()
            .map(|(location, format)| {
                let attribute = VertexAttribute {
                    location: location as u32,
                    format: *format,
                    offset,
                };
                offset += format.size();
                attribute
            })
            .collect();
        Self {
            array_stride: offset,
            step_mode: VertexStepMode::Vertex,
            attributes,
        }
    }

    /// Layout of light volumes: one `vec3` position.
    pub fn position_only() -> Self {
        Self::packed(&[VertexFormat::Float32x3])
    }

    /// Layout of full-screen quads: one `vec2` clip-space position.
    pub fn planar() -> Self {
        Self::packed(&[VertexFormat::Float32x2])
    }
}

/// Vertex-attribute layout a pipeline is built for.
pub type VertexLayout = Vec<VertexBufferLayout>;

/// Standard mesh vertex used by the geometry buffer shaders
pub fn standard_vertex_layout() -> VertexLayout {
    vec![VertexBufferLayout::packed(&[
        VertexFormat::Float32x3,
        VertexFormat::Float32x3,
        VertexFormat::Float32x2,
        VertexFormat::Float32x4,
    ])]
}

/// Shader stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
    TessellationEvaluation,
    TessellationControl,
    Compute,
}

impl ShaderStage {
    /// Parse a stage key as written in pipeline descriptors.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "vertex" => Some(ShaderStage::Vertex),
            "fragment" => Some(ShaderStage::Fragment),
            "geometry" => Some(ShaderStage::Geometry),
            "tesselationevaluate" | "tessellationevaluation" => {
                Some(ShaderStage::TessellationEvaluation)
            }
            "tesselationcontrol" | "tessellationcontrol" => Some(ShaderStage::TessellationControl),
            "compute" => Some(ShaderStage::Compute),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderStageFlags(u32);

impl ShaderStageFlags {
    pub const VERTEX: Self = Self(1 << 0);
    pub const FRAGMENT: Self = Self(1 << 1);
    pub const VERTEX_FRAGMENT: Self = Self((1 << 0) | (1 << 1));
}

/// Shader code for one stage, as read from disk
#[derive(Debug, Clone)]
pub struct ShaderSource {
    pub stage: ShaderStage,
    pub path: String,
    pub code: Vec<u8>,
}

/// Binding type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingType {
    UniformBuffer,
    Texture { kind: TextureKind, depth: bool },
}

/// Bind group layout entry
#[derive(Debug, Clone)]
pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub visibility: ShaderStageFlags,
    pub ty: BindingType,
}

/// Bind group entry for creating bind groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindGroupEntry {
    Buffer {
        buffer: BufferHandle,
        offset: u64,
        size: Option<u64>,
    },
    Texture(TextureHandle),
}

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    TriangleList,
    TriangleStrip,
}

/// Cull mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Compare function for depth testing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFunction {
    Never,
    Less,
    LessEqual,
    Equal,
    Greater,
    Always,
}

/// Fixed depth state baked into a pipeline
#[derive(Debug, Clone)]
pub struct DepthStencilState {
    pub format: TextureFormat,
    pub depth_write_enabled: bool,
    pub depth_compare: CompareFunction,
}

/// Render pipeline descriptor
#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor {
    pub label: Option<String>,
    pub stages: Vec<ShaderSource>,
    pub vertex_layouts: VertexLayout,
    pub bind_group_layouts: Vec<super::traits::BindGroupLayoutHandle>,
    pub primitive_topology: PrimitiveTopology,
    pub cull_mode: CullMode,
    pub depth_stencil: Option<DepthStencilState>,
    pub color_formats: Vec<TextureFormat>,
}

impl RenderPipelineDescriptor {
    /// Descriptor for a full-screen pass writing one color target.
    pub fn fullscreen(label: &str, stages: Vec<ShaderSource>, color_format: TextureFormat) -> Self {
        Self {
            label: Some(label.to_string()),
            stages,
            vertex_layouts: vec![VertexBufferLayout::planar()],
            bind_group_layouts: Vec::new(),
            primitive_topology: PrimitiveTopology::TriangleList,
            cull_mode: CullMode::None,
            depth_stencil: None,
            color_formats: vec![color_format],
        }
    }
}

/// Blending applied to subsequent draws
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    Disabled,
    /// `dst = src + dst`
    Additive,
    /// `dst = src * src.a + dst`
    AdditiveAlpha,
    /// `dst = src * src.a + dst * (1 - src.a)`
    Alpha,
}

/// Depth test and write state applied to subsequent draws
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
}

impl DepthState {
    pub const DISABLED: Self = Self {
        test: false,
        write: false,
    };
    pub const READ_WRITE: Self = Self {
        test: true,
        write: true,
    };
    pub const READ_ONLY: Self = Self {
        test: true,
        write: false,
    };
}

/// Where a render pass writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    Framebuffer(FramebufferHandle),
    /// The window or swapchain output owned by the device.
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp {
    Clear([f32; 4]),
    Load,
}

/// Render pass descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub target: RenderTarget,
    pub color_load: LoadOp,
    /// Depth is cleared to 1.0 when this is `Clear`.
    pub depth_load: LoadOp,
}

impl RenderPassDescriptor {
    /// Pass that clears color to transparent black and depth to the far plane.
    pub fn clear(label: &str, target: RenderTarget) -> Self {
        Self {
            label: Some(label.to_string()),
            target,
            color_load: LoadOp::Clear([0.0, 0.0, 0.0, 0.0]),
            depth_load: LoadOp::Clear([1.0; 4]),
        }
    }

    /// Pass that keeps the current contents of the target.
    pub fn load(label: &str, target: RenderTarget) -> Self {
        Self {
            label: Some(label.to_string()),
            target,
            color_load: LoadOp::Load,
            depth_load: LoadOp::Load,
        }
    }
}

/// Index format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

/// Viewport rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x: x as f32,
            y: y as f32,
            width: width as f32,
            height: height as f32,
        }
    }
}
