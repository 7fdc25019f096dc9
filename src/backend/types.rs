//! Common types shared between devices

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::resources::{EnvironmentUniformData, MaterialUniformData};

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Depth32Float,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba16Float => 8,
            _ => 4,
        }
    }
}

gpu_flags!(
    /// How a texture may be used
    TextureUsage {
        COPY_DST = 0b0010,
        TEXTURE_BINDING = 0b0100,
        RENDER_ATTACHMENT = 0b1_0000,
    }
);

gpu_flags!(
    /// How a buffer may be used
    BufferUsage {
        COPY_SRC = 1 << 2,
        COPY_DST = 1 << 3,
        INDEX = 1 << 4,
        VERTEX = 1 << 5,
        UNIFORM = 1 << 6,
        STORAGE = 1 << 7,
    }
);

#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8UnormSrgb,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsage,
}

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
}

#[derive(Debug, Clone)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u64,
}

#[derive(Debug, Clone)]
pub struct VertexBufferLayout {
    pub array_stride: u64,
    pub attributes: Vec<VertexAttribute>,
}

/// Standard vertex with position, normal, UV, and tangent
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub tangent: Vec4,
}

impl Vertex {
    pub fn layout() -> VertexBufferLayout {
        let attribute = |location, format, offset| VertexAttribute {
            location,
            format,
            offset,
        };
        VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as u64,
            attributes: vec![
                attribute(0, VertexFormat::Float32x3, 0),
                attribute(1, VertexFormat::Float32x3, 12),
                attribute(2, VertexFormat::Float32x2, 24),
                attribute(3, VertexFormat::Float32x4, 32),
            ],
        }
    }
}

/// Size of every pushed uniform block. Matches the 256 byte dynamic offset
/// alignment required by most adapters.
pub const UNIFORM_SLOT_SIZE: u64 = 256;

/// Bind group slots fed through `push_uniforms`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformSlot {
    /// Group 0: camera, lights, environment
    Frame,
    /// Group 1: per-draw transforms and material
    Draw,
}

impl UniformSlot {
    pub fn group(&self) -> u32 {
        match self {
            UniformSlot::Frame => 0,
            UniformSlot::Draw => 1,
        }
    }
}

/// Per-frame uniform block (group 0)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view: Mat4,
    pub view_proj: Mat4,
    /// xyz = camera world position
    pub camera_position: Vec4,
    /// xyz = ambient color, w = intensity
    pub ambient: Vec4,
    /// xyz = direction the light travels, w = 1 if enabled
    pub directional_direction: Vec4,
    /// xyz = color, w = intensity
    pub directional_color: Vec4,
    /// x = tiles per row, y = tile size, z = tile record stride, w = 1 if
    /// the tile lists are valid this frame
    pub tile_info: [u32; 4],
    pub environment: EnvironmentUniformData,
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            view_proj: Mat4::IDENTITY,
            camera_position: Vec4::ZERO,
            ambient: Vec4::new(1.0, 1.0, 1.0, 0.03),
            directional_direction: Vec4::ZERO,
            directional_color: Vec4::ZERO,
            tile_info: [0; 4],
            environment: EnvironmentUniformData::default(),
        }
    }
}

/// Per-draw uniform block (group 1)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DrawUniforms {
    pub model: Mat4,
    pub normal_matrix: Mat4,
    pub view_proj: Mat4,
    pub material: MaterialUniformData,
}

impl DrawUniforms {
    pub fn new(model: Mat4, view: Mat4, proj: Mat4, material: MaterialUniformData) -> Self {
        Self {
            model,
            normal_matrix: model.inverse().transpose(),
            view_proj: proj * view,
            material,
        }
    }
}

/// Skybox uniform block, pushed through the draw slot
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SkyUniforms {
    /// Inverse of projection times rotation-only view
    pub inv_view_proj: Mat4,
    pub environment: EnvironmentUniformData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Back,
}

/// Compare function for depth tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFunction {
    Less,
    LessEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
}

#[derive(Debug, Clone)]
pub struct SamplerDescriptor {
    pub label: Option<String>,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub address_mode: AddressMode,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            address_mode: AddressMode::Repeat,
        }
    }
}
