//! GPU device abstraction
//!
//! The engine core only sees this capability set: resource creation,
//! command-buffer acquisition and submission on a single queue, and
//! presentation. Submission order is the only cross-buffer ordering the core
//! relies on.

use crate::backend::command::CommandBuffer;
use crate::backend::types::*;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("device initialization: {0}")]
    InitializationFailed(String),
    #[error("surface creation: {0}")]
    SurfaceCreationFailed(String),
    #[error("logical device request: {0}")]
    DeviceCreationFailed(String),
    #[error("no surface image this frame: {0}")]
    AcquireImageFailed(String),
    #[error("no command buffer for '{0}'")]
    CommandBufferUnavailable(String),
    #[error("command buffer '{0}' was rejected")]
    SubmitFailed(String),
    #[error("presentation: {0}")]
    PresentFailed(String),
    #[error("buffer allocation: {0}")]
    BufferCreationFailed(String),
    #[error("texture allocation: {0}")]
    TextureCreationFailed(String),
    #[error("pipeline or binding setup: {0}")]
    PipelineCreationFailed(String),
    #[error("surface lost")]
    SurfaceLost,
    #[error("device out of memory")]
    OutOfMemory,
}

pub type BackendResult<T> = Result<T, BackendError>;

macro_rules! gpu_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub(crate) u64);

            impl $name {
                pub fn raw(&self) -> u64 {
                    self.0
                }
            }
        )*
    };
}

gpu_id!(
    /// GPU buffer
    BufferId,
    /// GPU texture
    TextureId,
    /// Texture view, including the per-frame surface view
    TextureViewId,
    SamplerId,
    RenderPipelineId,
    ComputePipelineId,
    BindGroupId,
    BindGroupLayoutId,
);

#[derive(Debug, Clone, PartialEq)]
pub enum BindGroupEntry {
    Buffer { buffer: BufferId, offset: u64, size: Option<u64> },
    Texture(TextureViewId),
    Sampler(SamplerId),
}

#[derive(Debug, Clone)]
pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub visibility: ShaderStageFlags,
    pub ty: BindingType,
}

gpu_flags!(
    /// Shader stages a binding is visible to
    ShaderStageFlags {
        VERTEX = 1,
        FRAGMENT = 2,
        COMPUTE = 4,
        VERTEX_FRAGMENT = 1 | 2,
    }
);

#[derive(Debug, Clone, PartialEq)]
pub enum BindingType {
    UniformBuffer,
    StorageBuffer { read_only: bool },
    Texture,
    Sampler,
}

#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor {
    pub label: Option<String>,
    /// WGSL source with `vs_main` and `fs_main` entry points
    pub shader: String,
    pub vertex_layouts: Vec<VertexBufferLayout>,
    pub bind_group_layouts: Vec<BindGroupLayoutId>,
    pub cull_mode: CullMode,
    pub depth_stencil: Option<DepthStencilState>,
    pub color_format: TextureFormat,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilState {
    pub format: TextureFormat,
    pub depth_write_enabled: bool,
    pub depth_compare: CompareFunction,
}

#[derive(Debug, Clone)]
pub struct ComputePipelineDescriptor {
    pub label: Option<String>,
    pub shader: String,
    pub entry_point: String,
    pub bind_group_layouts: Vec<BindGroupLayoutId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOp {
    Clear([f32; 4]),
    Load,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorAttachment {
    pub view: TextureViewId,
    pub load_op: LoadOp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepthAttachment {
    pub view: TextureViewId,
    pub clear_value: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_attachment: Option<DepthAttachment>,
}

/// Surface image acquired for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceFrame {
    pub view: TextureViewId,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

/// Capability set the engine core drives. Device and swapchain lifecycle
/// belong to the implementor.
pub trait GpuDevice {
    /// Current surface size in pixels
    fn surface_size(&self) -> (u32, u32);

    fn resize(&mut self, width: u32, height: u32);

    fn swapchain_format(&self) -> TextureFormat;

    // Resource creation

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferId>;

    fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8]) -> BackendResult<BufferId>;

    /// Queue a write. It lands before any command buffer submitted after
    /// this call executes.
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]);

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureId>;

    fn create_texture_view(&mut self, texture: TextureId) -> BackendResult<TextureViewId>;

    /// Write tightly packed pixels to mip level 0
    fn write_texture(&mut self, texture: TextureId, data: &[u8], width: u32, height: u32);

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerId>;

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutId>;

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutId,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupId>;

    /// Layout of the groups filled by
    /// [`CommandBuffer::push_uniforms`]. Pipelines place it at groups 0
    /// and 1.
    fn uniform_layout(&self) -> BindGroupLayoutId;

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineId>;

    fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDescriptor,
    ) -> BackendResult<ComputePipelineId>;

    // Command submission

    fn acquire_command_buffer(&mut self, label: &str) -> BackendResult<CommandBuffer>;

    /// Acquire the next surface image. May block.
    fn acquire_surface(&mut self) -> BackendResult<SurfaceFrame>;

    /// Queue the recorded commands. Buffers execute in submission order.
    fn submit(&mut self, commands: CommandBuffer) -> BackendResult<()>;

    /// Present the acquired surface image
    fn present(&mut self) -> BackendResult<()>;

    // Resource cleanup

    fn destroy_buffer(&mut self, buffer: BufferId);

    fn destroy_texture(&mut self, texture: TextureId);
}
