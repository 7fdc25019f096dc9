//! wgpu device implementation
//!
//! Command buffers are recorded on the CPU and replayed into a
//! `wgpu::CommandEncoder` on submit. Uniform pushes are laid out in a ring
//! buffer and bound with dynamic offsets.

use crate::backend::command::{CommandBuffer, GpuCommand};
use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroU64;
use std::sync::Arc;
use wgpu::util::DeviceExt;

const INITIAL_RING_SLOTS: u32 = 256;
const UNIFORM_LAYOUT_ID: u64 = 1;

/// Engine-side descriptions that map one to one onto a wgpu value
trait ToWgpu {
    type Target;
    fn to_wgpu(self) -> Self::Target;
}

impl ToWgpu for TextureFormat {
    type Target = wgpu::TextureFormat;
    fn to_wgpu(self) -> wgpu::TextureFormat {
        use wgpu::TextureFormat as W;
        match self {
            Self::Rgba8Unorm => W::Rgba8Unorm,
            Self::Rgba8UnormSrgb => W::Rgba8UnormSrgb,
            Self::Bgra8Unorm => W::Bgra8Unorm,
            Self::Bgra8UnormSrgb => W::Bgra8UnormSrgb,
            Self::Rgba16Float => W::Rgba16Float,
            Self::Depth32Float => W::Depth32Float,
        }
    }
}

/// Swapchain formats outside our enum are reported as sRGB BGRA, which is
/// what every surface we configure falls back to anyway.
fn engine_format(format: wgpu::TextureFormat) -> TextureFormat {
    [
        TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Bgra8Unorm,
        TextureFormat::Rgba16Float,
        TextureFormat::Depth32Float,
    ]
    .into_iter()
    .find(|ours| ours.to_wgpu() == format)
    .unwrap_or(TextureFormat::Bgra8UnormSrgb)
}

impl ToWgpu for BufferUsage {
    type Target = wgpu::BufferUsages;
    fn to_wgpu(self) -> wgpu::BufferUsages {
        use wgpu::BufferUsages as W;
        [
            (Self::COPY_SRC, W::COPY_SRC),
            (Self::COPY_DST, W::COPY_DST),
            (Self::INDEX, W::INDEX),
            (Self::VERTEX, W::VERTEX),
            (Self::UNIFORM, W::UNIFORM),
            (Self::STORAGE, W::STORAGE),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .fold(W::empty(), |bits, (_, usage)| bits | usage)
    }
}

impl ToWgpu for TextureUsage {
    type Target = wgpu::TextureUsages;
    fn to_wgpu(self) -> wgpu::TextureUsages {
        use wgpu::TextureUsages as W;
        [
            (Self::COPY_DST, W::COPY_DST),
            (Self::TEXTURE_BINDING, W::TEXTURE_BINDING),
            (Self::RENDER_ATTACHMENT, W::RENDER_ATTACHMENT),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .fold(W::empty(), |bits, (_, usage)| bits | usage)
    }
}

impl ToWgpu for ShaderStageFlags {
    type Target = wgpu::ShaderStages;
    fn to_wgpu(self) -> wgpu::ShaderStages {
        use wgpu::ShaderStages as W;
        [
            (Self::VERTEX, W::VERTEX),
            (Self::FRAGMENT, W::FRAGMENT),
            (Self::COMPUTE, W::COMPUTE),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .fold(W::empty(), |bits, (_, stage)| bits | stage)
    }
}

impl ToWgpu for VertexFormat {
    type Target = wgpu::VertexFormat;
    fn to_wgpu(self) -> wgpu::VertexFormat {
        match self {
            Self::Float32x2 => wgpu::VertexFormat::Float32x2,
            Self::Float32x3 => wgpu::VertexFormat::Float32x3,
            Self::Float32x4 => wgpu::VertexFormat::Float32x4,
        }
    }
}

impl ToWgpu for CompareFunction {
    type Target = wgpu::CompareFunction;
    fn to_wgpu(self) -> wgpu::CompareFunction {
        match self {
            Self::Less => wgpu::CompareFunction::Less,
            Self::LessEqual => wgpu::CompareFunction::LessEqual,
            Self::Always => wgpu::CompareFunction::Always,
        }
    }
}

impl ToWgpu for FilterMode {
    type Target = wgpu::FilterMode;
    fn to_wgpu(self) -> wgpu::FilterMode {
        match self {
            Self::Nearest => wgpu::FilterMode::Nearest,
            Self::Linear => wgpu::FilterMode::Linear,
        }
    }
}

impl ToWgpu for AddressMode {
    type Target = wgpu::AddressMode;
    fn to_wgpu(self) -> wgpu::AddressMode {
        match self {
            Self::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            Self::Repeat => wgpu::AddressMode::Repeat,
        }
    }
}

impl ToWgpu for IndexFormat {
    type Target = wgpu::IndexFormat;
    fn to_wgpu(self) -> wgpu::IndexFormat {
        match self {
            Self::Uint16 => wgpu::IndexFormat::Uint16,
            Self::Uint32 => wgpu::IndexFormat::Uint32,
        }
    }
}

impl ToWgpu for &BindingType {
    type Target = wgpu::BindingType;
    fn to_wgpu(self) -> wgpu::BindingType {
        let buffer = |ty| wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        };
        match self {
            BindingType::UniformBuffer => buffer(wgpu::BufferBindingType::Uniform),
            BindingType::StorageBuffer { read_only } => buffer(wgpu::BufferBindingType::Storage {
                read_only: *read_only,
            }),
            BindingType::Texture => wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            BindingType::Sampler => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        }
    }
}

fn clear_color([r, g, b, a]: [f32; 4]) -> wgpu::Color {
    wgpu::Color {
        r: r.into(),
        g: g.into(),
        b: b.into(),
        a: a.into(),
    }
}

/// Window surface plus the image acquired for the frame in flight
struct SwapSurface {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    image: Option<wgpu::SurfaceTexture>,
    /// View of `image`, registered under its own id for the frame
    image_view: Option<(u64, wgpu::TextureView)>,
}

impl SwapSurface {
    fn reconfigure(&self, device: &wgpu::Device) {
        self.surface.configure(device, &self.config);
    }
}

/// Every wgpu object handed out as an id
#[derive(Default)]
struct ObjectPool {
    buffers: HashMap<u64, wgpu::Buffer>,
    textures: HashMap<u64, (wgpu::Texture, TextureFormat)>,
    views: HashMap<u64, wgpu::TextureView>,
    samplers: HashMap<u64, wgpu::Sampler>,
    layouts: HashMap<u64, wgpu::BindGroupLayout>,
    groups: HashMap<u64, wgpu::BindGroup>,
    render: HashMap<u64, wgpu::RenderPipeline>,
    compute: HashMap<u64, wgpu::ComputePipeline>,
}

fn lookup<'a, K: Hash + Eq, V>(map: &'a HashMap<K, V>, id: K, what: &str) -> BackendResult<&'a V> {
    map.get(&id)
        .ok_or_else(|| BackendError::PipelineCreationFailed(format!("no {} with that id", what)))
}

/// Uniform ring bound at groups 0 and 1 with a dynamic offset per push
struct UniformRing {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    slots: u32,
}

impl UniformRing {
    fn layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform slots"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT | wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(UNIFORM_SLOT_SIZE),
                },
                count: None,
            }],
        })
    }

    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, slots: u32) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("uniform ring"),
            size: u64::from(slots) * UNIFORM_SLOT_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let window = wgpu::BufferBinding {
            buffer: &buffer,
            offset: 0,
            size: NonZeroU64::new(UNIFORM_SLOT_SIZE),
        };
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform ring"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(window),
            }],
        });
        Self {
            buffer,
            bind_group,
            slots,
        }
    }
}

/// Hands out ring offsets in push order while a submission is replayed
struct SlotCursor(u32);

impl SlotCursor {
    fn next_offset(&mut self) -> u32 {
        let offset = self.0 * UNIFORM_SLOT_SIZE as u32;
        self.0 += 1;
        offset
    }
}

/// Largest extent the device accepts, scaled down uniformly if needed
fn fit_extent(limits: &wgpu::Limits, width: u32, height: u32) -> (u32, u32) {
    let limit = limits.max_texture_dimension_2d;
    let largest = width.max(height);
    if largest <= limit {
        return (width.max(1), height.max(1));
    }
    let scale = limit as f32 / largest as f32;
    let shrink = |v: u32| ((v as f32 * scale) as u32).clamp(1, limit);
    (shrink(width), shrink(height))
}

pub struct WgpuDevice {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    swap: SwapSurface,
    pool: ObjectPool,
    ring: UniformRing,
    next_id: u64,
}

impl WgpuDevice {
    /// Blocking constructor for native targets
    pub fn new(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(window, vsync))
    }

    pub async fn new_async(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let inner = window.inner_size();
        let surface = instance
            .create_surface(window)
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                ..Default::default()
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("no compatible adapter".into()))?;
        let info = adapter.get_info();
        log::info!("Using adapter {} on {:?}", info.name, info.backend);

        let descriptor = wgpu::DeviceDescriptor {
            label: Some("zdl device"),
            ..Default::default()
        };
        let (device, queue) = adapter
            .request_device(&descriptor, None)
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        let caps = surface.get_capabilities(&adapter);
        let format = match caps.formats.iter().find(|f| f.is_srgb()) {
            Some(srgb) => *srgb,
            None => *caps
                .formats
                .first()
                .ok_or_else(|| BackendError::SurfaceCreationFailed("no supported formats".into()))?,
        };
        let (width, height) = fit_extent(&device.limits(), inner.width, inner.height);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: match vsync {
                true => wgpu::PresentMode::AutoVsync,
                false => wgpu::PresentMode::AutoNoVsync,
            },
            alpha_mode: caps.alpha_modes.first().copied().unwrap_or_default(),
            view_formats: Vec::new(),
            desired_maximum_frame_latency: 2,
        };
        let swap = SwapSurface {
            surface,
            config,
            image: None,
            image_view: None,
        };
        swap.reconfigure(&device);
        log::debug!("Surface configured {}x{} {:?}", width, height, format);

        let ring_layout = UniformRing::layout(&device);
        let ring = UniformRing::new(&device, &ring_layout, INITIAL_RING_SLOTS);
        let mut pool = ObjectPool::default();
        pool.layouts.insert(UNIFORM_LAYOUT_ID, ring_layout);

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            swap,
            pool,
            ring,
            next_id: UNIFORM_LAYOUT_ID + 1,
        })
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id - 1
    }

    fn texture_view(&self, id: TextureViewId) -> Option<&wgpu::TextureView> {
        match &self.swap.image_view {
            Some((frame_id, view)) if *frame_id == id.0 => Some(view),
            _ => self.pool.views.get(&id.0),
        }
    }

    fn shader_and_layout(
        &self,
        label: Option<&str>,
        source: &str,
        groups: &[BindGroupLayoutId],
    ) -> BackendResult<(wgpu::ShaderModule, wgpu::PipelineLayout)> {
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label,
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let mut layouts = Vec::with_capacity(groups.len());
        for group in groups {
            layouts.push(lookup(&self.pool.layouts, group.0, "bind group layout")?);
        }
        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label,
            bind_group_layouts: &layouts,
            push_constant_ranges: &[],
        });
        Ok((module, layout))
    }

    /// Write this submission's uniform blocks into the ring in push order,
    /// reallocating the ring when it has too few slots.
    fn stage_uniforms(&mut self, commands: &[GpuCommand]) {
        let blocks: Vec<&[u8]> = commands
            .iter()
            .filter_map(|command| match command {
                GpuCommand::PushUniforms { data, .. } => Some(data.as_slice()),
                _ => None,
            })
            .collect();
        let wanted = blocks.len() as u32;
        if wanted > self.ring.slots {
            if let Some(layout) = self.pool.layouts.get(&UNIFORM_LAYOUT_ID) {
                let slots = wanted.next_power_of_two();
                log::debug!("Uniform ring resized to {} slots", slots);
                self.ring = UniformRing::new(&self.device, layout, slots);
            }
        }
        let mut offset = 0;
        for block in blocks {
            self.queue.write_buffer(&self.ring.buffer, offset, block);
            offset += UNIFORM_SLOT_SIZE;
        }
    }

    fn replay_render_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        desc: &RenderPassDescriptor,
        commands: &[GpuCommand],
        cursor: &mut SlotCursor,
    ) {
        let colors: Vec<_> = desc
            .color_attachments
            .iter()
            .filter_map(|attachment| {
                let load = match attachment.load_op {
                    LoadOp::Clear(color) => wgpu::LoadOp::Clear(clear_color(color)),
                    LoadOp::Load => wgpu::LoadOp::Load,
                };
                self.texture_view(attachment.view).map(|view| {
                    Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load,
                            store: wgpu::StoreOp::Store,
                        },
                    })
                })
            })
            .collect();

        let depth = desc.depth_attachment.as_ref().and_then(|attachment| {
            let load = attachment.clear_value.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear);
            self.texture_view(attachment.view)
                .map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                })
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: desc.label.as_deref(),
            color_attachments: &colors,
            depth_stencil_attachment: depth,
            ..Default::default()
        });

        for command in commands {
            match command {
                GpuCommand::SetRenderPipeline(id) => {
                    if let Some(pipeline) = self.pool.render.get(&id.0) {
                        pass.set_pipeline(pipeline);
                    }
                }
                GpuCommand::SetBindGroup { index, bind_group } => {
                    if let Some(group) = self.pool.groups.get(&bind_group.0) {
                        pass.set_bind_group(*index, group, &[]);
                    }
                }
                GpuCommand::PushUniforms { slot, .. } => {
                    let offset = cursor.next_offset();
                    pass.set_bind_group(slot.group(), &self.ring.bind_group, &[offset]);
                }
                GpuCommand::SetVertexBuffer { slot, buffer, offset } => {
                    if let Some(vertices) = self.pool.buffers.get(&buffer.0) {
                        pass.set_vertex_buffer(*slot, vertices.slice(*offset..));
                    }
                }
                GpuCommand::SetIndexBuffer { buffer, offset, format } => {
                    if let Some(indices) = self.pool.buffers.get(&buffer.0) {
                        pass.set_index_buffer(indices.slice(*offset..), format.to_wgpu());
                    }
                }
                GpuCommand::SetViewport { x, y, width, height } => {
                    pass.set_viewport(*x, *y, *width, *height, 0.0, 1.0);
                }
                GpuCommand::Draw { vertices, instances } => {
                    pass.draw(vertices.clone(), instances.clone());
                }
                GpuCommand::DrawIndexed {
                    indices,
                    base_vertex,
                    instances,
                } => pass.draw_indexed(indices.clone(), *base_vertex, instances.clone()),
                other => log::warn!("{:?} is not valid inside a render pass", other),
            }
        }
    }

    fn replay_compute_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        label: Option<&str>,
        commands: &[GpuCommand],
        cursor: &mut SlotCursor,
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label,
            timestamp_writes: None,
        });
        for command in commands {
            match command {
                GpuCommand::SetComputePipeline(id) => {
                    if let Some(pipeline) = self.pool.compute.get(&id.0) {
                        pass.set_pipeline(pipeline);
                    }
                }
                GpuCommand::SetBindGroup { index, bind_group } => {
                    if let Some(group) = self.pool.groups.get(&bind_group.0) {
                        pass.set_bind_group(*index, group, &[]);
                    }
                }
                GpuCommand::PushUniforms { slot, .. } => {
                    let offset = cursor.next_offset();
                    pass.set_bind_group(slot.group(), &self.ring.bind_group, &[offset]);
                }
                GpuCommand::Dispatch { x, y, z } => pass.dispatch_workgroups(*x, *y, *z),
                other => log::warn!("{:?} is not valid inside a compute pass", other),
            }
        }
    }
}

/// Index of the command closing the pass opened just before `from`
fn pass_end(commands: &[GpuCommand], from: usize, is_end: fn(&GpuCommand) -> bool) -> usize {
    commands[from..]
        .iter()
        .position(is_end)
        .map_or(commands.len(), |p| from + p)
}

impl GpuDevice for WgpuDevice {
    fn surface_size(&self) -> (u32, u32) {
        (self.swap.config.width, self.swap.config.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let (width, height) = fit_extent(&self.device.limits(), width, height);
        self.swap.config.width = width;
        self.swap.config.height = height;
        self.swap.reconfigure(&self.device);
    }

    fn swapchain_format(&self) -> TextureFormat {
        engine_format(self.swap.config.format)
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferId> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size: desc.size,
            usage: desc.usage.to_wgpu(),
            mapped_at_creation: false,
        });
        let id = self.next_id();
        log::trace!("buffer {} {:?}: {} bytes", id, desc.label, desc.size);
        self.pool.buffers.insert(id, buffer);
        Ok(BufferId(id))
    }

    fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8]) -> BackendResult<BufferId> {
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: desc.label.as_deref(),
            contents: data,
            usage: desc.usage.to_wgpu(),
        });
        let id = self.next_id();
        log::trace!("buffer {} {:?}: {} bytes, initialized", id, desc.label, data.len());
        self.pool.buffers.insert(id, buffer);
        Ok(BufferId(id))
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        match self.pool.buffers.get(&buffer.0) {
            Some(target) => self.queue.write_buffer(target, offset, data),
            None => log::warn!("write to destroyed buffer {}", buffer.0),
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureId> {
        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format.to_wgpu(),
            usage: desc.usage.to_wgpu(),
            view_formats: &[],
        });
        let id = self.next_id();
        self.pool.textures.insert(id, (texture, desc.format));
        Ok(TextureId(id))
    }

    fn create_texture_view(&mut self, texture: TextureId) -> BackendResult<TextureViewId> {
        let view = match self.pool.textures.get(&texture.0) {
            Some((source, _)) => source.create_view(&Default::default()),
            None => {
                return Err(BackendError::TextureCreationFailed(format!(
                    "view of unknown texture {}",
                    texture.0
                )))
            }
        };
        let id = self.next_id();
        self.pool.views.insert(id, view);
        Ok(TextureViewId(id))
    }

    fn write_texture(&mut self, texture: TextureId, data: &[u8], width: u32, height: u32) {
        let Some((target, format)) = self.pool.textures.get(&texture.0) else {
            log::warn!("write to destroyed texture {}", texture.0);
            return;
        };
        let layout = wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(width * format.bytes_per_pixel()),
            rows_per_image: Some(height),
        };
        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        self.queue.write_texture(target.as_image_copy(), data, layout, extent);
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerId> {
        let wrap = desc.address_mode.to_wgpu();
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label.as_deref(),
            address_mode_u: wrap,
            address_mode_v: wrap,
            address_mode_w: wrap,
            mag_filter: desc.mag_filter.to_wgpu(),
            min_filter: desc.min_filter.to_wgpu(),
            ..Default::default()
        });
        let id = self.next_id();
        self.pool.samplers.insert(id, sampler);
        Ok(SamplerId(id))
    }

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutId> {
        let converted: Vec<_> = entries
            .iter()
            .map(|entry| wgpu::BindGroupLayoutEntry {
                binding: entry.binding,
                visibility: entry.visibility.to_wgpu(),
                ty: entry.ty.to_wgpu(),
                count: None,
            })
            .collect();
        let layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: None,
            entries: &converted,
        });
        let id = self.next_id();
        self.pool.layouts.insert(id, layout);
        Ok(BindGroupLayoutId(id))
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutId,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupId> {
        let pool = &self.pool;
        let layout = lookup(&pool.layouts, layout.0, "bind group layout")?;
        let mut converted = Vec::with_capacity(entries.len());
        for (binding, entry) in entries {
            let resource = match entry {
                BindGroupEntry::Buffer { buffer, offset, size } => {
                    wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: lookup(&pool.buffers, buffer.0, "buffer")?,
                        offset: *offset,
                        size: size.and_then(NonZeroU64::new),
                    })
                }
                BindGroupEntry::Texture(view) => {
                    wgpu::BindingResource::TextureView(lookup(&pool.views, view.0, "texture view")?)
                }
                BindGroupEntry::Sampler(sampler) => {
                    wgpu::BindingResource::Sampler(lookup(&pool.samplers, sampler.0, "sampler")?)
                }
            };
            converted.push(wgpu::BindGroupEntry {
                binding: *binding,
                resource,
            });
        }
        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout,
            entries: &converted,
        });
        let id = self.next_id();
        self.pool.groups.insert(id, group);
        Ok(BindGroupId(id))
    }

    fn uniform_layout(&self) -> BindGroupLayoutId {
        BindGroupLayoutId(UNIFORM_LAYOUT_ID)
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineId> {
        let label = desc.label.as_deref();
        let (module, layout) = self.shader_and_layout(label, &desc.shader, &desc.bind_group_layouts)?;

        let attributes: Vec<Vec<wgpu::VertexAttribute>> = desc
            .vertex_layouts
            .iter()
            .map(|stream| {
                stream
                    .attributes
                    .iter()
                    .map(|attr| wgpu::VertexAttribute {
                        format: attr.format.to_wgpu(),
                        offset: attr.offset,
                        shader_location: attr.location,
                    })
                    .collect()
            })
            .collect();
        let streams: Vec<_> = desc
            .vertex_layouts
            .iter()
            .zip(&attributes)
            .map(|(stream, attributes)| wgpu::VertexBufferLayout {
                array_stride: stream.array_stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();
        let targets = [Some(wgpu::ColorTargetState::from(desc.color_format.to_wgpu()))];
        let depth_stencil = desc.depth_stencil.map(|state| wgpu::DepthStencilState {
            format: state.format.to_wgpu(),
            depth_write_enabled: state.depth_write_enabled,
            depth_compare: state.depth_compare.to_wgpu(),
            stencil: Default::default(),
            bias: Default::default(),
        });
        let cull_mode = match desc.cull_mode {
            CullMode::Back => Some(wgpu::Face::Back),
            CullMode::None => None,
        };

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label,
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: "vs_main",
                buffers: &streams,
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: "fs_main",
                targets: &targets,
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                cull_mode,
                ..Default::default()
            },
            depth_stencil,
            multisample: Default::default(),
            multiview: None,
        });
        let id = self.next_id();
        self.pool.render.insert(id, pipeline);
        log::debug!("render pipeline {} {:?} ready", id, label);
        Ok(RenderPipelineId(id))
    }

    fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDescriptor,
    ) -> BackendResult<ComputePipelineId> {
        let label = desc.label.as_deref();
        let (module, layout) = self.shader_and_layout(label, &desc.shader, &desc.bind_group_layouts)?;
        let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label,
            layout: Some(&layout),
            module: &module,
            entry_point: &desc.entry_point,
            compilation_options: Default::default(),
        });
        let id = self.next_id();
        self.pool.compute.insert(id, pipeline);
        log::debug!("compute pipeline {} {:?} ready", id, label);
        Ok(ComputePipelineId(id))
    }

    fn acquire_command_buffer(&mut self, label: &str) -> BackendResult<CommandBuffer> {
        Ok(CommandBuffer::new(label))
    }

    fn acquire_surface(&mut self) -> BackendResult<SurfaceFrame> {
        let image = match self.swap.surface.get_current_texture() {
            Ok(image) => image,
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(BackendError::OutOfMemory),
            Err(wgpu::SurfaceError::Lost) => {
                self.swap.reconfigure(&self.device);
                return Err(BackendError::SurfaceLost);
            }
            Err(err @ wgpu::SurfaceError::Outdated) => {
                self.swap.reconfigure(&self.device);
                return Err(BackendError::AcquireImageFailed(err.to_string()));
            }
            Err(err) => return Err(BackendError::AcquireImageFailed(err.to_string())),
        };
        let view = image.texture.create_view(&Default::default());
        let id = self.next_id();
        self.swap.image_view = Some((id, view));
        self.swap.image = Some(image);
        Ok(SurfaceFrame {
            view: TextureViewId(id),
            width: self.swap.config.width,
            height: self.swap.config.height,
        })
    }

    fn submit(&mut self, mut commands: CommandBuffer) -> BackendResult<()> {
        commands.finish();
        self.stage_uniforms(commands.commands());

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(commands.label()),
        });
        let recorded = commands.commands();
        let mut cursor = SlotCursor(0);
        let mut at = 0;
        while let Some(command) = recorded.get(at) {
            at = match command {
                GpuCommand::BeginRenderPass(desc) => {
                    let end = pass_end(recorded, at + 1, |c| matches!(c, GpuCommand::EndRenderPass));
                    self.replay_render_pass(&mut encoder, desc, &recorded[at + 1..end], &mut cursor);
                    end + 1
                }
                GpuCommand::BeginComputePass { label } => {
                    let end = pass_end(recorded, at + 1, |c| matches!(c, GpuCommand::EndComputePass));
                    let body = &recorded[at + 1..end];
                    self.replay_compute_pass(&mut encoder, label.as_deref(), body, &mut cursor);
                    end + 1
                }
                stray => {
                    log::warn!("{}: {:?} recorded outside any pass", commands.label(), stray);
                    at + 1
                }
            };
        }
        self.queue.submit([encoder.finish()]);

        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => {
                log::error!("Command buffer '{}' rejected: {}", commands.label(), error);
                Err(BackendError::SubmitFailed(commands.label().to_string()))
            }
            None => Ok(()),
        }
    }

    fn present(&mut self) -> BackendResult<()> {
        self.swap.image_view = None;
        let image = self
            .swap
            .image
            .take()
            .ok_or_else(|| BackendError::PresentFailed("present without an acquired image".into()))?;
        image.present();
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Some(buffer) = self.pool.buffers.remove(&buffer.0) {
            buffer.destroy();
        }
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some((texture, _)) = self.pool.textures.remove(&texture.0) {
            texture.destroy();
        }
    }
}
