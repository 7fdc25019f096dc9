//! Renderer context and the per-frame recording state machine
//!
//! ```text
//! Begun -> (Skybox)? -> (Draws)* -> end()
//! ```
//!
//! [`RenderFrame::end`] consumes the frame, so nothing can be recorded after
//! it. A frame dropped without `end` is abandoned: its commands are never
//! submitted and the surface image is not presented.

use crate::backend::*;
use crate::config::EngineConfig;
use crate::pipeline::{
    create_forward_pipeline, create_skybox_pipeline, material_texture_layout, sky_inverse_view_proj,
    CullStats, ForwardPlus,
};
use crate::render::context::{DebugLine, FrameContext, FrameStats};
use crate::resources::{Environment, MaterialHandle, MeshHandle, Resources, TextureData, TextureHandle};
use glam::Mat4;
use std::collections::HashMap;

/// Bind group slot of the Forward+ light data in the shading pipeline
const LIGHT_GROUP: u32 = 2;
/// Bind group slot of the material texture
const TEXTURE_GROUP: u32 = 3;

struct GpuMesh {
    vertex_buffer: BufferId,
    index_buffer: BufferId,
    index_count: u32,
}

struct GpuTexture {
    texture: TextureId,
    bind_group: BindGroupId,
}

struct DepthTarget {
    texture: TextureId,
    view: TextureViewId,
    width: u32,
    height: u32,
}

impl DepthTarget {
    fn new<D: GpuDevice>(device: &mut D, width: u32, height: u32) -> BackendResult<Self> {
        let texture = device.create_texture(&TextureDescriptor {
            label: Some("Depth Buffer".into()),
            width,
            height,
            format: TextureFormat::Depth32Float,
            usage: TextureUsage::RENDER_ATTACHMENT,
        })?;
        let view = device.create_texture_view(texture)?;
        Ok(Self {
            texture,
            view,
            width,
            height,
        })
    }
}

struct ForwardPass {
    culling: ForwardPlus,
    pipeline: RenderPipelineId,
}

/// Owns the device and every GPU resource the frame loop needs
pub struct Renderer<D: GpuDevice> {
    device: D,
    config: EngineConfig,
    depth: DepthTarget,
    skybox_pipeline: RenderPipelineId,
    texture_layout: BindGroupLayoutId,
    sampler: SamplerId,
    white: GpuTexture,
    meshes: HashMap<MeshHandle, GpuMesh>,
    textures: HashMap<TextureHandle, GpuTexture>,
    forward: Option<ForwardPass>,
    frame_index: u64,
    last_debug_lines: Vec<DebugLine>,
}

impl<D: GpuDevice> Renderer<D> {
    /// Create the renderer. Forward+ stays uninitialized until
    /// [`Renderer::init_forward_plus`] is called; frames rendered before
    /// that only clear and draw the sky.
    pub fn new(mut device: D, config: EngineConfig) -> BackendResult<Self> {
        let (width, height) = device.surface_size();
        let depth = DepthTarget::new(&mut device, width, height)?;
        let format = device.swapchain_format();
        let skybox_pipeline = create_skybox_pipeline(&mut device, format)?;
        let texture_layout = material_texture_layout(&mut device)?;
        let sampler = device.create_sampler(&SamplerDescriptor {
            label: Some("Material Sampler".into()),
            ..Default::default()
        })?;
        let white = Self::upload_texture(&mut device, texture_layout, sampler, &TextureData::white())?;

        log::info!("Renderer created: {}x{} {:?}", width, height, format);

        Ok(Self {
            device,
            config,
            depth,
            skybox_pipeline,
            texture_layout,
            sampler,
            white,
            meshes: HashMap::new(),
            textures: HashMap::new(),
            forward: None,
            frame_index: 0,
            last_debug_lines: Vec::new(),
        })
    }

    /// Create the light culling state and the shading pipeline reading it
    pub fn init_forward_plus(&mut self) -> BackendResult<()> {
        if self.forward.is_some() {
            return Ok(());
        }
        let culling = ForwardPlus::new(&mut self.device, &self.config.forward_plus)?;
        let format = self.device.swapchain_format();
        let pipeline = create_forward_pipeline(
            &mut self.device,
            format,
            culling.bind_group_layout(),
            self.texture_layout,
        )?;
        self.forward = Some(ForwardPass { culling, pipeline });
        log::info!("Forward+ ready");
        Ok(())
    }

    pub fn is_forward_plus_ready(&self) -> bool {
        self.forward.is_some()
    }

    pub fn forward_plus(&self) -> Option<&ForwardPlus> {
        self.forward.as_ref().map(|f| &f.culling)
    }

    pub fn forward_plus_mut(&mut self) -> Option<&mut ForwardPlus> {
        self.forward.as_mut().map(|f| &mut f.culling)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.device.resize(width, height);
        let (width, height) = self.device.surface_size();
        self.ensure_depth(width, height);
    }

    fn ensure_depth(&mut self, width: u32, height: u32) {
        if self.depth.width == width && self.depth.height == height {
            return;
        }
        match DepthTarget::new(&mut self.device, width, height) {
            Ok(depth) => {
                self.device.destroy_texture(self.depth.texture);
                self.depth = depth;
            }
            Err(e) => log::error!("Failed to recreate depth buffer at {}x{}: {}", width, height, e),
        }
    }

    /// Acquire the surface and a command buffer for a new frame. Returns
    /// `None` when either is unavailable; the caller skips the frame.
    pub fn begin_frame(&mut self) -> Option<RenderFrame<'_, D>> {
        let surface = match self.device.acquire_surface() {
            Ok(surface) => surface,
            Err(e) => {
                log::warn!("Skipping frame {}: {}", self.frame_index, e);
                return None;
            }
        };
        let commands = match self.device.acquire_command_buffer("frame") {
            Ok(commands) => commands,
            Err(e) => {
                log::warn!("Skipping frame {}: {}", self.frame_index, e);
                return None;
            }
        };
        self.ensure_depth(surface.width, surface.height);

        let index = self.frame_index;
        self.frame_index += 1;
        Some(RenderFrame {
            renderer: self,
            commands,
            surface,
            state: FrameState::Begun,
            forward_bound: false,
            frame_uniforms: FrameUniforms::default(),
            context: FrameContext::new(index),
        })
    }

    /// Release cached GPU meshes and textures whose handles went stale
    pub fn prune_caches(&mut self, resources: &Resources) {
        let device = &mut self.device;
        self.meshes.retain(|handle, mesh| {
            let alive = resources.meshes.contains(*handle);
            if !alive {
                device.destroy_buffer(mesh.vertex_buffer);
                device.destroy_buffer(mesh.index_buffer);
            }
            alive
        });
        self.textures.retain(|handle, texture| {
            let alive = resources.textures.contains(*handle);
            if !alive {
                device.destroy_texture(texture.texture);
            }
            alive
        });
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Index the next frame will get
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn gpu_mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn gpu_texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Debug lines queued during the last completed frame
    pub fn last_debug_lines(&self) -> &[DebugLine] {
        &self.last_debug_lines
    }

    fn upload_texture(
        device: &mut D,
        layout: BindGroupLayoutId,
        sampler: SamplerId,
        data: &TextureData,
    ) -> BackendResult<GpuTexture> {
        let texture = device.create_texture(&TextureDescriptor {
            label: Some(data.name.clone()),
            width: data.width,
            height: data.height,
            format: data.format,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        device.write_texture(texture, &data.data, data.width, data.height);
        let view = device.create_texture_view(texture)?;
        let bind_group = device.create_bind_group(
            layout,
            &[(0, BindGroupEntry::Texture(view)), (1, BindGroupEntry::Sampler(sampler))],
        )?;
        Ok(GpuTexture { texture, bind_group })
    }

    fn gpu_mesh(&mut self, handle: MeshHandle, resources: &Resources) -> Option<&GpuMesh> {
        let mesh = resources.meshes.get(handle)?;
        if mesh.index_count() == 0 {
            return None;
        }
        if !self.meshes.contains_key(&handle) {
            let vertex_buffer = self
                .device
                .create_buffer_init(
                    &BufferDescriptor {
                        label: Some(format!("{} Vertices", mesh.name)),
                        size: mesh.vertex_bytes().len() as u64,
                        usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
                    },
                    mesh.vertex_bytes(),
                )
                .map_err(|e| log::error!("Failed to upload mesh '{}': {}", mesh.name, e))
                .ok()?;
            let index_buffer = match self.device.create_buffer_init(
                &BufferDescriptor {
                    label: Some(format!("{} Indices", mesh.name)),
                    size: mesh.index_bytes().len() as u64,
                    usage: BufferUsage::INDEX | BufferUsage::COPY_DST,
                },
                mesh.index_bytes(),
            ) {
                Ok(buffer) => buffer,
                Err(e) => {
                    log::error!("Failed to upload mesh '{}': {}", mesh.name, e);
                    self.device.destroy_buffer(vertex_buffer);
                    return None;
                }
            };
            self.meshes.insert(
                handle,
                GpuMesh {
                    vertex_buffer,
                    index_buffer,
                    index_count: mesh.index_count(),
                },
            );
        }
        self.meshes.get(&handle)
    }

    /// Bind group for `handle`, uploading it on first use. `None` when the
    /// handle is stale or the upload failed.
    fn texture_bind_group(&mut self, handle: TextureHandle, resources: &Resources) -> Option<BindGroupId> {
        let data = resources.textures.get(handle)?;
        if let Some(cached) = self.textures.get(&handle) {
            return Some(cached.bind_group);
        }
        match Self::upload_texture(&mut self.device, self.texture_layout, self.sampler, data) {
            Ok(texture) => {
                let bind_group = texture.bind_group;
                self.textures.insert(handle, texture);
                Some(bind_group)
            }
            Err(e) => {
                log::error!("Failed to upload texture '{}': {}", data.name, e);
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Begun,
    SkyboxDrawn,
    Drawing,
}

/// One frame being recorded. Borrowed from [`Renderer::begin_frame`].
pub struct RenderFrame<'a, D: GpuDevice> {
    renderer: &'a mut Renderer<D>,
    commands: CommandBuffer,
    surface: SurfaceFrame,
    state: FrameState,
    forward_bound: bool,
    frame_uniforms: FrameUniforms,
    context: FrameContext,
}

impl<'a, D: GpuDevice> RenderFrame<'a, D> {
    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn index(&self) -> u64 {
        self.context.index()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.surface.width, self.surface.height)
    }

    pub fn context(&self) -> &FrameContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut FrameContext {
        &mut self.context
    }

    pub fn forward_plus(&self) -> Option<&ForwardPlus> {
        self.renderer.forward_plus()
    }

    pub fn forward_plus_mut(&mut self) -> Option<&mut ForwardPlus> {
        self.renderer.forward_plus_mut()
    }

    pub fn is_forward_plus_bound(&self) -> bool {
        self.forward_bound
    }

    fn ensure_render_pass(&mut self) {
        if self.commands.in_render_pass() {
            return;
        }
        self.commands.begin_render_pass(RenderPassDescriptor {
            label: Some("Forward+ Pass".into()),
            color_attachments: vec![ColorAttachment {
                view: self.surface.view,
                load_op: LoadOp::Clear(self.renderer.config.clear_color),
            }],
            depth_attachment: Some(DepthAttachment {
                view: self.renderer.depth.view,
                clear_value: Some(1.0),
            }),
        });
        self.commands
            .set_viewport(0.0, 0.0, self.surface.width as f32, self.surface.height as f32);
    }

    /// Upload the accumulated lights and build this frame's tile lists.
    /// Runs on its own command buffer, submitted before this frame's.
    pub fn cull_lights(&mut self) -> BackendResult<CullStats> {
        let renderer = &mut *self.renderer;
        let Some(forward) = renderer.forward.as_mut() else {
            return Err(BackendError::InitializationFailed("Forward+ is not initialized".into()));
        };
        self.context.lights_submitted = forward.culling.accumulated_light_count() as u32;
        match forward.culling.cull_lights(&mut renderer.device) {
            Ok(stats) => {
                self.context.lights_uploaded = stats.uploaded;
                self.context.cull_failed = false;
                Ok(stats)
            }
            Err(e) => {
                self.context.lights_uploaded = 0;
                self.context.cull_failed = true;
                Err(e)
            }
        }
    }

    /// Draw the sky behind everything. Only valid before any mesh draw.
    pub fn draw_skybox(&mut self, view: Mat4, proj: Mat4, environment: &Environment) -> bool {
        if self.state != FrameState::Begun {
            log::warn!("draw_skybox ignored in state {:?}", self.state);
            return false;
        }
        self.ensure_render_pass();
        self.commands.set_render_pipeline(self.renderer.skybox_pipeline);
        self.context.pipeline_binds += 1;
        self.commands.push_uniforms(UniformSlot::Frame, &self.frame_uniforms);
        self.commands.push_uniforms(
            UniformSlot::Draw,
            &SkyUniforms {
                inv_view_proj: sky_inverse_view_proj(view, proj),
                environment: environment.uniform_data(),
            },
        );
        self.commands.draw(0..3, 0..1);
        self.context.draw_calls += 1;
        self.state = FrameState::SkyboxDrawn;
        true
    }

    /// Bind the Forward+ shading pipeline with the frame uniforms and the
    /// light data. Binds at most once per frame; later calls return true
    /// without recording anything.
    pub fn bind_forward_plus_pipeline(&mut self) -> bool {
        if self.forward_bound {
            return true;
        }
        let Some((pipeline, lights)) = self
            .renderer
            .forward
            .as_ref()
            .map(|f| (f.pipeline, f.culling.bind_group()))
        else {
            log::warn!("Forward+ pipeline requested before initialization");
            return false;
        };
        self.ensure_render_pass();
        self.commands.set_render_pipeline(pipeline);
        self.commands.push_uniforms(UniformSlot::Frame, &self.frame_uniforms);
        self.commands.set_bind_group(LIGHT_GROUP, lights);
        self.context.pipeline_binds += 1;
        self.forward_bound = true;
        self.state = FrameState::Drawing;
        true
    }

    /// Per-draw uniforms for the next draw call
    pub fn push_uniforms(&mut self, uniforms: &DrawUniforms) {
        self.ensure_render_pass();
        self.commands.push_uniforms(UniformSlot::Draw, uniforms);
    }

    /// Camera, ambient, directional and tile data for the rest of the
    /// frame. Recorded right away when the shading pipeline is already
    /// bound, otherwise on bind.
    pub fn push_light_uniforms(&mut self, uniforms: &FrameUniforms) {
        self.frame_uniforms = *uniforms;
        if self.forward_bound {
            self.commands.push_uniforms(UniformSlot::Frame, &self.frame_uniforms);
        }
    }

    pub fn light_uniforms(&self) -> &FrameUniforms {
        &self.frame_uniforms
    }

    /// Draw `mesh` with the Forward+ pipeline.
    ///
    /// The texture comes from `texture`, then the material's base color
    /// texture, then a white fallback. Returns false and records nothing
    /// when the mesh is stale or empty or the pipeline is unavailable.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_mesh_forward_plus(
        &mut self,
        mesh: MeshHandle,
        material: Option<MaterialHandle>,
        texture: Option<TextureHandle>,
        model: Mat4,
        view: Mat4,
        proj: Mat4,
        resources: &Resources,
    ) -> bool {
        let Some((vertex_buffer, index_buffer, index_count)) = self
            .renderer
            .gpu_mesh(mesh, resources)
            .map(|m| (m.vertex_buffer, m.index_buffer, m.index_count))
        else {
            log::trace!("Skipping draw of unresolved mesh {:?}", mesh);
            self.context.skipped_draws += 1;
            return false;
        };
        if !self.bind_forward_plus_pipeline() {
            self.context.skipped_draws += 1;
            return false;
        }

        let material = resources.material_or_default(material);
        let texture_group = texture
            .or(material.base_color_texture)
            .and_then(|handle| self.renderer.texture_bind_group(handle, resources));
        let mut material_data = material.uniform_data();
        if texture_group.is_some() {
            material_data.params.z = 1.0;
        }

        self.commands.set_bind_group(
            TEXTURE_GROUP,
            texture_group.unwrap_or(self.renderer.white.bind_group),
        );
        self.commands
            .push_uniforms(UniformSlot::Draw, &DrawUniforms::new(model, view, proj, material_data));
        self.commands.set_vertex_buffer(0, vertex_buffer, 0);
        self.commands.set_index_buffer(index_buffer, 0, IndexFormat::Uint32);
        self.commands.draw_indexed(0..index_count, 0, 0..1);
        self.context.draw_calls += 1;
        true
    }

    /// Submit the frame and present it
    pub fn end(mut self) -> BackendResult<FrameStats> {
        self.ensure_render_pass();
        self.commands.end_render_pass();
        let stats = self.context.stats();
        let RenderFrame {
            renderer,
            commands,
            mut context,
            ..
        } = self;
        renderer.last_debug_lines = context.take_debug_lines();
        if let Err(e) = renderer.device.submit(commands) {
            log::error!("Frame {} abandoned: {}", stats.frame_index, e);
            return Err(e);
        }
        renderer.device.present()?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Material, Mesh};

    fn renderer() -> Renderer<HeadlessDevice> {
        let mut renderer = Renderer::new(HeadlessDevice::new(64, 64), EngineConfig::default()).unwrap();
        renderer.init_forward_plus().unwrap();
        renderer
    }

    #[test]
    fn skybox_only_before_draws() {
        let mut renderer = renderer();
        let mut resources = Resources::new();
        let mesh = resources.meshes.insert(Mesh::cube(), None).unwrap();

        let mut frame = renderer.begin_frame().unwrap();
        assert!(frame.draw_mesh_forward_plus(
            mesh,
            None,
            None,
            Mat4::IDENTITY,
            Mat4::IDENTITY,
            Mat4::IDENTITY,
            &resources
        ));
        assert!(!frame.draw_skybox(Mat4::IDENTITY, Mat4::IDENTITY, &Environment::default()));
        assert_eq!(frame.state(), FrameState::Drawing);
        frame.end().unwrap();
    }

    #[test]
    fn skybox_then_meshes() {
        let mut renderer = renderer();
        let mut resources = Resources::new();
        let mesh = resources.meshes.insert(Mesh::cube(), None).unwrap();

        let mut frame = renderer.begin_frame().unwrap();
        assert!(frame.draw_skybox(Mat4::IDENTITY, Mat4::IDENTITY, &Environment::default()));
        assert_eq!(frame.state(), FrameState::SkyboxDrawn);
        assert!(!frame.is_forward_plus_bound());
        for _ in 0..2 {
            frame.draw_mesh_forward_plus(
                mesh,
                None,
                None,
                Mat4::IDENTITY,
                Mat4::IDENTITY,
                Mat4::IDENTITY,
                &resources,
            );
        }
        let stats = frame.end().unwrap();
        assert_eq!(stats.pipeline_binds, 2);
        assert_eq!(stats.draw_calls, 3);
    }

    #[test]
    fn stale_mesh_is_skipped() {
        let mut renderer = renderer();
        let mut resources = Resources::new();
        let mesh = resources.meshes.insert(Mesh::cube(), None).unwrap();
        resources.meshes.remove(mesh);

        let mut frame = renderer.begin_frame().unwrap();
        assert!(!frame.draw_mesh_forward_plus(
            mesh,
            None,
            None,
            Mat4::IDENTITY,
            Mat4::IDENTITY,
            Mat4::IDENTITY,
            &resources
        ));
        assert!(!frame.is_forward_plus_bound());
        let stats = frame.end().unwrap();
        assert_eq!(stats.skipped_draws, 1);
        assert_eq!(stats.draw_calls, 0);
    }

    #[test]
    fn material_texture_is_uploaded_once() {
        let mut renderer = renderer();
        let mut resources = Resources::new();
        let mesh = resources.meshes.insert(Mesh::cube(), None).unwrap();
        let texture = resources
            .textures
            .insert(TextureData::checkerboard(4, [0, 0, 0, 255], [255; 4]), None)
            .unwrap();
        let material = resources
            .materials
            .insert(Material::new("checker").with_texture(texture), None)
            .unwrap();

        let mut frame = renderer.begin_frame().unwrap();
        for _ in 0..3 {
            frame.draw_mesh_forward_plus(
                mesh,
                Some(material),
                None,
                Mat4::IDENTITY,
                Mat4::IDENTITY,
                Mat4::IDENTITY,
                &resources,
            );
        }
        let stats = frame.end().unwrap();
        assert_eq!(stats.draw_calls, 3);
        assert_eq!(stats.pipeline_binds, 1);
        assert_eq!(renderer.gpu_texture_count(), 1);
        assert_eq!(renderer.gpu_mesh_count(), 1);

        resources.textures.remove(texture);
        resources.meshes.remove(mesh);
        renderer.prune_caches(&resources);
        assert_eq!(renderer.gpu_texture_count(), 0);
        assert_eq!(renderer.gpu_mesh_count(), 0);
    }

    #[test]
    fn failed_acquire_skips_frame() {
        let mut device = HeadlessDevice::new(32, 32);
        device.fail_surface(true);
        let mut renderer = Renderer::new(device, EngineConfig::default()).unwrap();
        assert!(renderer.begin_frame().is_none());
        assert_eq!(renderer.frame_index(), 0);

        renderer.device_mut().clear_failures();
        let frame = renderer.begin_frame().unwrap();
        assert_eq!(frame.index(), 0);
        frame.end().unwrap();
        assert_eq!(renderer.frame_index(), 1);
    }

    #[test]
    fn uninitialized_forward_plus_refuses_bind() {
        let mut renderer = Renderer::new(HeadlessDevice::new(32, 32), EngineConfig::default()).unwrap();
        let mut frame = renderer.begin_frame().unwrap();
        assert!(!frame.bind_forward_plus_pipeline());
        assert!(frame.cull_lights().is_err());
        frame.end().unwrap();
    }
}
