//! Headless device
//!
//! Keeps buffer contents in memory and records every submitted command
//! buffer without executing it. Used for tests and offscreen tooling.

use crate::backend::command::{CommandBuffer, GpuCommand};
use crate::backend::traits::*;
use crate::backend::types::*;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One submission as seen by the device
#[derive(Debug, Clone)]
pub struct Submission {
    pub label: String,
    pub commands: Vec<GpuCommand>,
}

/// Everything the device observed. Shared through [`HeadlessDevice::probe`].
#[derive(Debug, Default, Clone)]
pub struct HeadlessLog {
    pub submissions: Vec<Submission>,
    pub surfaces_acquired: u32,
    pub presents: u32,
    pub failed_submits: u32,
}

impl HeadlessLog {
    pub fn labels(&self) -> Vec<&str> {
        self.submissions.iter().map(|s| s.label.as_str()).collect()
    }

    pub fn count(&self, pred: impl Fn(&GpuCommand) -> bool) -> usize {
        self.submissions
            .iter()
            .flat_map(|s| s.commands.iter())
            .filter(|c| pred(c))
            .count()
    }

    pub fn render_pipeline_binds(&self) -> usize {
        self.count(|c| matches!(c, GpuCommand::SetRenderPipeline(_)))
    }

    pub fn draws(&self) -> usize {
        self.count(|c| matches!(c, GpuCommand::Draw { .. } | GpuCommand::DrawIndexed { .. }))
    }

    pub fn dispatches(&self) -> usize {
        self.count(|c| matches!(c, GpuCommand::Dispatch { .. }))
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

pub struct HeadlessDevice {
    width: u32,
    height: u32,
    format: TextureFormat,
    next_id: u64,
    buffers: HashMap<u64, Vec<u8>>,
    textures: HashMap<u64, TextureDescriptor>,
    views: HashMap<u64, u64>,
    layouts: HashMap<u64, Vec<BindGroupLayoutEntry>>,
    uniform_layout: BindGroupLayoutId,
    failing_acquires: HashSet<String>,
    failing_submits: HashSet<String>,
    fail_surface: bool,
    surface_acquired: bool,
    log: Arc<Mutex<HeadlessLog>>,
}

impl HeadlessDevice {
    pub fn new(width: u32, height: u32) -> Self {
        let mut device = Self {
            width: width.max(1),
            height: height.max(1),
            format: TextureFormat::Bgra8UnormSrgb,
            next_id: 1,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            views: HashMap::new(),
            layouts: HashMap::new(),
            uniform_layout: BindGroupLayoutId(0),
            failing_acquires: HashSet::new(),
            failing_submits: HashSet::new(),
            fail_surface: false,
            surface_acquired: false,
            log: Arc::new(Mutex::new(HeadlessLog::default())),
        };
        let id = device.alloc_id();
        device.layouts.insert(
            id,
            vec![BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStageFlags::VERTEX_FRAGMENT,
                ty: BindingType::UniformBuffer,
            }],
        );
        device.uniform_layout = BindGroupLayoutId(id);
        device
    }

    /// Shared view of the submission log. Stays valid after the device is
    /// moved into a renderer.
    pub fn probe(&self) -> Arc<Mutex<HeadlessLog>> {
        Arc::clone(&self.log)
    }

    /// Make `acquire_command_buffer(label)` fail
    pub fn fail_acquire(&mut self, label: &str) {
        self.failing_acquires.insert(label.to_string());
    }

    /// Make submitting a command buffer labelled `label` fail
    pub fn fail_submit(&mut self, label: &str) {
        self.failing_submits.insert(label.to_string());
    }

    pub fn fail_surface(&mut self, fail: bool) {
        self.fail_surface = fail;
    }

    pub fn clear_failures(&mut self) {
        self.failing_acquires.clear();
        self.failing_submits.clear();
        self.fail_surface = false;
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(Vec::as_slice)
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl GpuDevice for HeadlessDevice {
    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.width = width;
            self.height = height;
        }
    }

    fn swapchain_format(&self) -> TextureFormat {
        self.format
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferId> {
        let mut data = Vec::new();
        data.try_reserve_exact(desc.size as usize)
            .map_err(|_| BackendError::OutOfMemory)?;
        data.resize(desc.size as usize, 0);
        let id = self.alloc_id();
        self.buffers.insert(id, data);
        log::trace!("headless: buffer {} {:?} ({} bytes)", id, desc.label, desc.size);
        Ok(BufferId(id))
    }

    fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8]) -> BackendResult<BufferId> {
        let id = self.alloc_id();
        self.buffers.insert(id, data.to_vec());
        log::trace!("headless: buffer {} {:?} ({} bytes)", id, desc.label, data.len());
        Ok(BufferId(id))
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        let Some(buf) = self.buffers.get_mut(&buffer.0) else {
            log::warn!("headless: write to unknown buffer {:?}", buffer);
            return;
        };
        let start = offset as usize;
        let end = start + data.len();
        if end > buf.len() {
            log::warn!(
                "headless: write of {} bytes at {} overruns buffer {:?} ({} bytes)",
                data.len(),
                offset,
                buffer,
                buf.len()
            );
            return;
        }
        buf[start..end].copy_from_slice(data);
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureId> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?}: zero sized texture",
                desc.label
            )));
        }
        let id = self.alloc_id();
        self.textures.insert(id, desc.clone());
        Ok(TextureId(id))
    }

    fn create_texture_view(&mut self, texture: TextureId) -> BackendResult<TextureViewId> {
        if !self.textures.contains_key(&texture.0) {
            return Err(BackendError::TextureCreationFailed("Texture not found".into()));
        }
        let id = self.alloc_id();
        self.views.insert(id, texture.0);
        Ok(TextureViewId(id))
    }

    fn write_texture(&mut self, texture: TextureId, data: &[u8], width: u32, height: u32) {
        if let Some(desc) = self.textures.get(&texture.0) {
            let expected = (width * height * desc.format.bytes_per_pixel()) as usize;
            if data.len() != expected {
                log::warn!(
                    "headless: texture write of {} bytes, expected {}",
                    data.len(),
                    expected
                );
            }
        }
    }

    fn create_sampler(&mut self, _desc: &SamplerDescriptor) -> BackendResult<SamplerId> {
        Ok(SamplerId(self.alloc_id()))
    }

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutId> {
        let id = self.alloc_id();
        self.layouts.insert(id, entries.to_vec());
        Ok(BindGroupLayoutId(id))
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutId,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupId> {
        let Some(layout_entries) = self.layouts.get(&layout.0) else {
            return Err(BackendError::PipelineCreationFailed("Layout not found".into()));
        };
        if layout_entries.len() != entries.len() {
            return Err(BackendError::PipelineCreationFailed(format!(
                "bind group has {} entries, layout expects {}",
                entries.len(),
                layout_entries.len()
            )));
        }
        Ok(BindGroupId(self.alloc_id()))
    }

    fn uniform_layout(&self) -> BindGroupLayoutId {
        self.uniform_layout
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineId> {
        if desc.shader.is_empty() {
            return Err(BackendError::PipelineCreationFailed("empty shader".into()));
        }
        log::debug!("headless: render pipeline {:?}", desc.label);
        Ok(RenderPipelineId(self.alloc_id()))
    }

    fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDescriptor,
    ) -> BackendResult<ComputePipelineId> {
        if desc.shader.is_empty() {
            return Err(BackendError::PipelineCreationFailed("empty shader".into()));
        }
        log::debug!("headless: compute pipeline {:?}", desc.label);
        Ok(ComputePipelineId(self.alloc_id()))
    }

    fn acquire_command_buffer(&mut self, label: &str) -> BackendResult<CommandBuffer> {
        if self.failing_acquires.contains(label) {
            return Err(BackendError::CommandBufferUnavailable(label.to_string()));
        }
        Ok(CommandBuffer::new(label))
    }

    fn acquire_surface(&mut self) -> BackendResult<SurfaceFrame> {
        if self.fail_surface {
            return Err(BackendError::AcquireImageFailed("injected failure".into()));
        }
        self.surface_acquired = true;
        self.log.lock().surfaces_acquired += 1;
        let view = self.alloc_id();
        Ok(SurfaceFrame {
            view: TextureViewId(view),
            width: self.width,
            height: self.height,
        })
    }

    fn submit(&mut self, mut commands: CommandBuffer) -> BackendResult<()> {
        if self.failing_submits.contains(commands.label()) {
            self.log.lock().failed_submits += 1;
            return Err(BackendError::SubmitFailed(commands.label().to_string()));
        }
        commands.finish();
        self.log.lock().submissions.push(Submission {
            label: commands.label().to_string(),
            commands: commands.commands().to_vec(),
        });
        Ok(())
    }

    fn present(&mut self) -> BackendResult<()> {
        if !self.surface_acquired {
            return Err(BackendError::PresentFailed("no surface image acquired".into()));
        }
        self.surface_acquired = false;
        self.log.lock().presents += 1;
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer.0);
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture.0);
        self.views.retain(|_, t| *t != texture.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_keep_written_bytes() {
        let mut device = HeadlessDevice::new(64, 64);
        let buffer = device
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 8,
                usage: BufferUsage::STORAGE | BufferUsage::COPY_DST,
            })
            .unwrap();
        device.write_buffer(buffer, 4, &[1, 2, 3, 4]);
        device.write_buffer(buffer, 6, &[9, 9, 9, 9]);
        assert_eq!(device.buffer_contents(buffer), Some(&[0, 0, 0, 0, 1, 2, 3, 4][..]));
    }

    #[test]
    fn injected_failures() {
        let mut device = HeadlessDevice::new(64, 64);
        let probe = device.probe();
        device.fail_acquire("a");
        device.fail_submit("b");
        assert!(device.acquire_command_buffer("a").is_err());

        let cmd = device.acquire_command_buffer("b").unwrap();
        assert_eq!(device.submit(cmd), Err(BackendError::SubmitFailed("b".into())));
        let cmd = device.acquire_command_buffer("c").unwrap();
        device.submit(cmd).unwrap();

        let log = probe.lock();
        assert_eq!(log.labels(), vec!["c"]);
        assert_eq!(log.failed_submits, 1);
    }

    #[test]
    fn present_requires_surface() {
        let mut device = HeadlessDevice::new(64, 64);
        assert!(device.present().is_err());
        device.acquire_surface().unwrap();
        device.present().unwrap();
        assert_eq!(device.probe().lock().presents, 1);
    }
}
