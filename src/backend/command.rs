//! Recorded command buffers
//!
//! Commands are buffered here and replayed by the device on submit, the
//! same way pending passes are buffered until they end.

use crate::backend::traits::*;
use crate::backend::types::*;
use bytemuck::Pod;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    BeginRenderPass(RenderPassDescriptor),
    EndRenderPass,
    BeginComputePass { label: Option<String> },
    EndComputePass,
    SetRenderPipeline(RenderPipelineId),
    SetComputePipeline(ComputePipelineId),
    SetBindGroup { index: u32, bind_group: BindGroupId },
    /// Uniform block for `slot`, at most [`UNIFORM_SLOT_SIZE`] bytes
    PushUniforms { slot: UniformSlot, data: Vec<u8> },
    SetVertexBuffer { slot: u32, buffer: BufferId, offset: u64 },
    SetIndexBuffer { buffer: BufferId, offset: u64, format: IndexFormat },
    SetViewport { x: f32, y: f32, width: f32, height: f32 },
    Draw { vertices: Range<u32>, instances: Range<u32> },
    DrawIndexed { indices: Range<u32>, base_vertex: i32, instances: Range<u32> },
    Dispatch { x: u32, y: u32, z: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenPass {
    None,
    Render,
    Compute,
}

/// A labelled list of commands for one queue submission
#[derive(Debug)]
pub struct CommandBuffer {
    label: String,
    commands: Vec<GpuCommand>,
    open: OpenPass,
}

impl CommandBuffer {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            commands: Vec::new(),
            open: OpenPass::None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn in_render_pass(&self) -> bool {
        self.open == OpenPass::Render
    }

    pub fn in_compute_pass(&self) -> bool {
        self.open == OpenPass::Compute
    }

    /// Close whatever pass is still open. Devices call this before replay.
    pub fn finish(&mut self) {
        match self.open {
            OpenPass::Render => self.end_render_pass(),
            OpenPass::Compute => self.end_compute_pass(),
            OpenPass::None => {}
        }
    }

    pub fn begin_render_pass(&mut self, desc: RenderPassDescriptor) {
        self.finish();
        self.commands.push(GpuCommand::BeginRenderPass(desc));
        self.open = OpenPass::Render;
    }

    pub fn end_render_pass(&mut self) {
        if self.open == OpenPass::Render {
            self.commands.push(GpuCommand::EndRenderPass);
            self.open = OpenPass::None;
        }
    }

    pub fn begin_compute_pass(&mut self, label: Option<&str>) {
        self.finish();
        self.commands.push(GpuCommand::BeginComputePass {
            label: label.map(str::to_string),
        });
        self.open = OpenPass::Compute;
    }

    pub fn end_compute_pass(&mut self) {
        if self.open == OpenPass::Compute {
            self.commands.push(GpuCommand::EndComputePass);
            self.open = OpenPass::None;
        }
    }

    pub fn set_render_pipeline(&mut self, pipeline: RenderPipelineId) {
        self.record_render(GpuCommand::SetRenderPipeline(pipeline));
    }

    pub fn set_compute_pipeline(&mut self, pipeline: ComputePipelineId) {
        self.record_compute(GpuCommand::SetComputePipeline(pipeline));
    }

    pub fn set_bind_group(&mut self, index: u32, bind_group: BindGroupId) {
        self.record_any(GpuCommand::SetBindGroup { index, bind_group });
    }

    /// Record a uniform block for `slot`. The device copies it into its
    /// uniform ring and binds it at the slot's group.
    pub fn push_uniforms<T: Pod>(&mut self, slot: UniformSlot, value: &T) {
        let data = bytemuck::bytes_of(value);
        if data.len() as u64 > UNIFORM_SLOT_SIZE {
            log::warn!(
                "{}: uniform block of {} bytes exceeds the {} byte slot, dropped",
                self.label,
                data.len(),
                UNIFORM_SLOT_SIZE
            );
            return;
        }
        self.record_any(GpuCommand::PushUniforms {
            slot,
            data: data.to_vec(),
        });
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, offset: u64) {
        self.record_render(GpuCommand::SetVertexBuffer { slot, buffer, offset });
    }

    pub fn set_index_buffer(&mut self, buffer: BufferId, offset: u64, format: IndexFormat) {
        self.record_render(GpuCommand::SetIndexBuffer { buffer, offset, format });
    }

    pub fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.record_render(GpuCommand::SetViewport { x, y, width, height });
    }

    pub fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.record_render(GpuCommand::Draw { vertices, instances });
    }

    pub fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.record_render(GpuCommand::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.record_compute(GpuCommand::Dispatch { x, y, z });
    }

    fn record_render(&mut self, command: GpuCommand) {
        if self.open == OpenPass::Render {
            self.commands.push(command);
        } else {
            log::warn!("{}: {:?} recorded outside a render pass, ignored", self.label, command);
        }
    }

    fn record_compute(&mut self, command: GpuCommand) {
        if self.open == OpenPass::Compute {
            self.commands.push(command);
        } else {
            log::warn!("{}: {:?} recorded outside a compute pass, ignored", self.label, command);
        }
    }

    fn record_any(&mut self, command: GpuCommand) {
        if self.open == OpenPass::None {
            log::warn!("{}: {:?} recorded outside a pass, ignored", self.label, command);
        } else {
            self.commands.push(command);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_outside_pass_are_dropped() {
        let mut cmd = CommandBuffer::new("test");
        cmd.draw(0..3, 0..1);
        cmd.dispatch(1, 1, 1);
        assert!(cmd.is_empty());

        cmd.begin_compute_pass(Some("cull"));
        cmd.draw(0..3, 0..1);
        cmd.dispatch(2, 2, 1);
        cmd.finish();
        assert_eq!(
            cmd.commands(),
            &[
                GpuCommand::BeginComputePass {
                    label: Some("cull".into())
                },
                GpuCommand::Dispatch { x: 2, y: 2, z: 1 },
                GpuCommand::EndComputePass,
            ]
        );
    }

    #[test]
    fn oversized_uniforms_are_rejected() {
        let mut cmd = CommandBuffer::new("test");
        cmd.begin_compute_pass(None);
        cmd.push_uniforms(UniformSlot::Draw, &[0u8; 512]);
        cmd.push_uniforms(UniformSlot::Draw, &[1.0f32; 4]);
        assert_eq!(cmd.commands().len(), 2);
    }
}
