//! Per-frame context passed down the render chain

use glam::{Vec3, Vec4};

/// A world-space line queued for debug drawing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugLine {
    pub start: Vec3,
    pub end: Vec3,
    pub color: Vec4,
}

/// Counters reported by [`RenderFrame::end`](super::RenderFrame::end)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_index: u64,
    pub draw_calls: u32,
    pub pipeline_binds: u32,
    /// Mesh draws dropped because the mesh was stale, empty or not a frame
    /// state that accepts draws
    pub skipped_draws: u32,
    pub lights_submitted: u32,
    pub lights_uploaded: u32,
    pub cull_failed: bool,
    pub debug_lines: u32,
}

/// Frame-scoped bookkeeping. Lives inside the frame and dies with it, so
/// nothing here leaks into the next frame.
#[derive(Debug, Default)]
pub struct FrameContext {
    index: u64,
    pub draw_calls: u32,
    pub pipeline_binds: u32,
    pub skipped_draws: u32,
    pub lights_submitted: u32,
    pub lights_uploaded: u32,
    pub cull_failed: bool,
    debug_lines: Vec<DebugLine>,
}

impl FrameContext {
    pub fn new(index: u64) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn line(&mut self, start: Vec3, end: Vec3, color: Vec4) {
        self.debug_lines.push(DebugLine { start, end, color });
    }

    /// Three axis-aligned lines through `center`, `extent` long on each side
    pub fn cross(&mut self, center: Vec3, extent: f32, color: Vec4) {
        for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
            self.line(center - axis * extent, center + axis * extent, color);
        }
    }

    pub fn debug_lines(&self) -> &[DebugLine] {
        &self.debug_lines
    }

    pub fn take_debug_lines(&mut self) -> Vec<DebugLine> {
        std::mem::take(&mut self.debug_lines)
    }

    pub fn stats(&self) -> FrameStats {
        FrameStats {
            frame_index: self.index,
            draw_calls: self.draw_calls,
            pipeline_binds: self.pipeline_binds,
            skipped_draws: self.skipped_draws,
            lights_submitted: self.lights_submitted,
            lights_uploaded: self.lights_uploaded,
            cull_failed: self.cull_failed,
            debug_lines: self.debug_lines.len() as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_adds_three_lines() {
        let mut ctx = FrameContext::new(7);
        ctx.cross(Vec3::ZERO, 2.0, Vec4::ONE);
        assert_eq!(ctx.debug_lines().len(), 3);
        assert_eq!(ctx.debug_lines()[0].start, Vec3::new(-2.0, 0.0, 0.0));

        let stats = ctx.stats();
        assert_eq!(stats.frame_index, 7);
        assert_eq!(stats.debug_lines, 3);

        assert_eq!(ctx.take_debug_lines().len(), 3);
        assert!(ctx.debug_lines().is_empty());
    }
}
