//! Frame recording on top of the Forward+ pipeline

mod context;
mod frame;
mod render_system;

pub use context::{DebugLine, FrameContext, FrameStats};
pub use frame::{FrameState, RenderFrame, Renderer};
pub use render_system::RenderSystem;
