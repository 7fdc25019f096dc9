//! ZDL Engine - scene graph and Forward+ renderer core
//!
//! # Features
//! - Generational handles over slot storage for every shared resource
//! - Sparse-set component storage and a parent/child transform hierarchy
//! - Forward+ (tiled forward) shading with GPU or CPU light culling
//! - A device abstraction with a wgpu implementation and a headless one
//! - Skeletal animation, an asset database and a script binding surface

pub mod animation;
pub mod assets;
pub mod backend;
pub mod config;
pub mod core;
pub mod ecs;
pub mod pipeline;
pub mod render;
pub mod resources;
pub mod scene;
pub mod scripting;

pub use config::{Config, EngineConfig, ForwardPlusConfig};
pub use self::core::{Handle, Storage};
pub use ecs::Entity;
pub use render::{RenderFrame, RenderSystem, Renderer};
pub use resources::Resources;
pub use scene::Scene;

#[cfg(feature = "wgpu-backend")]
pub use backend::WgpuDevice;

/// Install the stderr logger, filtered by `RUST_LOG` and defaulting to
/// `info`. Calling it twice is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}
