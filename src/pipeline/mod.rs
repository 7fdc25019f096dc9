//! Forward+ rendering pipeline
//!
//! 1. Light culling - per-tile light lists, computed on the GPU or CPU
//! 2. Skybox - procedural sky behind everything
//! 3. Forward+ pass - PBR shading reading the tile lists

pub mod forward_pass;
pub mod forward_plus;
pub mod light_culling;
pub mod skybox;

pub use forward_pass::{create_forward_pipeline, material_texture_layout, FORWARD_PLUS_SHADER};
pub use forward_plus::{CullStats, ForwardPlus, LIGHT_CULLING_COMMANDS};
pub use light_culling::{
    depth_range, light_view_sphere, CullingUniforms, LightCuller, TileFrustum, TileGrid,
    TileLightLists, LIGHT_CULLING_SHADER,
};
pub use skybox::{create_skybox_pipeline, sky_inverse_view_proj, SKYBOX_SHADER};
