//! CPU-side resources referenced from the scene through handles

mod environment;
mod material;
mod mesh;
mod texture;

pub use environment::{Environment, EnvironmentUniformData};
pub use material::{Material, MaterialUniformData, Preset, MIN_ROUGHNESS};
pub use mesh::Mesh;
pub use texture::{TextureData, TextureError};

use crate::animation::{AnimationClip, Skeleton};
use crate::core::{Handle, Storage};

pub type MeshHandle = Handle<Mesh>;
pub type MaterialHandle = Handle<Material>;
pub type TextureHandle = Handle<TextureData>;
pub type SkeletonHandle = Handle<Skeleton>;
pub type ClipHandle = Handle<AnimationClip>;

/// Every handle-addressed resource owned by the engine context
#[derive(Debug, Default)]
pub struct Resources {
    pub meshes: Storage<Mesh>,
    pub materials: Storage<Material>,
    pub textures: Storage<TextureData>,
    pub skeletons: Storage<Skeleton>,
    pub clips: Storage<AnimationClip>,
    default_material: Material,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Used for renderers whose material is unset or stale
    pub fn default_material(&self) -> &Material {
        &self.default_material
    }

    pub fn set_default_material(&mut self, material: Material) {
        self.default_material = material;
    }

    /// Resolve a renderer's material, falling back to the default.
    pub fn material_or_default(&self, handle: Option<MaterialHandle>) -> &Material {
        handle
            .and_then(|h| self.materials.get(h))
            .unwrap_or(&self.default_material)
    }

    /// Release every resource. Outstanding handles become stale.
    pub fn clear(&mut self) {
        self.meshes.clear();
        self.materials.clear();
        self.textures.clear();
        self.skeletons.clear();
        self.clips.clear();
    }
}
