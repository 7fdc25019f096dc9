use crate::resources::{MaterialHandle, MeshHandle, TextureHandle};

/// Draws a mesh at the entity's world transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshRenderer {
    pub mesh: MeshHandle,
    /// Falls back to the default material when unset or stale
    pub material: Option<MaterialHandle>,
    /// Overrides the material's base color texture
    pub texture: Option<TextureHandle>,
    pub enabled: bool,
}

impl MeshRenderer {
    pub fn new(mesh: MeshHandle) -> Self {
        Self {
            mesh,
            material: None,
            texture: None,
            enabled: true,
        }
    }

    pub fn with_material(mut self, material: MaterialHandle) -> Self {
        self.material = Some(material);
        self
    }

    pub fn with_texture(mut self, texture: TextureHandle) -> Self {
        self.texture = Some(texture);
        self
    }
}

/// Human readable entity name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name(pub String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
