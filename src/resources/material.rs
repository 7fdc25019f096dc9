//! PBR material definitions

use super::TextureHandle;
use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Lowest roughness the shading model handles without fireflies
pub const MIN_ROUGHNESS: f32 = 0.04;

/// Metallic-roughness material
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub base_color: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    pub emissive: Vec3,
    pub emissive_strength: f32,
    pub base_color_texture: Option<TextureHandle>,
}

impl Default for Material {
    fn default() -> Self {
        Self::new("default")
    }
}

/// Named starting points for common surfaces
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Preset {
    Plastic(Vec3),
    Rubber(Vec3),
    Metal { color: Vec3, roughness: f32 },
    Gold,
    Glow { color: Vec3, strength: f32 },
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            base_color: Vec4::ONE,
            metallic: 0.0,
            roughness: 0.5,
            emissive: Vec3::ZERO,
            emissive_strength: 1.0,
            base_color_texture: None,
        }
    }

    /// Opaque material from a linear color and the two PBR scalars, both
    /// clamped into their valid range.
    pub fn pbr(name: &str, color: Vec3, metallic: f32, roughness: f32) -> Self {
        Self::new(name).tinted(color.extend(1.0)).surface(metallic, roughness)
    }

    pub fn preset(preset: Preset) -> Self {
        match preset {
            Preset::Plastic(color) => Self::pbr("plastic", color, 0.0, 0.4),
            Preset::Rubber(color) => Self::pbr("rubber", color, 0.0, 0.9),
            Preset::Metal { color, roughness } => Self::pbr("metal", color, 1.0, roughness),
            Preset::Gold => Self::pbr("gold", Vec3::new(1.0, 0.766, 0.336), 1.0, 0.3),
            Preset::Glow { color, strength } => {
                Self::pbr("glow", color, 0.0, 0.5).glowing(color, strength)
            }
        }
    }

    pub fn tinted(self, base_color: Vec4) -> Self {
        Self { base_color, ..self }
    }

    pub fn surface(self, metallic: f32, roughness: f32) -> Self {
        Self {
            metallic: metallic.clamp(0.0, 1.0),
            roughness: roughness.clamp(MIN_ROUGHNESS, 1.0),
            ..self
        }
    }

    pub fn glowing(self, emissive: Vec3, emissive_strength: f32) -> Self {
        Self {
            emissive,
            emissive_strength,
            ..self
        }
    }

    pub fn with_texture(self, texture: TextureHandle) -> Self {
        Self {
            base_color_texture: Some(texture),
            ..self
        }
    }

    pub fn uniform_data(&self) -> MaterialUniformData {
        MaterialUniformData {
            base_color: self.base_color,
            emissive: self.emissive.extend(self.emissive_strength),
            params: Vec4::new(self.metallic, self.roughness, 0.0, 0.0),
        }
    }
}

/// Material block as laid out in the draw uniforms
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialUniformData {
    pub base_color: Vec4,
    /// xyz = emissive color, w = strength
    pub emissive: Vec4,
    /// x = metallic, y = roughness, z = has texture, w unused
    pub params: Vec4,
}

impl Default for MaterialUniformData {
    fn default() -> Self {
        Material::default().uniform_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_params_are_clamped() {
        let m = Material::pbr("m", Vec3::ONE, 3.0, 0.0);
        assert_eq!(m.metallic, 1.0);
        assert_eq!(m.roughness, MIN_ROUGHNESS);
        let glow = Material::preset(Preset::Glow {
            color: Vec3::X,
            strength: 4.0,
        });
        assert_eq!(glow.uniform_data().emissive, Vec4::new(1.0, 0.0, 0.0, 4.0));
    }
}
