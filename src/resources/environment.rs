//! Procedural sky environment used by the skybox and ambient IBL

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Three-stop gradient sky. The same gradient is sampled by the skybox
/// shader and integrated for the diffuse image-based lighting term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Environment {
    pub zenith: Vec3,
    pub horizon: Vec3,
    pub ground: Vec3,
    pub intensity: f32,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            zenith: Vec3::new(0.18, 0.36, 0.75),
            horizon: Vec3::new(0.75, 0.82, 0.9),
            ground: Vec3::new(0.22, 0.2, 0.18),
            intensity: 1.0,
        }
    }
}

impl Environment {
    /// Radiance seen along a world-space direction
    pub fn sample(&self, direction: Vec3) -> Vec3 {
        let y = direction.normalize_or_zero().y;
        let color = if y >= 0.0 {
            self.horizon.lerp(self.zenith, y.powf(0.6))
        } else {
            self.horizon.lerp(self.ground, (-y).powf(0.4))
        };
        color * self.intensity
    }

    pub fn uniform_data(&self) -> EnvironmentUniformData {
        EnvironmentUniformData {
            zenith: self.zenith.extend(self.intensity),
            horizon: self.horizon.extend(0.0),
            ground: self.ground.extend(0.0),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct EnvironmentUniformData {
    /// xyz = zenith color, w = intensity
    pub zenith: Vec4,
    pub horizon: Vec4,
    pub ground: Vec4,
}

impl Default for EnvironmentUniformData {
    fn default() -> Self {
        Environment::default().uniform_data()
    }
}
