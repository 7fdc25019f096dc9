//! Light component and its GPU representation

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// Global light, bypasses tiling. Direction is the entity's -Z axis.
    Directional,
    Point,
    /// Cone along the entity's -Z axis. Angles are half-angles in radians.
    Spot { inner_angle: f32, outer_angle: f32 },
}

/// Light component. Position and direction come from the Transform on the
/// same entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
    /// Influence radius for point and spot lights
    pub range: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self::point(Vec3::ONE, 1.0, 10.0)
    }
}

impl Light {
    pub fn point(color: Vec3, intensity: f32, range: f32) -> Self {
        Self {
            kind: LightKind::Point,
            color,
            intensity,
            range,
        }
    }

    pub fn spot(color: Vec3, intensity: f32, range: f32, inner_angle: f32, outer_angle: f32) -> Self {
        Self {
            kind: LightKind::Spot {
                inner_angle: inner_angle.min(outer_angle),
                outer_angle,
            },
            color,
            intensity,
            range,
        }
    }

    pub fn directional(color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Directional,
            color,
            intensity,
            range: f32::INFINITY,
        }
    }

    pub fn is_directional(&self) -> bool {
        matches!(self.kind, LightKind::Directional)
    }
}

pub const LIGHT_TYPE_POINT: f32 = 0.0;
pub const LIGHT_TYPE_SPOT: f32 = 1.0;

/// GPU-friendly light record, one per tiled light
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuLightData {
    /// xyz = world position, w = range
    pub position_range: Vec4,
    /// xyz = color, w = intensity
    pub color_intensity: Vec4,
    /// xyz = direction, w = light type (0 = point, 1 = spot)
    pub direction_type: Vec4,
    /// x = cos(inner), y = cos(outer), zw unused
    pub spot_params: Vec4,
}

impl GpuLightData {
    pub fn point(position: Vec3, range: f32, color: Vec3, intensity: f32) -> Self {
        Self {
            position_range: position.extend(range),
            color_intensity: color.extend(intensity),
            direction_type: Vec4::new(0.0, 0.0, 0.0, LIGHT_TYPE_POINT),
            spot_params: Vec4::ZERO,
        }
    }

    pub fn spot(
        position: Vec3,
        direction: Vec3,
        range: f32,
        color: Vec3,
        intensity: f32,
        inner_angle: f32,
        outer_angle: f32,
    ) -> Self {
        Self {
            position_range: position.extend(range),
            color_intensity: color.extend(intensity),
            direction_type: direction.normalize_or_zero().extend(LIGHT_TYPE_SPOT),
            spot_params: Vec4::new(inner_angle.cos(), outer_angle.cos(), 0.0, 0.0),
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position_range.truncate()
    }

    pub fn range(&self) -> f32 {
        self.position_range.w
    }

    pub fn direction(&self) -> Vec3 {
        self.direction_type.truncate()
    }

    pub fn is_spot(&self) -> bool {
        self.direction_type.w == LIGHT_TYPE_SPOT
    }

    pub fn cos_outer(&self) -> f32 {
        self.spot_params.y
    }
}

/// Directional light as stored in the frame uniforms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.5, -1.0, -0.5).normalize(),
            color: Vec3::ONE,
            intensity: 0.0,
        }
    }
}
