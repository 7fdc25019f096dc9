//! Transform component

use glam::{Mat3, Mat4, Quat, Vec3};

/// Local TRS plus the cached world matrix.
///
/// `world_matrix` is written only by
/// [`Scene::update_world_transforms`](super::Scene::update_world_transforms);
/// between updates it reflects the hierarchy as of the last pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub(crate) world_matrix: Mat4,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            world_matrix: Mat4::IDENTITY,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            world_matrix: Mat4::from_translation(translation),
            ..Default::default()
        }
    }

    pub fn from_translation_rotation(translation: Vec3, rotation: Quat) -> Self {
        let mut t = Self {
            translation,
            rotation,
            ..Default::default()
        };
        t.world_matrix = t.local_matrix();
        t
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self.world_matrix = self.local_matrix();
        self
    }

    /// Decompose a matrix into local TRS.
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
            world_matrix: matrix,
        }
    }

    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub fn world_matrix(&self) -> Mat4 {
        self.world_matrix
    }

    pub fn world_position(&self) -> Vec3 {
        self.world_matrix.w_axis.truncate()
    }

    /// World-space -Z basis
    pub fn world_forward(&self) -> Vec3 {
        (-self.world_matrix.z_axis.truncate()).normalize_or_zero()
    }

    /// Local forward direction (-Z)
    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn translate(&mut self, offset: Vec3) {
        self.translation += offset;
    }

    pub fn rotate_axis(&mut self, axis: Vec3, angle: f32) {
        self.rotation = Quat::from_axis_angle(axis, angle) * self.rotation;
    }

    /// Orient the local -Z axis towards `target`.
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let forward = (target - self.translation).normalize();
        let right = forward.cross(up).normalize();
        let up = right.cross(forward);
        self.rotation = Quat::from_mat3(&Mat3::from_cols(right, up, -forward));
    }

    pub(crate) fn set_world(&mut self, world: Mat4) {
        self.world_matrix = world;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn look_at_points_forward_at_target() {
        let mut t = Transform::from_translation(Vec3::new(0.0, 0.0, 5.0));
        t.look_at(Vec3::ZERO, Vec3::Y);
        assert!(t.forward().abs_diff_eq(-Vec3::Z, 1e-5));

        let mut side = Transform::from_translation(Vec3::ZERO);
        side.look_at(Vec3::new(3.0, 0.0, 0.0), Vec3::Y);
        assert!(side.forward().abs_diff_eq(Vec3::X, 1e-5));
        assert!(side.up().abs_diff_eq(Vec3::Y, 1e-5));
    }

    #[test]
    fn from_matrix_round_trips_trs() {
        let source = Transform::from_translation_rotation(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_rotation_y(0.5),
        )
        .with_scale(Vec3::splat(2.0));
        let back = Transform::from_matrix(source.local_matrix());
        assert!(back.translation.abs_diff_eq(source.translation, 1e-5));
        assert!(back.scale.abs_diff_eq(source.scale, 1e-5));
        assert!(back.rotation.abs_diff_eq(source.rotation, 1e-5));
    }
}
