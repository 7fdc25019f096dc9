//! Camera component

use glam::{Mat4, Vec3};

/// Perspective camera. Position and orientation come from the entity's
/// world transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Vertical field of view in radians
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    /// Fixed aspect ratio; `None` follows the viewport
    pub aspect: Option<f32>,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            fov_y: std::f32::consts::FRAC_PI_4,
            near: 0.1,
            far: 1000.0,
            aspect: None,
        }
    }
}

impl Camera {
    pub fn perspective(fov_y_degrees: f32, near: f32, far: f32) -> Self {
        Self {
            fov_y: fov_y_degrees.to_radians(),
            near,
            far,
            aspect: None,
        }
    }

    pub fn with_aspect(mut self, aspect: f32) -> Self {
        self.aspect = Some(aspect);
        self
    }

    pub fn aspect_for(&self, viewport_width: u32, viewport_height: u32) -> f32 {
        self.aspect
            .unwrap_or(viewport_width.max(1) as f32 / viewport_height.max(1) as f32)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far)
    }
}

/// View matrix from a camera world matrix.
///
/// The eye is the translation column, the view direction the negated Z basis
/// and the up vector the Y basis.
pub fn view_matrix_from_world(world: Mat4) -> Mat4 {
    let eye = world.w_axis.truncate();
    let forward = (-world.z_axis.truncate()).normalize_or_zero();
    let up = world.y_axis.truncate().normalize_or_zero();
    if forward == Vec3::ZERO || up == Vec3::ZERO {
        return Mat4::from_translation(-eye);
    }
    Mat4::look_to_rh(eye, forward, up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec4};

    #[test]
    fn identity_world_gives_identity_view() {
        assert!(view_matrix_from_world(Mat4::IDENTITY).abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn view_moves_eye_to_origin() {
        let world = Mat4::from_rotation_translation(
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            Vec3::new(2.0, 1.0, -4.0),
        );
        let view = view_matrix_from_world(world);
        let eye = view * Vec4::new(2.0, 1.0, -4.0, 1.0);
        assert!(eye.truncate().abs_diff_eq(Vec3::ZERO, 1e-5));

        // A point one unit along the camera's -Z lands on the view axis.
        let ahead = world.transform_point3(-Vec3::Z);
        let in_view = view.transform_point3(ahead);
        assert!(in_view.abs_diff_eq(Vec3::new(0.0, 0.0, -1.0), 1e-5));
    }

    #[test]
    fn aspect_follows_viewport_unless_fixed() {
        let camera = Camera::default();
        assert!((camera.aspect_for(1600, 800) - 2.0).abs() < 1e-6);
        assert!((camera.with_aspect(1.0).aspect_for(1600, 800) - 1.0).abs() < 1e-6);
        assert!(camera.aspect_for(0, 0).is_finite());
    }
}
