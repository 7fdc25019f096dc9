use glam::{Mat4, Quat, Vec3};

/// Local joint pose
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointPose {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for JointPose {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl JointPose {
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub name: String,
    /// Index of the parent joint; always lower than this joint's index
    pub parent: Option<usize>,
    pub inverse_bind: Mat4,
    pub rest: JointPose,
}

/// Joint hierarchy stored parents-first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skeleton {
    pub name: String,
    joints: Vec<Joint>,
}

impl Skeleton {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            joints: Vec::new(),
        }
    }

    /// Append a joint. Returns `None` if `parent` does not refer to an
    /// already added joint.
    pub fn add_joint(
        &mut self,
        name: &str,
        parent: Option<usize>,
        rest: JointPose,
        inverse_bind: Mat4,
    ) -> Option<usize> {
        if parent.is_some_and(|p| p >= self.joints.len()) {
            return None;
        }
        self.joints.push(Joint {
            name: name.to_string(),
            parent,
            inverse_bind,
            rest,
        });
        Some(self.joints.len() - 1)
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn find_joint(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == name)
    }

    pub fn rest_pose(&self) -> Vec<JointPose> {
        self.joints.iter().map(|j| j.rest).collect()
    }

    /// Model-space joint matrices times inverse bind, ready for skinning.
    /// Missing pose entries use the rest pose.
    pub fn compute_joint_matrices(&self, pose: &[JointPose], out: &mut Vec<Mat4>) {
        out.clear();
        out.reserve(self.joints.len());
        let mut globals: Vec<Mat4> = Vec::with_capacity(self.joints.len());
        for (i, joint) in self.joints.iter().enumerate() {
            let local = pose.get(i).unwrap_or(&joint.rest).matrix();
            let global = match joint.parent {
                Some(p) => globals[p] * local,
                None => local,
            };
            globals.push(global);
            out.push(global * joint.inverse_bind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_pose_with_matching_inverse_bind_is_identity() {
        let mut skeleton = Skeleton::new("arm");
        let root_rest = JointPose {
            translation: Vec3::Y,
            ..Default::default()
        };
        let root = skeleton
            .add_joint("root", None, root_rest, root_rest.matrix().inverse())
            .unwrap();
        let tip_rest = JointPose {
            translation: Vec3::X,
            ..Default::default()
        };
        let tip_global = root_rest.matrix() * tip_rest.matrix();
        skeleton
            .add_joint("tip", Some(root), tip_rest, tip_global.inverse())
            .unwrap();

        let mut matrices = Vec::new();
        skeleton.compute_joint_matrices(&skeleton.rest_pose(), &mut matrices);
        assert_eq!(matrices.len(), 2);
        assert!(matrices.iter().all(|m| m.abs_diff_eq(Mat4::IDENTITY, 1e-5)));
    }

    #[test]
    fn forward_parent_reference_is_rejected() {
        let mut skeleton = Skeleton::new("bad");
        assert!(skeleton
            .add_joint("j", Some(0), JointPose::default(), Mat4::IDENTITY)
            .is_none());
    }
}
