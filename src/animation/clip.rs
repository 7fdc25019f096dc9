use super::skeleton::JointPose;
use super::track::KeyframeTrack;
use glam::{Quat, Vec3};

/// Keyframes driving one joint. Empty tracks leave that part of the pose
/// untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct JointChannel {
    pub joint: usize,
    pub translation: Option<KeyframeTrack<Vec3>>,
    pub rotation: Option<KeyframeTrack<Quat>>,
    pub scale: Option<KeyframeTrack<Vec3>>,
}

impl JointChannel {
    pub fn new(joint: usize) -> Self {
        Self {
            joint,
            translation: None,
            rotation: None,
            scale: None,
        }
    }

    fn duration(&self) -> f32 {
        let t = self.translation.as_ref().map_or(0.0, KeyframeTrack::duration);
        let r = self.rotation.as_ref().map_or(0.0, KeyframeTrack::duration);
        let s = self.scale.as_ref().map_or(0.0, KeyframeTrack::duration);
        t.max(r).max(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub channels: Vec<JointChannel>,
}

impl AnimationClip {
    /// Duration is the latest keyframe across all channels.
    pub fn new(name: &str, channels: Vec<JointChannel>) -> Self {
        let duration = channels.iter().map(JointChannel::duration).fold(0.0, f32::max);
        Self {
            name: name.to_string(),
            duration,
            channels,
        }
    }

    /// Overwrite the channels' joints in `pose` with their values at `time`.
    /// Channels addressing joints beyond `pose` are ignored.
    pub fn sample_into(&self, time: f32, pose: &mut [JointPose]) {
        for channel in &self.channels {
            let Some(joint) = pose.get_mut(channel.joint) else {
                continue;
            };
            if let Some(v) = channel.translation.as_ref().and_then(|t| t.sample(time)) {
                joint.translation = v;
            }
            if let Some(v) = channel.rotation.as_ref().and_then(|t| t.sample(time)) {
                joint.rotation = v.normalize();
            }
            if let Some(v) = channel.scale.as_ref().and_then(|t| t.sample(time)) {
                joint.scale = v;
            }
        }
    }
}
