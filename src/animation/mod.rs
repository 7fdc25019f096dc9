//! Skeletal animation: keyframe tracks, clips, skeletons and the animator
//! state machine

mod animator;
mod clip;
mod skeleton;
mod track;

pub use animator::{Animator, AnimatorState, LoopMode, Playback};
pub use clip::{AnimationClip, JointChannel};
pub use skeleton::{Joint, JointPose, Skeleton};
pub use track::{Interpolate, Interpolation, KeyframeTrack};
