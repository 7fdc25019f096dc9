use super::skeleton::JointPose;
use crate::resources::{ClipHandle, Resources, SkeletonHandle};
use glam::Mat4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    Once,
    #[default]
    Loop,
    PingPong,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Playback {
    pub clip: ClipHandle,
    pub time: f32,
    pub speed: f32,
    pub loop_mode: LoopMode,
    /// -1 while a ping-pong clip is running backwards
    direction: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum AnimatorState {
    #[default]
    Stopped,
    Playing(Playback),
    Paused(Playback),
}

/// Skeletal animation player component.
///
/// Stale skeleton or clip handles never panic: the animator simply stops
/// producing a pose until valid handles are assigned again.
#[derive(Debug, Clone, Default)]
pub struct Animator {
    pub skeleton: Option<SkeletonHandle>,
    state: AnimatorState,
    pose: Vec<JointPose>,
    joint_matrices: Vec<Mat4>,
}

impl Animator {
    pub fn new(skeleton: SkeletonHandle) -> Self {
        Self {
            skeleton: Some(skeleton),
            ..Default::default()
        }
    }

    pub fn state(&self) -> AnimatorState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, AnimatorState::Playing(_))
    }

    pub fn play(&mut self, clip: ClipHandle, loop_mode: LoopMode) {
        self.state = AnimatorState::Playing(Playback {
            clip,
            time: 0.0,
            speed: 1.0,
            loop_mode,
            direction: 1.0,
        });
    }

    pub fn set_speed(&mut self, speed: f32) {
        if let AnimatorState::Playing(p) | AnimatorState::Paused(p) = &mut self.state {
            p.speed = speed;
        }
    }

    pub fn pause(&mut self) {
        if let AnimatorState::Playing(p) = self.state {
            self.state = AnimatorState::Paused(p);
        }
    }

    pub fn resume(&mut self) {
        if let AnimatorState::Paused(p) = self.state {
            self.state = AnimatorState::Playing(p);
        }
    }

    pub fn stop(&mut self) {
        self.state = AnimatorState::Stopped;
    }

    pub fn time(&self) -> Option<f32> {
        match self.state {
            AnimatorState::Playing(p) | AnimatorState::Paused(p) => Some(p.time),
            AnimatorState::Stopped => None,
        }
    }

    /// Skinning matrices from the last update; empty when no pose exists.
    pub fn joint_matrices(&self) -> &[Mat4] {
        &self.joint_matrices
    }

    pub fn pose(&self) -> &[JointPose] {
        &self.pose
    }

    /// Advance playback and rebuild the pose.
    pub fn update(&mut self, dt: f32, resources: &Resources) {
        let Some(skeleton) = self.skeleton.and_then(|h| resources.skeletons.get(h)) else {
            self.pose.clear();
            self.joint_matrices.clear();
            return;
        };

        self.pose.clear();
        self.pose.extend(skeleton.rest_pose());

        let mut finished = false;
        match &mut self.state {
            AnimatorState::Playing(p) => match resources.clips.get(p.clip) {
                Some(clip) => {
                    finished = advance(p, dt, clip.duration);
                    clip.sample_into(p.time, &mut self.pose);
                }
                None => {
                    log::debug!("Animator clip {:?} is stale, stopping", p.clip);
                    finished = true;
                }
            },
            AnimatorState::Paused(p) => {
                if let Some(clip) = resources.clips.get(p.clip) {
                    clip.sample_into(p.time, &mut self.pose);
                }
            }
            AnimatorState::Stopped => {}
        }
        if finished {
            self.state = AnimatorState::Stopped;
        }

        skeleton.compute_joint_matrices(&self.pose, &mut self.joint_matrices);
    }
}

/// Moves the playhead; returns true when a `Once` clip reached its end.
fn advance(p: &mut Playback, dt: f32, duration: f32) -> bool {
    if duration <= 0.0 {
        p.time = 0.0;
        return p.loop_mode == LoopMode::Once;
    }
    p.time += dt * p.speed * p.direction;
    match p.loop_mode {
        LoopMode::Once => {
            if p.time >= duration || p.time < 0.0 {
                p.time = p.time.clamp(0.0, duration);
                return true;
            }
        }
        LoopMode::Loop => p.time = p.time.rem_euclid(duration),
        LoopMode::PingPong => {
            if p.time > duration {
                p.time = duration - (p.time - duration);
                p.direction = -p.direction;
            } else if p.time < 0.0 {
                p.time = -p.time;
                p.direction = -p.direction;
            }
            p.time = p.time.clamp(0.0, duration);
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{AnimationClip, Interpolation, JointChannel, KeyframeTrack, Skeleton};
    use glam::Vec3;

    fn setup() -> (Resources, SkeletonHandle, ClipHandle) {
        let mut resources = Resources::new();
        let mut skeleton = Skeleton::new("bone");
        skeleton
            .add_joint("root", None, JointPose::default(), Mat4::IDENTITY)
            .unwrap();
        let skeleton = resources.skeletons.insert(skeleton, None).unwrap();

        let mut channel = JointChannel::new(0);
        channel.translation = Some(KeyframeTrack::new(
            [(0.0, Vec3::ZERO), (1.0, Vec3::new(2.0, 0.0, 0.0))],
            Interpolation::Linear,
        ));
        let clip = resources
            .clips
            .insert(AnimationClip::new("slide", vec![channel]), None)
            .unwrap();
        (resources, skeleton, clip)
    }

    #[test]
    fn state_machine_transitions() {
        let (resources, skeleton, clip) = setup();
        let mut animator = Animator::new(skeleton);
        animator.pause();
        assert_eq!(animator.state(), AnimatorState::Stopped);

        animator.play(clip, LoopMode::Loop);
        animator.update(0.5, &resources);
        assert!(animator.is_playing());
        assert!(animator.pose()[0].translation.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-5));

        animator.pause();
        animator.update(0.25, &resources);
        assert_eq!(animator.time(), Some(0.5));
        assert!(animator.pose()[0].translation.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-5));

        animator.resume();
        animator.update(0.75, &resources);
        assert!((animator.time().unwrap() - 0.25).abs() < 1e-5);
    }

    #[test]
    fn once_stops_at_end() {
        let (resources, skeleton, clip) = setup();
        let mut animator = Animator::new(skeleton);
        animator.play(clip, LoopMode::Once);
        animator.update(2.0, &resources);
        assert_eq!(animator.state(), AnimatorState::Stopped);
        assert!(animator.pose()[0].translation.abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), 1e-5));
        assert_eq!(animator.joint_matrices().len(), 1);
    }

    #[test]
    fn ping_pong_reverses() {
        let (resources, skeleton, clip) = setup();
        let mut animator = Animator::new(skeleton);
        animator.play(clip, LoopMode::PingPong);
        animator.update(1.25, &resources);
        assert!((animator.time().unwrap() - 0.75).abs() < 1e-5);
        animator.update(0.25, &resources);
        assert!((animator.time().unwrap() - 0.5).abs() < 1e-5);
    }

    #[test]
    fn stale_handles_produce_no_pose() {
        let (mut resources, skeleton, clip) = setup();
        let mut animator = Animator::new(skeleton);
        animator.play(clip, LoopMode::Loop);

        resources.clips.remove(clip);
        animator.update(0.1, &resources);
        assert_eq!(animator.state(), AnimatorState::Stopped);

        resources.skeletons.remove(skeleton);
        animator.update(0.1, &resources);
        assert!(animator.joint_matrices().is_empty());
    }
}
