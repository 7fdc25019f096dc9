use glam::{Quat, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    Linear,
    Step,
}

/// Values that can be blended between two keyframes
pub trait Interpolate: Copy {
    fn interpolate(a: Self, b: Self, t: f32) -> Self;
}

impl Interpolate for Vec3 {
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        a.lerp(b, t)
    }
}

impl Interpolate for Quat {
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        a.slerp(b, t)
    }
}

impl Interpolate for f32 {
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        a + (b - a) * t
    }
}

/// Keyframes sorted by time
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeTrack<T> {
    times: Vec<f32>,
    values: Vec<T>,
    pub interpolation: Interpolation,
}

impl<T: Interpolate> KeyframeTrack<T> {
    /// Pairs are sorted by time; extra times or values are dropped.
    pub fn new(keys: impl IntoIterator<Item = (f32, T)>, interpolation: Interpolation) -> Self {
        let mut keys: Vec<(f32, T)> = keys.into_iter().filter(|(t, _)| t.is_finite()).collect();
        keys.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (times, values) = keys.into_iter().unzip();
        Self {
            times,
            values,
            interpolation,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn duration(&self) -> f32 {
        self.times.last().copied().unwrap_or(0.0)
    }

    /// Value at `time`, clamped to the first and last keys. `None` for an
    /// empty track.
    pub fn sample(&self, time: f32) -> Option<T> {
        let last = self.times.len().checked_sub(1)?;
        let next = self.times.partition_point(|&t| t <= time);
        if next == 0 {
            return Some(self.values[0]);
        }
        if next > last {
            return Some(self.values[last]);
        }

        let prev = next - 1;
        match self.interpolation {
            Interpolation::Step => Some(self.values[prev]),
            Interpolation::Linear => {
                let span = self.times[next] - self.times[prev];
                let t = if span > 1e-6 {
                    ((time - self.times[prev]) / span).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                Some(T::interpolate(self.values[prev], self.values[next], t))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_sampling_and_clamping() {
        let track = KeyframeTrack::new(
            [(1.0, Vec3::X), (0.0, Vec3::ZERO)],
            Interpolation::Linear,
        );
        assert_eq!(track.sample(-1.0), Some(Vec3::ZERO));
        assert!(track.sample(0.25).unwrap().abs_diff_eq(Vec3::new(0.25, 0.0, 0.0), 1e-6));
        assert_eq!(track.sample(5.0), Some(Vec3::X));
        assert_eq!(track.duration(), 1.0);
    }

    #[test]
    fn step_holds_previous_key() {
        let track = KeyframeTrack::new([(0.0, 1.0f32), (1.0, 2.0)], Interpolation::Step);
        assert_eq!(track.sample(0.99), Some(1.0));
        assert_eq!(track.sample(1.0), Some(2.0));
    }

    #[test]
    fn empty_track_samples_nothing() {
        let track = KeyframeTrack::<Quat>::new([], Interpolation::Linear);
        assert_eq!(track.sample(0.0), None);
    }
}
