use crate::trajectory::Trajectory;
use serde::Serialize;

/// One animation frame: the state at a single sample index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationFrame {
    /// Stringified sample index, used by the scene layer as the frame name.
    pub label: String,
    pub index: usize,
    pub time: f64,
    pub state: Vec<f64>,
}

/// Finite iterator over every `stride`-th sample of a trajectory.
///
/// Clone it before playing to keep a copy that restarts from frame 0.
#[derive(Debug, Clone)]
pub struct Frames<'a> {
    trajectory: &'a Trajectory,
    stride: usize,
    next: usize,
}

impl Trajectory {
    /// Frames at sample indices `0, stride, 2 * stride, ...`. A stride of 0 is treated as 1.
    pub fn frames(&self, stride: usize) -> Frames<'_> {
        Frames {
            trajectory: self,
            stride: stride.max(1),
            next: 0,
        }
    }
}

impl Frames<'_> {
    pub fn frame_count(&self) -> usize {
        self.trajectory.len().div_ceil(self.stride)
    }
}

impl Iterator for Frames<'_> {
    type Item = AnimationFrame;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.next;
        let state = self.trajectory.state(index)?;
        self.next = index.saturating_add(self.stride);
        Some(AnimationFrame {
            label: index.to_string(),
            index,
            time: self.trajectory.times()[index],
            state: state.to_vec(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .trajectory
            .len()
            .saturating_sub(self.next)
            .div_ceil(self.stride);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Frames<'_> {}

#[cfg(test)]
mod tests {
    use crate::solvers::IntegratorSettings;
    use crate::system::SystemDefinition;
    use crate::trajectory::{integrate, InitialCondition, TimeSpan};

    fn sample_trajectory(samples: usize) -> crate::trajectory::Trajectory {
        let system = SystemDefinition::new("y", "-x").expect("system");
        integrate(
            &system,
            &InitialCondition::planar(1.0, 0.0),
            &TimeSpan::new(0.0, 1.0, samples).expect("span"),
            &IntegratorSettings::default(),
        )
        .expect("integrates")
    }

    #[test]
    fn stride_selects_every_kth_sample() {
        let trajectory = sample_trajectory(10);
        let frames: Vec<_> = trajectory.frames(3).collect();
        let indices: Vec<usize> = frames.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 3, 6, 9]);
        assert_eq!(frames[1].label, "3");
        assert_eq!(frames[0].state, vec![1.0, 0.0]);
        assert_eq!(frames[3].state, trajectory.state(9).expect("sample 9").to_vec());
        assert_eq!(trajectory.frames(3).frame_count(), 4);
        assert_eq!(trajectory.frames(3).len(), 4);
    }

    #[test]
    fn playback_restarts_from_the_first_frame() {
        let trajectory = sample_trajectory(5);
        let saved = trajectory.frames(2);
        let mut playing = saved.clone();
        assert_eq!(playing.next().map(|f| f.index), Some(0));
        assert_eq!(playing.next().map(|f| f.index), Some(2));
        let replay: Vec<usize> = saved.map(|f| f.index).collect();
        assert_eq!(replay, vec![0, 2, 4]);
        let fresh: Vec<usize> = trajectory.frames(2).map(|f| f.index).collect();
        assert_eq!(fresh, replay);
    }

    #[test]
    fn zero_stride_visits_every_sample() {
        let trajectory = sample_trajectory(4);
        assert_eq!(trajectory.frames(0).count(), 4);
    }
}
