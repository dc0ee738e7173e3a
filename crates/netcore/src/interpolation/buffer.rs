use std::collections::VecDeque;
use std::time::{Duration, Instant};

use glam::Vec2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolationState {
    pub position: Vec2,
    pub rotation: f32,
    pub arrived_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec2,
    pub rotation: f32,
}

impl From<&InterpolationState> for Pose {
    fn from(state: &InterpolationState) -> Self {
        Self {
            position: state.position,
            rotation: state.rotation,
        }
    }
}

/// Arrival-ordered history of one remote entity, rendered `buffer_time`
/// in the past so there is usually a later state to blend towards.
#[derive(Debug, Clone)]
pub struct NetworkInterpolator {
    buffer_time: Duration,
    states: VecDeque<InterpolationState>,
}

impl NetworkInterpolator {
    pub fn new(buffer_time: Duration) -> Self {
        Self {
            buffer_time,
            states: VecDeque::new(),
        }
    }

    pub fn buffer_time(&self) -> Duration {
        self.buffer_time
    }

    pub fn add_state(&mut self, position: Vec2, rotation: f32) {
        self.add_state_at(position, rotation, Instant::now());
    }

    pub fn add_state_at(&mut self, position: Vec2, rotation: f32, arrived_at: Instant) {
        let index = self.states.partition_point(|s| s.arrived_at <= arrived_at);
        self.states.insert(
            index,
            InterpolationState {
                position,
                rotation,
                arrived_at,
            },
        );
    }

    /// Drops states older than twice the buffer time. The newest state is
    /// always kept.
    pub fn clean_old_states(&mut self, now: Instant) {
        let horizon = self.buffer_time * 2;
        while self.states.len() > 1 {
            match self.states.front() {
                Some(oldest) if now.saturating_duration_since(oldest.arrived_at) > horizon => {
                    self.states.pop_front();
                }
                _ => break,
            }
        }
    }

    pub fn get_interpolated_state(&self) -> Option<Pose> {
        self.interpolated_state_at(Instant::now())
    }

    pub fn interpolated_state_at(&self, now: Instant) -> Option<Pose> {
        let first = self.states.front()?;
        let last = self.states.back()?;

        let Some(target) = now.checked_sub(self.buffer_time) else {
            return Some(first.into());
        };
        if target <= first.arrived_at {
            return Some(first.into());
        }
        if target >= last.arrived_at {
            return Some(last.into());
        }

        let after = self.states.partition_point(|s| s.arrived_at <= target);
        let from = &self.states[after - 1];
        let to = &self.states[after];

        let span = to.arrived_at.duration_since(from.arrived_at).as_secs_f32();
        let t = if span > 0.0 {
            (target.duration_since(from.arrived_at).as_secs_f32() / span).clamp(0.0, 1.0)
        } else {
            1.0
        };

        Some(Pose {
            position: from.position.lerp(to.position, t),
            rotation: from.rotation + (to.rotation - from.rotation) * t,
        })
    }

    pub fn latest(&self) -> Option<&InterpolationState> {
        self.states.back()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUFFER: Duration = Duration::from_millis(100);

    fn two_states() -> (NetworkInterpolator, Instant) {
        let base = Instant::now();
        let mut interpolator = NetworkInterpolator::new(BUFFER);
        interpolator.add_state_at(Vec2::new(0.0, 0.0), 0.0, base);
        interpolator.add_state_at(Vec2::new(10.0, 0.0), 1.0, base + Duration::from_millis(100));
        (interpolator, base)
    }

    #[test]
    fn test_midpoint() {
        let (interpolator, base) = two_states();
        let pose = interpolator
            .interpolated_state_at(base + Duration::from_millis(150))
            .unwrap();
        assert!((pose.position - Vec2::new(5.0, 0.0)).length() < 1e-3);
        assert!((pose.rotation - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_clamps_outside_history() {
        let (interpolator, base) = two_states();

        let early = interpolator
            .interpolated_state_at(base + Duration::from_millis(50))
            .unwrap();
        assert_eq!(early.position, Vec2::new(0.0, 0.0));

        let late = interpolator
            .interpolated_state_at(base + Duration::from_secs(5))
            .unwrap();
        assert_eq!(late.position, Vec2::new(10.0, 0.0));
    }

    #[test]
    fn test_single_state_and_empty() {
        let mut interpolator = NetworkInterpolator::new(BUFFER);
        assert!(interpolator.get_interpolated_state().is_none());

        let base = Instant::now();
        interpolator.add_state_at(Vec2::new(3.0, 4.0), 0.25, base);
        let pose = interpolator
            .interpolated_state_at(base + Duration::from_secs(1))
            .unwrap();
        assert_eq!(pose.position, Vec2::new(3.0, 4.0));
        assert_eq!(pose.rotation, 0.25);
    }

    #[test]
    fn test_out_of_order_arrivals_are_sorted() {
        let base = Instant::now();
        let mut interpolator = NetworkInterpolator::new(BUFFER);
        interpolator.add_state_at(Vec2::new(20.0, 0.0), 0.0, base + Duration::from_millis(200));
        interpolator.add_state_at(Vec2::new(0.0, 0.0), 0.0, base);
        interpolator.add_state_at(Vec2::new(10.0, 0.0), 0.0, base + Duration::from_millis(100));

        let pose = interpolator
            .interpolated_state_at(base + Duration::from_millis(250))
            .unwrap();
        assert!((pose.position.x - 15.0).abs() < 1e-3);
    }

    #[test]
    fn test_clean_keeps_newest() {
        let base = Instant::now();
        let mut interpolator = NetworkInterpolator::new(BUFFER);
        for i in 0..5u64 {
            interpolator.add_state_at(
                Vec2::new(i as f32, 0.0),
                0.0,
                base + Duration::from_millis(i * 100),
            );
        }

        interpolator.clean_old_states(base + Duration::from_millis(450));
        assert_eq!(interpolator.len(), 2);

        interpolator.clean_old_states(base + Duration::from_secs(60));
        assert_eq!(interpolator.len(), 1);
        assert_eq!(interpolator.latest().unwrap().position, Vec2::new(4.0, 0.0));
    }
}
