use std::collections::HashMap;
use std::time::{Duration, Instant};

use glam::Vec2;

use super::buffer::{NetworkInterpolator, Pose};

/// One interpolator per remote entity.
#[derive(Debug)]
pub struct InterpolatorSet {
    buffer_time: Duration,
    entities: HashMap<u32, NetworkInterpolator>,
}

impl InterpolatorSet {
    pub fn new(buffer_time: Duration) -> Self {
        Self {
            buffer_time,
            entities: HashMap::new(),
        }
    }

    pub fn add_state_at(&mut self, entity_id: u32, position: Vec2, rotation: f32, at: Instant) {
        let buffer_time = self.buffer_time;
        self.entities
            .entry(entity_id)
            .or_insert_with(|| NetworkInterpolator::new(buffer_time))
            .add_state_at(position, rotation, at);
    }

    pub fn get(&self, entity_id: u32) -> Option<&NetworkInterpolator> {
        self.entities.get(&entity_id)
    }

    pub fn interpolated_state_at(&self, entity_id: u32, now: Instant) -> Option<Pose> {
        self.entities.get(&entity_id)?.interpolated_state_at(now)
    }

    pub fn clean_old_states(&mut self, now: Instant) {
        for interpolator in self.entities.values_mut() {
            interpolator.clean_old_states(now);
        }
    }

    pub fn remove(&mut self, entity_id: u32) -> Option<NetworkInterpolator> {
        self.entities.remove(&entity_id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }
}
