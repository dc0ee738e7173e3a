use std::collections::HashMap;
use std::time::Instant;

use glam::Vec2;

use crate::net::sequence_greater_than;

#[derive(Debug, Clone)]
pub struct ConnectedEntity {
    pub id: u32,
    pub name: String,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Radians.
    pub direction: f32,
    pub last_update: Instant,
    /// Wire timestamp of the newest applied movement.
    pub last_sequence: Option<u32>,
    pub is_local: bool,
}

impl ConnectedEntity {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        position: Vec2,
        direction: f32,
        now: Instant,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            position,
            velocity: Vec2::ZERO,
            direction,
            last_update: now,
            last_sequence: None,
            is_local: false,
        }
    }

    /// Whether a movement stamped `sequence` is newer than the last applied.
    pub fn is_newer(&self, sequence: u32) -> bool {
        self.last_sequence
            .is_none_or(|last| sequence_greater_than(sequence, last))
    }

    /// Applies a movement and re-estimates velocity from the wire timestamps.
    pub fn apply_move(&mut self, position: Vec2, direction: f32, sequence: u32, now: Instant) {
        if let Some(last) = self.last_sequence {
            let elapsed_ms = sequence.wrapping_sub(last);
            if elapsed_ms > 0 && sequence_greater_than(sequence, last) {
                self.velocity = (position - self.position) / (elapsed_ms as f32 / 1000.0);
            }
        }
        self.position = position;
        self.direction = direction;
        self.last_sequence = Some(sequence);
        self.last_update = now;
    }
}

#[derive(Debug, Default)]
pub struct EntityTable {
    entities: HashMap<u32, ConnectedEntity>,
}

impl EntityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: ConnectedEntity) -> Option<ConnectedEntity> {
        self.entities.insert(entity.id, entity)
    }

    pub fn remove(&mut self, id: u32) -> Option<ConnectedEntity> {
        self.entities.remove(&id)
    }

    pub fn get(&self, id: u32) -> Option<&ConnectedEntity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut ConnectedEntity> {
        self.entities.get_mut(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnectedEntity> {
        self.entities.values()
    }

    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        ids
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
