use std::time::Instant;

use glam::Vec2;

use crate::anticheat::AntiCheatValidator;
use crate::aoi::{AoiManager, ObjectKind};
use crate::config::{AoiConfig, ClientConfig};
use crate::interpolation::InterpolatorSet;
use crate::net::UserInfo;

use super::table::{ConnectedEntity, EntityTable};

/// Everything the packet handlers mutate. Owned by the client and touched
/// only from the tick.
#[derive(Debug)]
pub struct WorldState {
    pub entities: EntityTable,
    pub aoi: AoiManager,
    pub anticheat: AntiCheatValidator,
    pub interpolators: InterpolatorSet,
    aoi_config: AoiConfig,
    local_id: Option<u32>,
    profile: Option<UserInfo>,
}

impl WorldState {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            entities: EntityTable::new(),
            aoi: AoiManager::new(config.aoi.cell_size),
            anticheat: AntiCheatValidator::new(config.anticheat.clone()),
            interpolators: InterpolatorSet::new(config.interpolation.buffer_time),
            aoi_config: config.aoi.clone(),
            local_id: None,
            profile: None,
        }
    }

    pub fn local_id(&self) -> Option<u32> {
        self.local_id
    }

    pub fn local_entity(&self) -> Option<&ConnectedEntity> {
        self.entities.get(self.local_id?)
    }

    /// The logged-in character as last reported by the server.
    pub fn profile(&self) -> Option<&UserInfo> {
        self.profile.as_ref()
    }

    pub fn spawn_local(&mut self, info: &UserInfo, now: Instant) {
        let id = info.entity_id;
        if let Some(previous) = self.local_id.filter(|previous| *previous != id) {
            self.despawn(previous);
        }

        let mut entity = ConnectedEntity::new(
            id,
            info.name.clone(),
            info.position(),
            crate::net::decode_direction(info.direction),
            now,
        );
        entity.is_local = true;

        self.aoi.add_object(
            id,
            ObjectKind::Player,
            entity.position,
            self.aoi_config.local_view_distance,
        );
        self.entities.insert(entity);
        self.local_id = Some(id);
        self.profile = Some(info.clone());
        log::info!("logged in as {} ({id})", info.name);
    }

    /// Returns `true` when the entity was not known before.
    pub fn spawn_remote(
        &mut self,
        id: u32,
        name: &str,
        position: Vec2,
        direction: f32,
        now: Instant,
    ) -> bool {
        let is_new = !self.entities.contains(id);
        self.entities
            .insert(ConnectedEntity::new(id, name, position, direction, now));
        self.aoi.add_object(
            id,
            ObjectKind::Player,
            position,
            self.aoi_config.remote_view_distance,
        );
        self.anticheat.seed(id, position, None);
        self.interpolators.remove(id);
        self.interpolators.add_state_at(id, position, direction, now);
        is_new
    }

    pub fn despawn(&mut self, id: u32) -> Option<ConnectedEntity> {
        self.aoi.remove_object(id);
        self.anticheat.forget(id);
        self.interpolators.remove(id);
        if self.local_id == Some(id) {
            self.local_id = None;
            self.profile = None;
        }
        self.entities.remove(id)
    }

    /// Moves the local entity without validation; the local player is
    /// authoritative on its own position.
    pub fn move_local(
        &mut self,
        position: Vec2,
        velocity: Vec2,
        direction: f32,
        now: Instant,
    ) -> bool {
        let Some(id) = self.local_id else {
            return false;
        };
        let Some(entity) = self.entities.get_mut(id) else {
            return false;
        };
        entity.position = position;
        entity.velocity = velocity;
        entity.direction = direction;
        entity.last_update = now;
        self.aoi.update_object_position(id, position)
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.aoi.clear();
        self.anticheat.clear();
        self.interpolators.clear();
        self.local_id = None;
        self.profile = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: u32, x: u16, y: u16) -> UserInfo {
        UserInfo {
            entity_id: id,
            x,
            y,
            name: "aria".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_spawn_and_despawn_keep_components_in_step() {
        let now = Instant::now();
        let mut world = WorldState::new(&ClientConfig::default());

        world.spawn_local(&info(1, 10, 10), now);
        assert!(world.spawn_remote(2, "bram", Vec2::new(12.0, 10.0), 0.0, now));
        assert!(!world.spawn_remote(2, "bram", Vec2::new(13.0, 10.0), 0.0, now));

        assert_eq!(world.aoi.observers(1), vec![2]);
        assert!(world.anticheat.record(2).is_some());
        assert_eq!(world.interpolators.get(2).map(|i| i.len()), Some(1));

        let removed = world.despawn(2).unwrap();
        assert_eq!(removed.name, "bram");
        assert!(world.aoi.observers(1).is_empty());
        assert!(world.anticheat.record(2).is_none());
        assert!(world.interpolators.get(2).is_none());
    }

    #[test]
    fn test_clear_forgets_local_player() {
        let now = Instant::now();
        let mut world = WorldState::new(&ClientConfig::default());
        world.spawn_local(&info(7, 0, 0), now);
        assert_eq!(world.local_id(), Some(7));
        assert!(world.move_local(Vec2::new(3.0, 4.0), Vec2::ZERO, 0.0, now));

        world.clear();
        assert!(world.local_entity().is_none());
        assert!(world.profile().is_none());
        assert_eq!(world.aoi.object_count(), 0);
        assert!(!world.move_local(Vec2::ZERO, Vec2::ZERO, 0.0, now));
    }
}
