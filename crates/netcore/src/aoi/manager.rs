use std::collections::{HashMap, HashSet};

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::grid::{CellCoord, Grid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ObjectKind {
    #[default]
    Player,
    Npc,
    Other,
}

#[derive(Debug, Clone)]
pub struct AoiObject {
    pub id: u32,
    pub kind: ObjectKind,
    pub position: Vec2,
    pub view_distance: f32,
    cell: CellCoord,
    observers: HashSet<u32>,
}

impl AoiObject {
    pub fn cell(&self) -> CellCoord {
        self.cell
    }

    pub fn observers(&self) -> &HashSet<u32> {
        &self.observers
    }
}

/// Area-of-interest index. Two objects observe each other exactly when
/// their distance is within the smaller of their view distances; observer
/// sets are kept symmetric after every mutation.
#[derive(Debug)]
pub struct AoiManager {
    grid: Grid,
    objects: HashMap<u32, AoiObject>,
    max_view_distance: f32,
}

impl AoiManager {
    pub fn new(cell_size: f32) -> Self {
        Self {
            grid: Grid::new(cell_size),
            objects: HashMap::new(),
            max_view_distance: 0.0,
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.grid.cell_size()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn cell_count(&self) -> usize {
        self.grid.cell_count()
    }

    pub fn get(&self, id: u32) -> Option<&AoiObject> {
        self.objects.get(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.objects.contains_key(&id)
    }

    fn neighbourhood_radius(&self) -> i32 {
        self.grid.radius_for(self.max_view_distance)
    }

    /// Adds an object, replacing any previous object with the same id.
    /// Returns `false` for a non-finite position.
    pub fn add_object(
        &mut self,
        id: u32,
        kind: ObjectKind,
        position: Vec2,
        view_distance: f32,
    ) -> bool {
        if !position.is_finite() {
            log::warn!("aoi: object {id} has non-finite position {position}");
            return false;
        }
        if self.objects.contains_key(&id) {
            self.remove_object(id);
        }

        let view_distance = if view_distance.is_finite() {
            view_distance.max(0.0)
        } else {
            0.0
        };
        self.max_view_distance = self.max_view_distance.max(view_distance);

        let cell = self.grid.cell_of(position);
        self.grid.insert(cell, id);
        self.objects.insert(
            id,
            AoiObject {
                id,
                kind,
                position,
                view_distance,
                cell,
                observers: HashSet::new(),
            },
        );

        let candidates = self.grid.ids_around(cell, self.neighbourhood_radius());
        self.refresh(id, candidates);
        true
    }

    /// Returns `false` if the object is unknown or the position is not finite.
    pub fn update_object_position(&mut self, id: u32, position: Vec2) -> bool {
        if !position.is_finite() {
            log::warn!("aoi: object {id} moved to non-finite position {position}");
            return false;
        }
        let radius = self.neighbourhood_radius();
        let new_cell = self.grid.cell_of(position);
        let Some(object) = self.objects.get_mut(&id) else {
            return false;
        };

        let old_cell = object.cell;
        object.position = position;
        let mut candidates: Vec<u32> = object.observers.iter().copied().collect();

        if old_cell != new_cell {
            object.cell = new_cell;
            self.grid.remove(old_cell, id);
            self.grid.insert(new_cell, id);
            candidates.extend(self.grid.ids_around(old_cell, radius));
        }
        candidates.extend(self.grid.ids_around(new_cell, radius));

        self.refresh(id, candidates);
        true
    }

    pub fn remove_object(&mut self, id: u32) -> Option<AoiObject> {
        let object = self.objects.remove(&id)?;
        self.grid.remove(object.cell, id);
        for observer in &object.observers {
            if let Some(other) = self.objects.get_mut(observer) {
                other.observers.remove(&id);
            }
        }
        if self.objects.is_empty() {
            self.max_view_distance = 0.0;
        }
        Some(object)
    }

    /// Re-evaluates the pair relation between `id` and each candidate.
    fn refresh(&mut self, id: u32, candidates: impl IntoIterator<Item = u32>) {
        let Some((position, view)) = self
            .objects
            .get(&id)
            .map(|o| (o.position, o.view_distance))
        else {
            return;
        };

        let mut seen = HashSet::new();
        for other_id in candidates {
            if other_id == id || !seen.insert(other_id) {
                continue;
            }
            let Some(other) = self.objects.get_mut(&other_id) else {
                continue;
            };

            let in_range = position.distance(other.position) <= view.min(other.view_distance);
            if in_range {
                other.observers.insert(id);
            } else {
                other.observers.remove(&id);
            }

            if let Some(object) = self.objects.get_mut(&id) {
                if in_range {
                    object.observers.insert(other_id);
                } else {
                    object.observers.remove(&other_id);
                }
            }
        }
    }

    /// Ids of every object within `range` of `position`, sorted.
    pub fn get_objects_in_range(&self, position: Vec2, range: f32) -> Vec<u32> {
        if !position.is_finite() || range.is_nan() || range < 0.0 {
            return Vec::new();
        }
        let mut ids: Vec<u32> = self
            .grid
            .ids_in_square(position, range)
            .into_iter()
            .filter(|id| {
                self.objects
                    .get(id)
                    .is_some_and(|o| o.position.distance(position) <= range)
            })
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Players other than `id` within `range` of it, sorted.
    pub fn get_players_in_range(&self, id: u32, range: f32) -> Vec<u32> {
        let Some(center) = self.objects.get(&id).map(|o| o.position) else {
            return Vec::new();
        };
        self.get_objects_in_range(center, range)
            .into_iter()
            .filter(|other| {
                *other != id
                    && self
                        .objects
                        .get(other)
                        .is_some_and(|o| o.kind == ObjectKind::Player)
            })
            .collect()
    }

    /// Sorted observer ids; empty for an unknown object.
    pub fn observers(&self, id: u32) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .objects
            .get(&id)
            .map(|o| o.observers.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    pub fn is_observing(&self, observer: u32, target: u32) -> bool {
        self.objects
            .get(&target)
            .is_some_and(|o| o.observers.contains(&observer))
    }

    /// Recomputes every observer set from scratch. Returns how many objects
    /// had a set that changed.
    pub fn reconcile(&mut self) -> usize {
        let previous: HashMap<u32, HashSet<u32>> = self
            .objects
            .iter_mut()
            .map(|(id, o)| (*id, std::mem::take(&mut o.observers)))
            .collect();

        let radius = self.neighbourhood_radius();
        let placements: Vec<(u32, CellCoord)> =
            self.objects.values().map(|o| (o.id, o.cell)).collect();
        for (id, cell) in placements {
            let candidates = self.grid.ids_around(cell, radius);
            self.refresh(id, candidates);
        }

        let changed = self
            .objects
            .iter()
            .filter(|(id, o)| previous.get(id) != Some(&o.observers))
            .count();
        if changed > 0 {
            log::debug!("aoi reconcile corrected {changed} observer sets");
        }
        changed
    }

    pub fn clear(&mut self) {
        self.grid.clear();
        self.objects.clear();
        self.max_view_distance = 0.0;
    }
}
