use std::collections::{HashMap, HashSet};

use glam::Vec2;

const MIN_CELL_SIZE: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
}

impl CellCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Uniform 2D bucket index of object ids. Empty cells are never stored.
#[derive(Debug)]
pub struct Grid {
    cell_size: f32,
    cells: HashMap<CellCoord, HashSet<u32>>,
}

impl Grid {
    pub fn new(cell_size: f32) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size >= MIN_CELL_SIZE {
            cell_size
        } else {
            log::warn!("invalid aoi cell size {cell_size}, using {MIN_CELL_SIZE}");
            MIN_CELL_SIZE
        };
        Self {
            cell_size,
            cells: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn cell_of(&self, position: Vec2) -> CellCoord {
        let cell = (position / self.cell_size).floor();
        CellCoord::new(cell.x as i32, cell.y as i32)
    }

    /// Cells needed to cover `distance` in every direction.
    pub fn radius_for(&self, distance: f32) -> i32 {
        (distance.max(0.0) / self.cell_size).ceil() as i32
    }

    pub fn insert(&mut self, cell: CellCoord, id: u32) {
        self.cells.entry(cell).or_default().insert(id);
    }

    pub fn remove(&mut self, cell: CellCoord, id: u32) -> bool {
        let Some(ids) = self.cells.get_mut(&cell) else {
            return false;
        };
        let removed = ids.remove(&id);
        if ids.is_empty() {
            self.cells.remove(&cell);
        }
        removed
    }

    pub fn contains(&self, cell: CellCoord, id: u32) -> bool {
        self.cells.get(&cell).is_some_and(|ids| ids.contains(&id))
    }

    /// Ids in the `(2r+1)²` block of cells centred on `center`.
    pub fn ids_around(&self, center: CellCoord, radius: i32) -> Vec<u32> {
        let min = CellCoord::new(
            center.x.saturating_sub(radius),
            center.y.saturating_sub(radius),
        );
        let max = CellCoord::new(
            center.x.saturating_add(radius),
            center.y.saturating_add(radius),
        );
        self.ids_in_block(min, max)
    }

    /// Ids in every cell overlapping the axis-aligned square of half-width
    /// `half_extent` around `center`.
    pub fn ids_in_square(&self, center: Vec2, half_extent: f32) -> Vec<u32> {
        let half = Vec2::splat(half_extent.max(0.0));
        let min = self.cell_of(center - half);
        let max = self.cell_of(center + half);
        self.ids_in_block(min, max)
    }

    fn ids_in_block(&self, min: CellCoord, max: CellCoord) -> Vec<u32> {
        let width = i64::from(max.x) - i64::from(min.x) + 1;
        let height = i64::from(max.y) - i64::from(min.y) + 1;

        let mut ids = Vec::new();
        // Sparse grid: filter stored cells rather than walk the block.
        if width.saturating_mul(height) > self.cells.len() as i64 {
            for (cell, bucket) in &self.cells {
                if (min.x..=max.x).contains(&cell.x) && (min.y..=max.y).contains(&cell.y) {
                    ids.extend(bucket.iter().copied());
                }
            }
            return ids;
        }

        for x in min.x..=max.x {
            for y in min.y..=max.y {
                if let Some(bucket) = self.cells.get(&CellCoord::new(x, y)) {
                    ids.extend(bucket.iter().copied());
                }
            }
        }
        ids
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_of_floors_negative_coordinates() {
        let grid = Grid::new(100.0);
        assert_eq!(grid.cell_of(Vec2::new(0.0, 99.9)), CellCoord::new(0, 0));
        assert_eq!(grid.cell_of(Vec2::new(100.0, 250.0)), CellCoord::new(1, 2));
        assert_eq!(grid.cell_of(Vec2::new(-0.5, -100.0)), CellCoord::new(-1, -1));
    }

    #[test]
    fn test_radius_covers_view_distance() {
        let grid = Grid::new(32.0);
        assert_eq!(grid.radius_for(24.0), 1);
        assert_eq!(grid.radius_for(32.0), 1);
        assert_eq!(grid.radius_for(33.0), 2);
        assert_eq!(grid.radius_for(0.0), 0);
    }

    #[test]
    fn test_empty_cells_are_dropped() {
        let mut grid = Grid::new(10.0);
        let cell = CellCoord::new(3, 4);
        grid.insert(cell, 1);
        grid.insert(cell, 2);
        assert_eq!(grid.cell_count(), 1);

        assert!(grid.remove(cell, 1));
        assert!(!grid.contains(cell, 1));
        assert!(grid.contains(cell, 2));
        assert_eq!(grid.cell_count(), 1);
        assert!(grid.remove(cell, 2));
        assert_eq!(grid.cell_count(), 0);
        assert!(!grid.remove(cell, 2));
    }

    #[test]
    fn test_square_query_scans_overlapping_cells_only() {
        let mut grid = Grid::new(10.0);
        grid.insert(grid.cell_of(Vec2::new(5.0, 5.0)), 1);
        grid.insert(grid.cell_of(Vec2::new(15.0, 5.0)), 2);
        grid.insert(grid.cell_of(Vec2::new(35.0, 5.0)), 3);

        let mut ids = grid.ids_in_square(Vec2::new(9.0, 5.0), 2.0);
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_invalid_cell_size_falls_back() {
        assert_eq!(Grid::new(0.0).cell_size(), MIN_CELL_SIZE);
        assert_eq!(Grid::new(f32::NAN).cell_size(), MIN_CELL_SIZE);
    }
}
