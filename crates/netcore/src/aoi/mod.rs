mod grid;
mod manager;

pub use grid::{CellCoord, Grid};
pub use manager::{AoiManager, AoiObject, ObjectKind};
