mod table;
mod world;

pub use table::{ConnectedEntity, EntityTable};
pub use world::WorldState;
