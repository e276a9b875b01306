//! World entities
//!
//! Entities are plain data owned by the persistence store; values held in
//! memory are projections loaded inside one transaction.

mod building;
mod player;
mod resource;
mod tile;

pub use building::{Building, BuildingCost, BuildingType, DEFAULT_BUILDING_RENDER_PATH};
pub use player::{Account, Player};
pub use resource::{Resource, ResourceKind};
pub use tile::{ContentKind, ContentStatus, Tile, TileContent, BUSY_RENDER_HINT};
