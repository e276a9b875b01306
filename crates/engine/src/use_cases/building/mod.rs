//! Building use cases.

mod construct;

pub use construct::{ConstructBuilding, PlacedBuilding, PlacementResult};
