//! Use cases - game actions and the services that run them.
//!
//! Each state-changing operation is a [`GameAction`] run by the
//! [`GameActionService`] inside a single store transaction.

pub mod building;
pub mod game_action;
pub mod player;
pub mod resources;
pub mod seed;
pub mod tile;

pub use building::{ConstructBuilding, PlacedBuilding, PlacementResult};
pub use game_action::{ActionError, ActionOutcome, GameAction, GameActionService, Validation};
pub use player::{JoinPlayer, Joined};
pub use resources::{RegenerateResources, ResourceTickService, TickSummary};
pub use seed::{SeedReport, SeedWorld};
pub use tile::{ClaimResult, ClaimTile};
