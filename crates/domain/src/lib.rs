//! Hexworld domain
//!
//! Pure types and rules for a hex-grid world: axial geometry, tiles and their
//! contents, players with resource accounts, the building catalog, and the
//! rule functions that validate and apply claims, placements and regeneration.
//! Nothing in this crate performs I/O.

pub mod entities;
pub mod error;
pub mod hex;
pub mod ids;
pub mod rules;
pub mod value_objects;

pub use entities::{
    Account, Building, BuildingCost, BuildingType, ContentKind, ContentStatus, Player, Resource,
    ResourceKind, Tile, TileContent,
};
pub use error::DomainError;
pub use hex::{neighborhood_size, HexCoord, HexWindow};
pub use ids::{
    AccountId, BuildingCostId, BuildingId, BuildingTypeId, PlayerId, ResourceId, TileContentId,
    TileId,
};
pub use rules::{ClaimPolicy, RuleViolation};
pub use value_objects::{HexColor, PlayerName, SessionId};
