use thiserror::Error;

use crate::hex::HexCoord;
use crate::ids::BuildingTypeId;

/// A game rule that rejected an action.
///
/// Violations are expected, user-facing outcomes. The `Display` text is sent
/// back to the originating session as the rejection reason.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleViolation {
    #[error("No player is registered for this session")]
    PlayerNotFound,

    #[error("Player has no account")]
    AccountNotFound,

    #[error("Tile {coord} does not exist")]
    TileNotFound { coord: HexCoord },

    #[error("Tile {coord} is already owned")]
    TileAlreadyOwned { coord: HexCoord },

    #[error("Tile {coord} is not empty")]
    TileNotEmpty { coord: HexCoord },

    #[error("Building at {blocking} overlaps the footprint around {origin}")]
    RadiusOccupied { origin: HexCoord, blocking: HexCoord },

    #[error("Tile {coord} holds a resource pickup")]
    MapResourcePresent { coord: HexCoord },

    #[error("Footprint around {origin} leaves the map at {missing}")]
    FootprintOutOfBounds { origin: HexCoord, missing: HexCoord },

    #[error("Unknown building type {id}")]
    UnknownBuildingType { id: BuildingTypeId },

    #[error("Not enough {name}: need {need}, have {have}")]
    InsufficientResources { name: String, need: i64, have: i64 },

    #[error("Invalid name: {0}")]
    InvalidName(String),
}
